mod gate;
mod helpers;
mod manual_ingest;
mod measurements;
