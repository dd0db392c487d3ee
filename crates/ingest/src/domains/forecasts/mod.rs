mod download_forecast;
mod parse_forecast;

pub use download_forecast::*;
pub use parse_forecast::*;
