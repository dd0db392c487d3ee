pub mod health;
pub mod ingest;
pub mod measurements;

pub use health::*;
pub use ingest::*;
pub use measurements::*;
