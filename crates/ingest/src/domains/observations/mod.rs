mod download_observations;
mod parse_observations;
mod query_measurements;

pub use download_observations::*;
pub use parse_observations::*;
pub use query_measurements::*;
