mod forecasts;
mod observations;

pub use forecasts::*;
pub use observations::*;
