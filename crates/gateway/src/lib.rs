mod api_keys;
mod gate;
mod rate_limiter;
pub mod routes;
mod startup;
mod utils;

pub use api_keys::*;
pub use gate::*;
pub use rate_limiter::*;
pub use routes::*;
pub use startup::*;
pub use utils::*;
