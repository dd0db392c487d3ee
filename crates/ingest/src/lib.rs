mod clock;
mod db;
mod domains;
mod fetch;
mod outcome;
mod pipeline;
mod scheduler;
mod settings;

pub use clock::*;
pub use db::*;
pub use domains::*;
pub use fetch::*;
pub use outcome::*;
pub use pipeline::*;
pub use scheduler::*;
pub use settings::*;
