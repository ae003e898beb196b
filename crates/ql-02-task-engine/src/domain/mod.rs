//! Domain layer for the task engine.

mod config;
mod error;
mod status;

pub use config::*;
pub use error::*;
pub use status::*;
