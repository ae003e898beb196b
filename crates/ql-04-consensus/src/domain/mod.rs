//! Domain layer for consensus.

mod config;
mod error;
mod message;
mod proposal;
mod state;

pub use config::*;
pub use error::*;
pub use message::*;
pub use proposal::*;
pub use state::*;
