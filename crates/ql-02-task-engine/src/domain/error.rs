use thiserror::Error;

/// Task engine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Worker pool initialization failed: {0}")]
    PoolBuild(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
