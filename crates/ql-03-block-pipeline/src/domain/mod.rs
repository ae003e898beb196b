//! Domain layer for the block pipelines.

mod batch_group;
pub(crate) mod errors;
mod failures;

pub use batch_group::WriteBatchGroup;
pub use errors::PipelineError;
pub use failures::FailureLog;
