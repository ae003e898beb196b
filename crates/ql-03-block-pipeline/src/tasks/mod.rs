//! Task trees run on the engine by [`crate::BlockPipeline`].

mod commit;
mod verify;

pub use commit::{
    CommitBlockTask, CommitInputTask, CommitOutputTask, CommitTransactionInputsTask,
    CommitTransactionOutputsTask, CommitTransactionTask,
};
pub use verify::{VerifyBlockTask, VerifyInputTask, VerifyTransactionTask};
