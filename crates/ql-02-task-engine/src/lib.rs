//! # Task Engine (ql-02)
//!
//! A fork-join scheduler: a [`Task`] may fork children while it runs, and it
//! is complete only once its own work and every descendant have finished.
//!
//! ## Completion Counting
//!
//! ```text
//!            root (1 + 2 children)
//!           /                    \
//!   child A (1 + 1)          child B (1)
//!          |
//!   leaf A1 (1)
//! ```
//!
//! Each node carries an `unfinished` count: one for its own work plus one per
//! attached child whose subtree has not finished. Finishing work, or a child
//! subtree finishing, is a single atomic decrement-and-test on that node; the
//! decrement that reaches zero resolves the node's final status and notifies
//! the parent. Every node therefore notifies its parent exactly once.
//!
//! ## Failure Policy
//!
//! A failed child does not cancel queued siblings. Its ancestors resolve to
//! `Failed` once they complete; a tree with no failures resolves to
//! `Successful`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ql_02_task_engine::{EngineConfig, TaskEngine};
//!
//! let engine = TaskEngine::new(EngineConfig::default())?;
//! let handle = engine.schedule(MyRootTask::new());
//! let status = handle.wait().await;
//! ```

pub mod domain;
pub mod engine;
pub mod task;

pub use domain::{EngineConfig, TaskError, TaskId, TaskStatus};
pub use engine::{EngineStats, TaskEngine, TaskHandle};
pub use task::{task_fn, FnTask, Task, TaskContext};
