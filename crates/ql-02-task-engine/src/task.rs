//! Tasks, the per-run context, and the completion node each task owns.

use crate::domain::{TaskId, TaskStatus};
use crate::engine::{Completion, EngineInner};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// A unit of work run on an engine worker.
///
/// `run` consumes the task and returns the status of its own work. Children
/// forked through the context are tracked separately; the task's final status
/// accounts for them once they have all finished.
pub trait Task: Send + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn run(self: Box<Self>, ctx: &mut TaskContext<'_>) -> TaskStatus;
}

/// Context handed to a running task.
pub struct TaskContext<'a> {
    engine: &'a Arc<EngineInner>,
    node: &'a Arc<TaskNode>,
    forked: usize,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(engine: &'a Arc<EngineInner>, node: &'a Arc<TaskNode>) -> Self {
        Self {
            engine,
            node,
            forked: 0,
        }
    }

    /// Attach `task` as a child of the running task and queue it.
    ///
    /// The running task does not complete until the child's whole subtree
    /// has.
    pub fn fork<T: Task>(&mut self, task: T) {
        self.fork_boxed(Box::new(task));
    }

    pub fn fork_boxed(&mut self, task: Box<dyn Task>) {
        let child = TaskNode::attach_child(self.engine.next_task_id(), task.name(), self.node);
        self.engine.dispatch(child, task);
        self.forked += 1;
    }

    pub fn task_id(&self) -> TaskId {
        self.node.id
    }

    /// Children forked so far during this run.
    pub fn forked(&self) -> usize {
        self.forked
    }
}

/// A task built from a closure.
pub struct FnTask<F> {
    name: &'static str,
    f: F,
}

impl<F> Task for FnTask<F>
where
    F: FnOnce(&mut TaskContext<'_>) -> TaskStatus + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(self: Box<Self>, ctx: &mut TaskContext<'_>) -> TaskStatus {
        (self.f)(ctx)
    }
}

/// Wrap a closure as a [`Task`].
pub fn task_fn<F>(name: &'static str, f: F) -> FnTask<F>
where
    F: FnOnce(&mut TaskContext<'_>) -> TaskStatus + Send + 'static,
{
    FnTask { name, f }
}

/// Completion-tracking node for one task.
///
/// `unfinished` starts at 1 for the task's own work and gains one per
/// attached child. A child can only be attached while the task runs, so the
/// count is never observed at zero before the task itself finishes.
pub(crate) struct TaskNode {
    pub(crate) id: TaskId,
    pub(crate) name: &'static str,
    parent: Option<Weak<TaskNode>>,
    status: AtomicU8,
    own_status: AtomicU8,
    unfinished: AtomicUsize,
    descendant_failed: AtomicBool,
    pub(crate) completion: Option<Arc<Completion>>,
}

impl TaskNode {
    pub(crate) fn root(id: TaskId, name: &'static str, completion: Arc<Completion>) -> Arc<Self> {
        Arc::new(Self::new(id, name, None, Some(completion)))
    }

    fn attach_child(id: TaskId, name: &'static str, parent: &Arc<TaskNode>) -> Arc<Self> {
        let previous = parent.unfinished.fetch_add(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "child attached to a finished task");
        Arc::new(Self::new(id, name, Some(Arc::downgrade(parent)), None))
    }

    fn new(
        id: TaskId,
        name: &'static str,
        parent: Option<Weak<TaskNode>>,
        completion: Option<Arc<Completion>>,
    ) -> Self {
        Self {
            id,
            name,
            parent,
            status: AtomicU8::new(TaskStatus::Unqueued.as_u8()),
            own_status: AtomicU8::new(TaskStatus::Unqueued.as_u8()),
            unfinished: AtomicUsize::new(1),
            descendant_failed: AtomicBool::new(false),
            completion,
        }
    }

    pub(crate) fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: TaskStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    pub(crate) fn record_own_status(&self, status: TaskStatus) {
        self.own_status.store(status.as_u8(), Ordering::Release);
    }

    pub(crate) fn mark_descendant_failed(&self) {
        self.descendant_failed.store(true, Ordering::Release);
    }

    pub(crate) fn parent(&self) -> Option<Arc<TaskNode>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Decrement the unfinished count; true for the one caller that takes it
    /// to zero.
    pub(crate) fn finish_one(&self) -> bool {
        self.unfinished.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Final status once the count reached zero.
    pub(crate) fn resolve(&self) -> TaskStatus {
        let own = TaskStatus::from_u8(self.own_status.load(Ordering::Acquire));
        if !own.is_success() {
            own
        } else if self.descendant_failed.load(Ordering::Acquire) {
            TaskStatus::Failed
        } else {
            TaskStatus::Successful
        }
    }
}
