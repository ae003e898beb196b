//! The engine: a fixed rayon worker pool, the live-task registry, and root
//! completion handles.

use crate::domain::{EngineConfig, TaskError, TaskId, TaskStatus};
use crate::task::{Task, TaskContext, TaskNode};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

type Continuation = Box<dyn FnOnce(TaskStatus) + Send>;

/// Completion record of a root task, shared by every handle to it.
pub(crate) struct Completion {
    state: Mutex<CompletionState>,
    finished: Condvar,
    notify: watch::Sender<Option<TaskStatus>>,
    started: Instant,
}

#[derive(Default)]
struct CompletionState {
    status: Option<TaskStatus>,
    continuations: Vec<Continuation>,
}

impl Completion {
    pub(crate) fn new() -> Arc<Self> {
        let (notify, _) = watch::channel(None);
        Arc::new(Self {
            state: Mutex::new(CompletionState::default()),
            finished: Condvar::new(),
            notify,
            started: Instant::now(),
        })
    }

    /// Record the final status and run registered continuations.
    /// Only the first call has any effect.
    fn complete(&self, status: TaskStatus) {
        let continuations = {
            let mut state = self.state.lock();
            if state.status.is_some() {
                return;
            }
            state.status = Some(status);
            self.finished.notify_all();
            std::mem::take(&mut state.continuations)
        };
        self.notify.send_replace(Some(status));
        for continuation in continuations {
            continuation(status);
        }
    }

    fn status(&self) -> Option<TaskStatus> {
        self.state.lock().status
    }
}

/// Handle to a scheduled root task.
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    name: &'static str,
    completion: Arc<Completion>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Final status, if the whole tree has completed.
    pub fn try_status(&self) -> Option<TaskStatus> {
        self.completion.status()
    }

    /// Wait for the tree to complete.
    pub async fn wait(&self) -> TaskStatus {
        let mut rx = self.completion.notify.subscribe();
        let observed = rx.wait_for(Option::is_some).await.map(|status| *status);
        match observed {
            Ok(Some(status)) => status,
            _ => self.try_status().unwrap_or(TaskStatus::Cancelled),
        }
    }

    /// Block the calling thread until the tree completes.
    ///
    /// Must not be called from an engine worker.
    pub fn wait_blocking(&self) -> TaskStatus {
        let mut state = self.completion.state.lock();
        loop {
            if let Some(status) = state.status {
                return status;
            }
            self.completion.finished.wait(&mut state);
        }
    }

    /// Like [`Self::wait_blocking`] but gives up after `timeout`.
    pub fn wait_blocking_timeout(&self, timeout: Duration) -> Option<TaskStatus> {
        let deadline = Instant::now() + timeout;
        let mut state = self.completion.state.lock();
        while state.status.is_none() {
            if self
                .completion
                .finished
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        state.status
    }

    /// Run `f` exactly once with the final status.
    ///
    /// Runs immediately on the calling thread if the tree already completed,
    /// otherwise on the worker that completes it.
    pub fn on_complete<F>(&self, f: F)
    where
        F: FnOnce(TaskStatus) + Send + 'static,
    {
        let mut state = self.completion.state.lock();
        match state.status {
            Some(status) => {
                drop(state);
                f(status);
            }
            None => state.continuations.push(Box::new(f)),
        }
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.try_status())
            .finish()
    }
}

/// Counters over the engine's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Tasks queued, roots and children alike.
    pub scheduled: u64,
    pub succeeded: u64,
    /// Tasks that finished with any non-successful status.
    pub unsuccessful: u64,
    pub roots_completed: u64,
}

#[derive(Default)]
struct StatsCounters {
    scheduled: AtomicU64,
    succeeded: AtomicU64,
    unsuccessful: AtomicU64,
    roots_completed: AtomicU64,
}

impl StatsCounters {
    fn record(&self, status: TaskStatus) {
        if status.is_success() {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.unsuccessful.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> EngineStats {
        EngineStats {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            unsuccessful: self.unsuccessful.load(Ordering::Relaxed),
            roots_completed: self.roots_completed.load(Ordering::Relaxed),
        }
    }
}

pub(crate) struct EngineInner {
    pool: rayon::ThreadPool,
    worker_threads: usize,
    /// Owns every task node until its subtree completes.
    registry: Mutex<HashMap<TaskId, Arc<TaskNode>>>,
    next_id: AtomicU64,
    accepting: AtomicBool,
    roots_in_flight: Mutex<usize>,
    drained: Condvar,
    stats: StatsCounters,
}

impl EngineInner {
    pub(crate) fn next_task_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn dispatch(self: &Arc<Self>, node: Arc<TaskNode>, task: Box<dyn Task>) {
        node.set_status(TaskStatus::Queued);
        self.registry.lock().insert(node.id, Arc::clone(&node));
        self.stats.scheduled.fetch_add(1, Ordering::Relaxed);
        trace!(task = node.name, id = %node.id, "task queued");

        let engine = Arc::clone(self);
        self.pool.spawn(move || engine.execute(node, task));
    }

    fn execute(self: Arc<Self>, node: Arc<TaskNode>, task: Box<dyn Task>) {
        let own = {
            let mut ctx = TaskContext::new(&self, &node);
            match panic::catch_unwind(AssertUnwindSafe(|| task.run(&mut ctx))) {
                Ok(status) if status.is_terminal() => status,
                Ok(status) => {
                    warn!(task = node.name, id = %node.id, %status, "task returned a non-terminal status");
                    TaskStatus::Failed
                }
                Err(payload) => {
                    error!(
                        task = node.name,
                        id = %node.id,
                        reason = %panic_message(payload.as_ref()),
                        "task panicked"
                    );
                    TaskStatus::Failed
                }
            }
        };
        node.record_own_status(own);
        self.release(node);
    }

    /// Finish one unit of work on `node`; walks up while subtrees complete.
    fn release(&self, node: Arc<TaskNode>) {
        let mut current = node;
        loop {
            if !current.finish_one() {
                return;
            }

            let status = current.resolve();
            current.set_status(status);
            self.registry.lock().remove(&current.id);
            self.stats.record(status);
            if status.is_success() {
                trace!(task = current.name, id = %current.id, "task complete");
            } else {
                debug!(task = current.name, id = %current.id, %status, "task complete");
            }

            if current.is_root() {
                if let Some(completion) = &current.completion {
                    self.finish_root(&current, completion, status);
                }
                return;
            }

            match current.parent() {
                Some(parent) => {
                    if !status.is_success() {
                        parent.mark_descendant_failed();
                    }
                    current = parent;
                }
                None => {
                    error!(task = current.name, id = %current.id, "parent released before child");
                    return;
                }
            }
        }
    }

    fn finish_root(&self, node: &TaskNode, completion: &Completion, status: TaskStatus) {
        debug!(
            task = node.name,
            id = %node.id,
            %status,
            elapsed_ms = completion.started.elapsed().as_millis() as u64,
            "task tree complete"
        );
        self.stats.roots_completed.fetch_add(1, Ordering::Relaxed);
        completion.complete(status);

        let mut roots = self.roots_in_flight.lock();
        *roots = roots.saturating_sub(1);
        if *roots == 0 {
            self.drained.notify_all();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Fork-join task engine over a fixed pool of worker threads.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct TaskEngine {
    inner: Arc<EngineInner>,
}

impl TaskEngine {
    pub fn new(config: EngineConfig) -> Result<Self, TaskError> {
        if config.worker_threads == 0 {
            return Err(TaskError::InvalidConfig(
                "worker_threads must be at least 1".to_string(),
            ));
        }

        let prefix = config.thread_name_prefix.clone();
        let mut builder = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(move |index| format!("{prefix}-{index}"));
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let pool = builder
            .build()
            .map_err(|e| TaskError::PoolBuild(e.to_string()))?;

        info!(workers = config.worker_threads, "task engine started");

        Ok(Self {
            inner: Arc::new(EngineInner {
                pool,
                worker_threads: config.worker_threads,
                registry: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                accepting: AtomicBool::new(true),
                roots_in_flight: Mutex::new(0),
                drained: Condvar::new(),
                stats: StatsCounters::default(),
            }),
        })
    }

    /// Queue `task` as the root of a new tree.
    ///
    /// On a stopped engine the task never runs and the handle is already
    /// `Cancelled`.
    pub fn schedule<T: Task>(&self, task: T) -> TaskHandle {
        self.schedule_boxed(Box::new(task))
    }

    pub fn schedule_boxed(&self, task: Box<dyn Task>) -> TaskHandle {
        let id = self.inner.next_task_id();
        let name = task.name();
        let completion = Completion::new();
        let handle = TaskHandle {
            id,
            name,
            completion: Arc::clone(&completion),
        };

        {
            let mut roots = self.inner.roots_in_flight.lock();
            if !self.inner.accepting.load(Ordering::Acquire) {
                drop(roots);
                warn!(task = name, %id, "task engine stopped, task cancelled");
                completion.complete(TaskStatus::Cancelled);
                return handle;
            }
            *roots += 1;
        }

        let node = TaskNode::root(id, name, completion);
        self.inner.dispatch(node, task);
        handle
    }

    pub fn worker_threads(&self) -> usize {
        self.inner.worker_threads
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::Acquire)
    }

    /// Tasks (roots and descendants) whose subtree has not completed.
    pub fn live_tasks(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Status of a live task. `None` once its subtree has completed.
    pub fn task_status(&self, id: TaskId) -> Option<TaskStatus> {
        self.inner.registry.lock().get(&id).map(|node| node.status())
    }

    pub fn stats(&self) -> EngineStats {
        self.inner.stats.snapshot()
    }

    /// Stop accepting new roots and wait for in-flight trees to drain.
    ///
    /// Returns `false` if trees were still running at `timeout`. Blocks the
    /// calling thread.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut roots = self.inner.roots_in_flight.lock();
        if self.inner.accepting.swap(false, Ordering::AcqRel) {
            info!(in_flight = *roots, "task engine stopping");
        }

        while *roots > 0 {
            let timed_out = self
                .inner
                .drained
                .wait_until(&mut roots, deadline)
                .timed_out();
            if timed_out && *roots > 0 {
                warn!(in_flight = *roots, "task engine shutdown timed out");
                return false;
            }
        }
        debug!("task engine drained");
        true
    }
}

impl std::fmt::Debug for TaskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine")
            .field("worker_threads", &self.inner.worker_threads)
            .field("accepting", &self.is_accepting())
            .finish()
    }
}
