//! Engine configuration.

/// Configuration of the engine's fixed worker pool.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of worker threads. Fixed for the engine's lifetime.
    pub worker_threads: usize,
    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
    /// Stack size for worker threads (bytes). `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get().max(1),
            thread_name_prefix: "ql-task".to_string(),
            stack_size: None,
        }
    }
}

impl EngineConfig {
    /// A small pool for tests.
    pub fn for_testing(worker_threads: usize) -> Self {
        Self {
            worker_threads,
            ..Self::default()
        }
    }
}
