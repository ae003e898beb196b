//! Failure reasons collected from the leaves of one pipeline run.

use parking_lot::Mutex;
use ql_01_ledger_storage::StorageError;
use std::sync::Arc;

#[derive(Default)]
struct Recorded {
    reasons: Vec<String>,
    fatal: Option<StorageError>,
}

/// Shared sink for failure reasons; cloned into every task of a tree.
#[derive(Clone, Default)]
pub struct FailureLog {
    inner: Arc<Mutex<Recorded>>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, reason: impl Into<String>) {
        self.inner.lock().reasons.push(reason.into());
    }

    /// Record a storage error; the first fatal one is kept aside.
    pub fn record_storage(&self, context: &str, error: StorageError) {
        let mut recorded = self.inner.lock();
        recorded.reasons.push(format!("{context}: {error}"));
        if error.is_fatal() && recorded.fatal.is_none() {
            recorded.fatal = Some(error);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().reasons.is_empty()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.inner.lock().reasons.clone()
    }

    pub fn fatal(&self) -> Option<StorageError> {
        self.inner.lock().fatal.clone()
    }
}
