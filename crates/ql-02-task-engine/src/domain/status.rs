//! Task identity and lifecycle status.

use std::fmt;

/// Engine-unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Lifecycle status of a task.
///
/// `Unqueued -> Queued -> {Successful | Failed | Cancelled | TimedOut}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskStatus {
    Unqueued = 0,
    Queued = 1,
    Successful = 2,
    Failed = 3,
    Cancelled = 4,
    TimedOut = 5,
}

impl TaskStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Successful | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::TimedOut
        )
    }

    pub const fn is_success(self) -> bool {
        matches!(self, TaskStatus::Successful)
    }

    pub(crate) const fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskStatus::Unqueued,
            1 => TaskStatus::Queued,
            2 => TaskStatus::Successful,
            3 => TaskStatus::Failed,
            4 => TaskStatus::Cancelled,
            _ => TaskStatus::TimedOut,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Unqueued => "unqueued",
            TaskStatus::Queued => "queued",
            TaskStatus::Successful => "successful",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::TimedOut => "timed-out",
        };
        f.write_str(name)
    }
}
