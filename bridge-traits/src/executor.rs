//! Background Task Execution
//!
//! Contract for running blocking or CPU-bound work off the event-loop thread.

use std::fmt;

use uuid::Uuid;

use crate::error::Result;

/// The closure a worker runs. It carries its own result channel, usually a
/// promise resolver captured by the task bridge.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Completion notification, invoked exactly once on an unspecified thread.
pub type Completion = Box<dyn FnOnce(TaskOutcome) + Send + 'static>;

/// Submitted task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a submitted task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The work closure returned normally
    Completed,
    /// The work closure panicked; carries the panic message
    Panicked(String),
    /// The executor dropped the task before it ran (shutdown)
    Cancelled,
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed)
    }
}

/// Worker-pool trait
///
/// Abstracts the task-execution framework:
/// - **Desktop**: `bridge_desktop::TokioTaskExecutor` (Tokio blocking pool)
/// - **Hosts with their own pool**: adapt the pool's submit/finished signals
///
/// # Contract
///
/// - `submit` returns immediately; `work` runs later on a worker thread.
/// - `on_complete` is called exactly once per accepted task, after `work`
///   finished or was abandoned, on whichever thread the framework chooses.
/// - When the task is refused, `submit` returns an error and neither closure
///   runs; both are dropped.
pub trait TaskExecutor: Send + Sync {
    /// Submit `work` for background execution.
    fn submit(&self, work: Work, on_complete: Completion) -> Result<TaskId>;

    /// Check if the executor currently accepts work
    fn is_available(&self) -> bool {
        true
    }
}
