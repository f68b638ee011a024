//! Background Task Execution Implementation

use bridge_traits::{
    error::{BridgeError, Result},
    executor::{Completion, TaskExecutor, TaskId, TaskOutcome, Work},
};
use core_async::runtime::{self, Handle, Runtime};
use core_async::task::join_error_message;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Tokio-based worker pool for desktop.
///
/// Work runs on the runtime's blocking pool; completion is reported from an
/// async task on a runtime worker, so the thread that calls `on_complete` is
/// never the event-loop thread.
pub struct TokioTaskExecutor {
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    accepting: AtomicBool,
    in_flight: Arc<AtomicUsize>,
}

impl TokioTaskExecutor {
    /// Create an executor that owns a runtime with `worker_threads` workers.
    pub fn with_workers(worker_threads: usize, thread_name: &str) -> io::Result<Self> {
        let runtime = runtime::worker_runtime(worker_threads, thread_name)?;
        debug!(
            worker_threads,
            thread_name, "Started worker runtime for task executor"
        );
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            accepting: AtomicBool::new(true),
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Create an executor on an existing runtime. The runtime is not owned and
    /// is left running by [`shutdown`](Self::shutdown).
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            runtime: Mutex::new(None),
            accepting: AtomicBool::new(true),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Tasks submitted but not yet reported complete.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting work. An owned runtime is shut down in the background;
    /// tasks that never started are reported as [`TaskOutcome::Cancelled`].
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        if let Some(runtime) = self.runtime.lock().take() {
            debug!(in_flight = self.in_flight(), "Shutting down worker runtime");
            runtime.shutdown_background();
        }
    }
}

impl TaskExecutor for TokioTaskExecutor {
    fn submit(&self, work: Work, on_complete: Completion) -> Result<TaskId> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(BridgeError::ExecutorShutdown);
        }

        let id = TaskId::new();
        trace!(task_id = %id, "Submitting task");

        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);

        let blocking = self.handle.spawn_blocking(work);
        let mut report = CompletionGuard::new(on_complete, in_flight);
        self.handle.spawn(async move {
            let outcome = match blocking.await {
                Ok(()) => TaskOutcome::Completed,
                Err(err) if err.is_cancelled() => TaskOutcome::Cancelled,
                Err(err) => {
                    let message = join_error_message(err);
                    warn!(task_id = %id, panic = %message, "Background task panicked");
                    TaskOutcome::Panicked(message)
                }
            };
            report.complete(outcome);
        });

        Ok(id)
    }

    fn is_available(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }
}

impl Drop for TokioTaskExecutor {
    fn drop(&mut self) {
        // Dropping a Runtime inside async context panics; background shutdown
        // is safe from any thread.
        self.shutdown();
    }
}

/// Calls the completion exactly once: with the real outcome, or with
/// `Cancelled` if the reporting task is dropped by a runtime shutdown.
struct CompletionGuard {
    on_complete: Option<Completion>,
    in_flight: Arc<AtomicUsize>,
}

impl CompletionGuard {
    fn new(on_complete: Completion, in_flight: Arc<AtomicUsize>) -> Self {
        Self {
            on_complete: Some(on_complete),
            in_flight,
        }
    }

    fn complete(&mut self, outcome: TaskOutcome) {
        if let Some(on_complete) = self.on_complete.take() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            on_complete(outcome);
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.complete(TaskOutcome::Cancelled);
    }
}
