//! Task Bridge
//!
//! Runs a closure on the worker pool and exposes its result as a promise
//! bound to an event-loop thread. The promise is settled from the worker
//! thread; its continuations still run on the bound thread.

use std::sync::Arc;

use bridge_traits::error::BridgeError;
use bridge_traits::{TaskExecutor, TaskOutcome, ThreadContext};
use core_runtime::EngineConfig;
use tracing::{trace, warn};

use crate::cell::Progress;
use crate::error::PromiseError;
use crate::promise::{Promise, Resolver};

#[derive(Clone)]
pub struct TaskBridge {
    executor: Arc<dyn TaskExecutor>,
    context: ThreadContext,
}

impl TaskBridge {
    /// Promises returned by this bridge deliver to `context`.
    pub fn new(executor: Arc<dyn TaskExecutor>, context: ThreadContext) -> Self {
        Self { executor, context }
    }

    /// Use the executor from an engine configuration.
    pub fn from_config(config: &EngineConfig, context: ThreadContext) -> Self {
        Self::new(Arc::clone(&config.task_executor), context)
    }

    pub fn context(&self) -> &ThreadContext {
        &self.context
    }

    /// The same worker pool, delivering to `context`.
    pub fn with_context(&self, context: ThreadContext) -> Self {
        Self::new(Arc::clone(&self.executor), context)
    }

    /// Run a fallible closure in the background.
    ///
    /// - `Ok` / `Err` from `work` fulfill / reject the promise.
    /// - A panic rejects with [`PromiseError::Panicked`].
    /// - A task the pool dropped without running rejects with
    ///   [`PromiseError::Abandoned`].
    /// - An executor that is not accepting work, or a refused submission,
    ///   rejects with [`PromiseError::Bridge`].
    pub fn run<T, F>(&self, work: F) -> Promise<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T, PromiseError> + Send + 'static,
    {
        self.spawn(move |resolver| resolver.settle_result(work()))
    }

    /// [`run`](TaskBridge::run), with a reporter `work` can call to send
    /// progress to the promise's
    /// [`on_progress`](crate::Promise::on_progress) callbacks.
    ///
    /// ```ignore
    /// bridge
    ///     .run_with_progress(|report| {
    ///         for n in 0..10 {
    ///             step(n);
    ///             report(json!(n * 10));
    ///         }
    ///         Ok(())
    ///     })
    ///     .on_progress(|percent| println!("{percent}%"));
    /// ```
    pub fn run_with_progress<T, F>(&self, work: F) -> Promise<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(&dyn Fn(Progress)) -> Result<T, PromiseError> + Send + 'static,
    {
        self.spawn(move |resolver| {
            let report = |progress: Progress| {
                resolver.notify(progress);
            };
            resolver.settle_result(work(&report));
        })
    }

    fn spawn<T, W>(&self, work: W) -> Promise<T>
    where
        T: Clone + Send + 'static,
        W: FnOnce(&Resolver<T>) + Send + 'static,
    {
        let (promise, resolver) = Promise::pending(self.context.clone());

        if !self.executor.is_available() {
            warn!("Task executor is not accepting work");
            resolver.reject(BridgeError::NotAvailable(
                "task executor is not accepting work".to_string(),
            ));
            return promise;
        }

        let worker = resolver.clone();
        let completion = resolver.clone();
        let submitted = self.executor.submit(
            Box::new(move || work(&worker)),
            Box::new(move |outcome| match outcome {
                TaskOutcome::Completed => {}
                TaskOutcome::Panicked(message) => {
                    completion.reject(PromiseError::Panicked(message))
                }
                TaskOutcome::Cancelled => completion.reject(PromiseError::Abandoned),
            }),
        );

        match submitted {
            Ok(task_id) => trace!(
                task_id = %task_id,
                thread = %self.context.thread(),
                "Submitted background task"
            ),
            Err(err) => {
                warn!(error = %err, "Task executor refused work");
                resolver.reject(err);
            }
        }

        promise
    }

    /// Run an infallible closure in the background.
    pub fn run_value<T, F>(&self, work: F) -> Promise<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.run(move || Ok(work()))
    }
}

impl std::fmt::Debug for TaskBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskBridge")
            .field("executor", &"TaskExecutor { ... }")
            .field("context", &self.context)
            .finish()
    }
}
