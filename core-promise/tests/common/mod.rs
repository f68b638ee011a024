//! Shared fixtures: a real event loop on its own thread.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bridge_desktop::{DesktopDispatcher, LoopThread};
use core_promise::{Promise, PromiseError, ThreadContext};

/// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

pub const LOOP_NAME: &str = "promise-loop";

pub struct Fixture {
    pub dispatcher: Arc<DesktopDispatcher>,
    pub event_loop: LoopThread,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let dispatcher = DesktopDispatcher::new();
        let event_loop = LoopThread::spawn(&dispatcher, LOOP_NAME).unwrap();
        Self {
            dispatcher,
            event_loop,
        }
    }

    pub fn context(&self) -> ThreadContext {
        self.event_loop.context()
    }

    /// A second loop thread on the same dispatcher.
    pub fn spawn_loop(&self, name: &str) -> LoopThread {
        LoopThread::spawn(&self.dispatcher, name).unwrap()
    }
}

/// Route engine logs to the test harness; `RUST_LOG=core_promise=trace`
/// shows settlement and dispatch.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .with_test_writer()
        .try_init();
}

/// Block until `promise` settles, failing the test if it takes too long.
pub fn settle<T>(promise: &Promise<T>) -> Result<T, PromiseError>
where
    T: Clone + Send + 'static,
{
    promise
        .wait_timeout(WAIT)
        .expect("promise did not settle in time")
}

pub fn current_thread_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_string()
}
