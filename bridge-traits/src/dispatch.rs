//! Event-Loop Dispatch
//!
//! Contract for posting callbacks to a specific thread's event loop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// A unit of work queued on an event loop.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Identifies one event-loop thread within a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadKey(pub u64);

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop-{}", self.0)
    }
}

/// Event-loop dispatcher trait
///
/// Abstracts the host's event loop:
/// - **Desktop**: `bridge_desktop::DesktopDispatcher` (thread-bound queues)
/// - **GUI toolkits**: the toolkit's "invoke later on thread" facility
///
/// # Guarantees required from implementations
///
/// - Callbacks posted to the same thread run on that thread, one at a time,
///   in the order they were posted.
/// - `post` never runs the callback inline, even when called from the target
///   thread itself.
/// - Delayed callbacks run no earlier than `delay` after posting. No order is
///   promised between delayed callbacks, or between a delayed callback and
///   plain posts made after its delay elapsed.
/// - When the target thread's loop is gone, the call returns an error and the
///   callback is dropped without running.
pub trait Dispatcher: Send + Sync {
    /// Queue `callback` for execution on `thread`.
    fn post(&self, thread: ThreadKey, callback: Callback) -> Result<()>;

    /// Queue `callback` for execution on `thread` once `delay` has elapsed.
    fn post_delayed(&self, thread: ThreadKey, delay: Duration, callback: Callback) -> Result<()>;
}

/// A dispatcher paired with one of its threads.
///
/// Promise handles carry a `ThreadContext` so that the thread running each
/// continuation is decided when the handle is created, not looked up from
/// hidden global state when the value arrives.
#[derive(Clone)]
pub struct ThreadContext {
    dispatcher: Arc<dyn Dispatcher>,
    thread: ThreadKey,
}

impl ThreadContext {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, thread: ThreadKey) -> Self {
        Self { dispatcher, thread }
    }

    /// Key of the thread this context delivers to.
    pub fn thread(&self) -> ThreadKey {
        self.thread
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// A context on another thread of the same dispatcher.
    pub fn with_thread(&self, thread: ThreadKey) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            thread,
        }
    }

    pub fn post(&self, callback: Callback) -> Result<()> {
        self.dispatcher.post(self.thread, callback)
    }

    pub fn post_delayed(&self, delay: Duration, callback: Callback) -> Result<()> {
        self.dispatcher.post_delayed(self.thread, delay, callback)
    }

    /// True when both contexts deliver to the same thread of the same dispatcher.
    pub fn same_target(&self, other: &ThreadContext) -> bool {
        self.thread == other.thread && Arc::ptr_eq(&self.dispatcher, &other.dispatcher)
    }
}

impl fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadContext")
            .field("thread", &self.thread)
            .field("dispatcher", &"Dispatcher { ... }")
            .finish()
    }
}
