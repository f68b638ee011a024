//! Task spawning and panic reporting.
//!
//! - `spawn`: runs a future on the current Tokio runtime
//! - `spawn_blocking`: runs a blocking or CPU-bound closure on the blocking pool
//! - `panic_message` / `join_error_message`: turn a caught panic into text so
//!   that callers can report it as an ordinary error
//!
//! # Examples
//!
//! ```rust
//! use core_async::{runtime, task};
//!
//! let rt = runtime::worker_runtime(1, "doc").unwrap();
//! let err = rt.block_on(async {
//!     task::spawn_blocking(|| -> u32 { panic!("boom") }).await.unwrap_err()
//! });
//! assert_eq!(task::join_error_message(err), "boom");
//! ```

use std::any::Any;

pub use tokio::task::{spawn_blocking, JoinError, JoinHandle};

/// Spawns a new asynchronous task on the current Tokio runtime.
///
/// # Panics
///
/// Panics when called outside of a runtime context, like `tokio::spawn`.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Extracts a readable message from a panic payload.
///
/// Payloads produced by `panic!` are either `&'static str` or `String`; any
/// other payload type is reported generically.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Describes why a spawned task failed to produce a value.
pub fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => panic_message(payload.as_ref()),
        Err(err) => err.to_string(),
    }
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;
