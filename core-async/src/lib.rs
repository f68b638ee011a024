//! Runtime abstraction layer for the promise engine.
//!
//! Every crate in the workspace that needs worker threads, blocking-task
//! execution or timers goes through this crate instead of naming Tokio
//! directly. Keeping the dependency in one place means the executor can be
//! swapped without touching the engine.
//!
//! # Modules
//!
//! - `runtime`: building the worker runtime, `block_on`
//! - `task`: spawning async and blocking work, turning panics into messages
//! - `sync`: channels for signalling between tasks and threads
//! - `time`: durations, instants and deadlines
//!
//! # Examples
//!
//! ```rust
//! use core_async::runtime;
//! use core_async::task;
//!
//! let rt = runtime::worker_runtime(2, "doc-worker").unwrap();
//! let answer = rt.block_on(async {
//!     task::spawn_blocking(|| 6 * 7).await.unwrap()
//! });
//! assert_eq!(answer, 42);
//! ```

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

// Re-export commonly used types at crate root for convenience
pub use task::{spawn, spawn_blocking};
pub use time::{Duration, Instant};

// Macros used when racing timers against shutdown signals
pub use tokio::select;
