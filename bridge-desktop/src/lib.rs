//! # Desktop Bridge Implementations
//!
//! Default implementations of the bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `Dispatcher` using [`DesktopDispatcher`]: every participating thread owns
//!   an [`EventLoop`] (a FIFO queue) registered with the dispatcher. Delayed
//!   posts sleep on a Tokio timer and join the queue when it fires. The
//!   GUI/main thread drives its own loop; [`LoopThread`] runs a loop on a
//!   dedicated thread.
//! - `TaskExecutor` using [`TokioTaskExecutor`]: work runs on Tokio's blocking
//!   pool, completions are reported from a Tokio worker.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopDispatcher, EventLoop, TokioTaskExecutor};
//!
//! fn main() {
//!     let dispatcher = DesktopDispatcher::new();
//!     let main_loop = EventLoop::new(&dispatcher);
//!     let executor = TokioTaskExecutor::with_workers(4, "promise-worker")?;
//!
//!     // Create promises with `main_loop.context()` ...
//!     main_loop.run();
//! }
//! ```

mod event_loop;
mod executor;

pub use event_loop::{DesktopDispatcher, EventLoop, LoopThread, QuitHandle};
pub use executor::TokioTaskExecutor;
