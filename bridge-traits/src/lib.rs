//! # Host Bridge Traits
//!
//! Collaborator contracts that a host platform implements for the promise
//! engine.
//!
//! ## Overview
//!
//! The engine never runs callbacks or background work by itself. It relies on
//! two collaborators, each represented by a trait here:
//!
//! - [`Dispatcher`](dispatch::Dispatcher) - the event loop. Posts a callback to
//!   a specific thread (FIFO per thread) and supports a delayed variant used
//!   for timers.
//! - [`TaskExecutor`](executor::TaskExecutor) - the worker pool. Runs a
//!   blocking or CPU-bound closure off the event-loop thread and reports
//!   completion exactly once.
//!
//! A [`ThreadContext`](dispatch::ThreadContext) pairs a dispatcher with the
//! key of one of its threads. Every promise handle carries one, so the thread
//! that runs a continuation is always explicit.
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | GUI toolkits | host-provided adapter over the toolkit's main loop | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. A
//! dispatcher that can no longer deliver to a thread returns
//! [`BridgeError::LoopClosed`](error::BridgeError::LoopClosed) and drops the
//! callback.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`: posting and submitting happen from
//! arbitrary threads, most importantly from worker threads completing work.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::dispatch::{Callback, Dispatcher, ThreadKey};
//! use bridge_traits::error::Result;
//! use std::time::Duration;
//!
//! struct ToolkitDispatcher { /* handle to the GUI main loop */ }
//!
//! impl Dispatcher for ToolkitDispatcher {
//!     fn post(&self, thread: ThreadKey, callback: Callback) -> Result<()> {
//!         // queue `callback` on the toolkit's loop for `thread`
//!         todo!()
//!     }
//!
//!     fn post_delayed(&self, thread: ThreadKey, delay: Duration, callback: Callback) -> Result<()> {
//!         // arm a single-shot toolkit timer
//!         todo!()
//!     }
//! }
//! ```

pub mod dispatch;
pub mod error;
pub mod executor;

pub use error::BridgeError;

// Re-export commonly used types
pub use dispatch::{Callback, Dispatcher, ThreadContext, ThreadKey};
pub use executor::{Completion, TaskExecutor, TaskId, TaskOutcome, Work};
