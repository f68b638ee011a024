//! # Promise Engine
//!
//! A Promises/A+ style engine whose continuations are thread-affine: each
//! promise handle is bound to an event-loop thread, and every callback
//! attached to it runs on that thread, whichever thread settled the value.
//!
//! ## Overview
//!
//! - [`Promise`] / [`Resolver`]: the handle and the capability to settle it.
//!   Settlement is first-wins and may happen from any thread.
//! - Chaining: `then`, `then_or`, `fail`, `fail_on`, plus the side-effect,
//!   timing and sequence combinators (`tap`, `tap_fail`, `finally`, `delay`,
//!   `timeout`, `map`, `filter`, `each`).
//! - [`helpers`]: `attempt`, `resolve`, `reject`, `all`, `any`, delayed
//!   constructors, and `map`/`filter`/`each` over plain vectors.
//! - [`TaskBridge`]: runs a closure on the worker pool and returns a promise
//!   bound to the caller's thread.
//! - Progress: [`Resolver::notify`] reports a [`Progress`] value while the
//!   promise is pending, and [`Promise::on_progress`] receives it on the
//!   handle's thread. `then` chains and adoption pass progress along.
//! - `Promise` implements `IntoFuture`, so async code can `.await` it.
//!
//! The engine never runs a continuation inline. Delivery goes through the
//! [`Dispatcher`](bridge_traits::Dispatcher) of the handle's
//! [`ThreadContext`], so callers never observe synchronous re-entry.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopDispatcher, EventLoop};
//! use core_promise::{helpers, TaskBridge};
//! use core_runtime::EngineConfig;
//!
//! let dispatcher = DesktopDispatcher::new();
//! let main_loop = EventLoop::new(&dispatcher);
//! let config = EngineConfig::builder().build()?;
//! let bridge = TaskBridge::from_config(&config, main_loop.context());
//!
//! let quit = main_loop.quit_handle();
//! bridge
//!     .run_value(|| expensive_computation())
//!     .then(|value| Ok(value * 2))
//!     .finally(move || {
//!         quit.quit();
//!         Ok(())
//!     });
//!
//! main_loop.run();
//! ```

mod cell;
mod combinators;
mod future;
mod outcome;
mod promise;
mod scheduler;

pub mod bridge;
pub mod error;
pub mod helpers;

pub use bridge::TaskBridge;
pub use cell::{Progress, PromiseStatus};
pub use error::{PromiseError, Result};
pub use future::PromiseFuture;
pub use outcome::{Outcome, Thenable};
pub use promise::{Promise, Resolver};

// Re-export the collaborator types every caller needs
pub use bridge_traits::{ThreadContext, ThreadKey};
