//! Workspace placeholder crate.
//!
//! This crate exposes the feature flags that map to the individual workspace
//! crates (`core-promise`, `core-runtime`, `bridge-desktop`). Host applications
//! can depend on `promise-engine-workspace` and enable the documented features
//! without wiring each crate individually.
//!
//! - `engine`: the promise engine, its configuration and the collaborator traits
//! - `desktop-shims` (default): `engine` plus the desktop event loop and the
//!   Tokio-backed worker pool

#[cfg(feature = "engine")]
pub use bridge_traits;
#[cfg(feature = "engine")]
pub use core_promise;
#[cfg(feature = "engine")]
pub use core_runtime;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;
