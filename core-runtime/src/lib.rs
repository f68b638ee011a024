//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the promise engine:
//! - Logging and tracing bootstrap
//! - Engine configuration (builder plus serde-loadable settings)
//!
//! ## Overview
//!
//! Nothing in here is needed to create or chain promises. Hosts use this
//! crate at startup to pick a worker pool size, install a `tracing`
//! subscriber, and obtain the [`TaskExecutor`](bridge_traits::TaskExecutor)
//! that the task bridge submits to.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{EngineConfig, EngineConfigBuilder, EngineSettings};
pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
