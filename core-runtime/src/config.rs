//! # Engine Configuration Module
//!
//! Configuration management for the promise engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct an
//! [`EngineConfig`] holding the worker pool the task bridge submits to, plus
//! the settings used to size it. Validation is fail-fast: a bad worker count
//! is reported before any thread is started.
//!
//! Plain settings can be loaded from JSON with [`EngineSettings::from_json`]
//! and handed to the builder; explicit builder calls override them.
//!
//! ## Required Dependencies
//!
//! - `TaskExecutor` - worker pool for `TaskBridge::run`
//!
//! When the `desktop-shims` feature is enabled, a `TokioTaskExecutor` sized
//! from the settings is injected automatically if none is provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{EngineConfig, EngineSettings};
//!
//! let settings = EngineSettings::from_json(r#"{ "worker_threads": 4 }"#)?;
//! let config = EngineConfig::builder()
//!     .settings(settings)
//!     .worker_thread_name("image-decoder")
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! Without `desktop-shims` and without an injected executor, `build()` fails
//! with [`Error::CapabilityMissing`] naming the missing trait.

use crate::error::{Error, Result};
use crate::logging::{self, LogLevel, LoggingConfig};
use bridge_traits::TaskExecutor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Hard upper bound on worker threads accepted by validation.
pub const MAX_WORKER_THREADS: usize = 512;

const DEFAULT_THREAD_NAME: &str = "promise-worker";

/// Serializable engine settings.
///
/// Missing fields take their defaults, so `{}` is a valid document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Number of worker threads in the default task executor
    pub worker_threads: usize,

    /// Name prefix for worker threads
    pub worker_thread_name: String,

    /// Minimum level for engine log output
    pub log_level: LogLevel,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            worker_thread_name: DEFAULT_THREAD_NAME.to_string(),
            log_level: LogLevel::Info,
        }
    }
}

impl EngineSettings {
    /// Parse settings from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: EngineSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validates the settings and returns an error if invalid.
    ///
    /// This checks:
    /// - Worker count is within 1..=512
    /// - Worker thread name is not blank
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::Config(
                "Worker thread count must be greater than 0".to_string(),
            ));
        }

        if self.worker_threads > MAX_WORKER_THREADS {
            return Err(Error::Config(format!(
                "Worker thread count {} exceeds maximum of {}",
                self.worker_threads, MAX_WORKER_THREADS
            )));
        }

        if self.worker_thread_name.trim().is_empty() {
            return Err(Error::Config(
                "Worker thread name cannot be empty. Use .worker_thread_name() to set it."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Available parallelism, clamped to 1..=64.
fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, 64)
}

/// Engine configuration.
///
/// Use [`EngineConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct EngineConfig {
    /// Settings the executor was sized from
    pub settings: EngineSettings,

    /// Worker pool used by the task bridge
    pub task_executor: Arc<dyn TaskExecutor>,

    /// Logging bootstrap configuration
    pub logging: LoggingConfig,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("settings", &self.settings)
            .field("task_executor", &"TaskExecutor { ... }")
            .field("logging", &self.logging)
            .finish()
    }
}

impl EngineConfig {
    /// Creates a new builder for constructing an `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.settings.validate()
    }

    /// Install the global `tracing` subscriber described by this config.
    pub fn init_logging(&self) -> Result<()> {
        logging::init_logging(self.logging.clone())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn task_executor_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "TaskExecutor".to_string(),
        message: "TaskExecutor implementation is required to run background work. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default TokioTaskExecutor. \
                 Embedded hosts: inject an adapter over the host's own worker pool."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_task_executor(settings: &EngineSettings) -> Result<Arc<dyn TaskExecutor>> {
    use bridge_desktop::TokioTaskExecutor;

    let executor =
        TokioTaskExecutor::with_workers(settings.worker_threads, &settings.worker_thread_name)
            .map_err(|e| {
                Error::Internal(format!("Failed to start default TaskExecutor: {}", e))
            })?;

    tracing::debug!(
        worker_threads = settings.worker_threads,
        thread_name = %settings.worker_thread_name,
        "Using default Tokio task executor"
    );

    let executor: Arc<dyn TaskExecutor> = Arc::new(executor);
    Ok(executor)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_task_executor(_settings: &EngineSettings) -> Result<Arc<dyn TaskExecutor>> {
    Err(task_executor_missing_error())
}

/// Builder for constructing [`EngineConfig`] instances.
#[derive(Default)]
pub struct EngineConfigBuilder {
    settings: Option<EngineSettings>,
    worker_threads: Option<usize>,
    worker_thread_name: Option<String>,
    task_executor: Option<Arc<dyn TaskExecutor>>,
    logging: Option<LoggingConfig>,
}

impl EngineConfigBuilder {
    /// Start from previously loaded settings.
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Sets the worker count for the default executor.
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = Some(count);
        self
    }

    pub fn worker_thread_name(mut self, name: impl Into<String>) -> Self {
        self.worker_thread_name = Some(name.into());
        self
    }

    /// Injects a worker pool. Worker settings are still validated but no
    /// default executor is started.
    pub fn task_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.task_executor = Some(executor);
        self
    }

    /// Overrides the logging bootstrap. Defaults to [`LoggingConfig::default`]
    /// at the settings' log level.
    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Builds the final configuration.
    ///
    /// # Errors
    ///
    /// - Settings fail validation
    /// - No executor was injected and no default is available
    pub fn build(self) -> Result<EngineConfig> {
        let mut settings = self.settings.unwrap_or_default();
        if let Some(count) = self.worker_threads {
            settings.worker_threads = count;
        }
        if let Some(name) = self.worker_thread_name {
            settings.worker_thread_name = name;
        }

        settings.validate()?;

        let task_executor = match self.task_executor {
            Some(executor) => executor,
            None => provide_default_task_executor(&settings)?,
        };

        let logging = self
            .logging
            .unwrap_or_else(|| LoggingConfig::default().with_level(settings.log_level));

        Ok(EngineConfig {
            settings,
            task_executor,
            logging,
        })
    }
}
