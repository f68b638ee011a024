//! Runtime error type shared by configuration and logging bootstrap.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid engine settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors caused by the caller's configuration rather than the
    /// environment.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Settings(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
