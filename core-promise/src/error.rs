//! Rejection reasons carried by promises.

use std::fmt;
use std::sync::Arc;

use bridge_traits::BridgeError;
use thiserror::Error;

/// Why a promise was rejected.
///
/// Cloneable because one rejection is observed by every continuation
/// attached to the promise.
#[derive(Error, Debug, Clone)]
pub enum PromiseError {
    /// An application error raised by user code.
    #[error("{0}")]
    Application(Arc<anyhow::Error>),

    #[error("promise resolved with a chain that leads back to itself")]
    CircularResolution,

    #[error("promise timed out")]
    Timeout,

    /// A callback, executor or background task panicked.
    #[error("callback panicked: {0}")]
    Panicked(String),

    /// Every resolver was dropped while the promise was still pending.
    #[error("promise abandoned before it was settled")]
    Abandoned,

    /// Every input of `any` rejected; reasons are in input order.
    #[error("all {} promises were rejected", .0.len())]
    Aggregate(Vec<PromiseError>),

    /// The event loop or worker pool refused the work.
    #[error("bridge error: {0}")]
    Bridge(String),
}

impl PromiseError {
    /// Wrap an application error.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PromiseError::Application(Arc::new(anyhow::Error::new(error)))
    }

    /// An application error that is just a message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        PromiseError::Application(Arc::new(anyhow::Error::msg(message)))
    }

    /// The application error, if it is of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        match self {
            PromiseError::Application(error) => error.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PromiseError::Timeout)
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, PromiseError::Abandoned)
    }
}

impl From<anyhow::Error> for PromiseError {
    fn from(error: anyhow::Error) -> Self {
        PromiseError::Application(Arc::new(error))
    }
}

impl From<&str> for PromiseError {
    fn from(message: &str) -> Self {
        PromiseError::msg(message.to_string())
    }
}

impl From<String> for PromiseError {
    fn from(message: String) -> Self {
        PromiseError::msg(message)
    }
}

impl From<BridgeError> for PromiseError {
    fn from(error: BridgeError) -> Self {
        PromiseError::Bridge(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PromiseError>;
