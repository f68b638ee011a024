use thiserror::Error;

use crate::dispatch::ThreadKey;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Event loop for thread {0} is closed")]
    LoopClosed(ThreadKey),

    #[error("Task executor has shut down")]
    ExecutorShutdown,
}

pub type Result<T> = std::result::Result<T, BridgeError>;
