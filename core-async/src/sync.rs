//! Synchronization primitives for async code.
//!
//! Re-exports the `tokio::sync` channels used across the workspace so that
//! callers never name Tokio directly.
//!
//! # Examples
//!
//! ```rust
//! use core_async::{runtime, sync::watch};
//!
//! let rt = runtime::worker_runtime(1, "doc-sync").unwrap();
//! let (closed_tx, mut closed_rx) = watch::channel(false);
//! closed_tx.send_replace(true);
//! rt.block_on(async move {
//!     closed_rx.wait_for(|closed| *closed).await.unwrap();
//! });
//! ```

pub use tokio::sync::{oneshot, watch};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_receiver_sees_latest_value() {
        let (tx, rx) = watch::channel(0_u32);
        tx.send_replace(3);
        assert_eq!(*rx.borrow(), 3);
    }

    #[test]
    fn test_subscriber_created_after_update_sees_it() {
        let (tx, _rx) = watch::channel(false);
        tx.send_replace(true);
        assert!(*tx.subscribe().borrow());
    }
}
