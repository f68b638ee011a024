//! Time-related abstractions.
//!
//! Re-exports Tokio's timer primitives for async code and adds the deadline
//! arithmetic used by the event loop's `run_for`.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{deadline_after, Duration, Instant};
//!
//! let start = Instant::now();
//! let deadline = deadline_after(Duration::from_millis(50));
//! assert!(deadline >= start + Duration::from_millis(50));
//! ```

pub use tokio::time::{sleep, timeout, Sleep, Timeout};

pub use std::time::{Duration, Instant};

/// Upper bound applied to timer delays so `Instant` arithmetic cannot overflow.
pub const MAX_DELAY: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Returns the instant `delay` from now, clamping absurd delays to [`MAX_DELAY`].
pub fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay.min(MAX_DELAY)).unwrap_or(now + MAX_DELAY)
}
