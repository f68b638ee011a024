//! Runtime utilities that abstract over the underlying async executor.
//!
//! We wrap Tokio's runtime primitives so that downstream crates never need to
//! depend on Tokio directly.

pub use tokio::runtime::{Builder, Handle, Runtime};

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Runs the provided future to completion using a lightweight runtime.
///
/// Returns an error if the runtime could not be built.
pub fn block_on<F>(future: F) -> io::Result<F::Output>
where
    F: std::future::Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}

/// Builds the multi-threaded runtime that backs the worker pool.
///
/// `worker_threads` bounds both the async workers and the blocking pool, so
/// at most that many background jobs run at once. Threads are named
/// `{name}-{n}`.
///
/// # Examples
///
/// ```rust
/// use core_async::runtime::worker_runtime;
///
/// let rt = worker_runtime(4, "render").unwrap();
/// assert_eq!(rt.block_on(async { 1 + 1 }), 2);
/// ```
pub fn worker_runtime(worker_threads: usize, name: &str) -> io::Result<Runtime> {
    let threads = worker_threads.max(1);
    let prefix = name.to_string();
    let counter = AtomicUsize::new(0);

    Builder::new_multi_thread()
        .worker_threads(threads)
        .max_blocking_threads(threads)
        .thread_name_fn(move || {
            let n = counter.fetch_add(1, Ordering::Relaxed);
            format!("{}-{}", prefix, n)
        })
        .enable_all()
        .build()
}
