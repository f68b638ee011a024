//! What a callback may hand back to settle a promise.

use crate::error::PromiseError;
use crate::promise::{Promise, Resolver};

/// A value that can settle a promise: either an immediate result or another
/// promise to adopt.
///
/// Callbacks passed to `then`, `fail`, `map` and friends return any
/// `Outcome`, so a continuation can finish synchronously with `Ok(v)` /
/// `Err(e)` or asynchronously by returning a `Promise`.
pub trait Outcome<T>
where
    T: Clone + Send + 'static,
{
    fn settle_into(self, resolver: &Resolver<T>);
}

impl<T> Outcome<T> for Result<T, PromiseError>
where
    T: Clone + Send + 'static,
{
    fn settle_into(self, resolver: &Resolver<T>) {
        resolver.settle_result(self);
    }
}

impl<T> Outcome<T> for Promise<T>
where
    T: Clone + Send + 'static,
{
    fn settle_into(self, resolver: &Resolver<T>) {
        resolver.adopt(self);
    }
}

/// Anything a promise can adopt the eventual state of.
///
/// `subscribe` is called once and must eventually settle the resolver it is
/// given (or drop it, which rejects with [`PromiseError::Abandoned`]). Only
/// the first settlement counts.
pub trait Thenable<T>: Send + 'static
where
    T: Clone + Send + 'static,
{
    fn subscribe(self, resolver: Resolver<T>);

    /// The engine promise behind this thenable, used to detect adoption
    /// cycles.
    fn as_promise(&self) -> Option<&Promise<T>> {
        None
    }
}

impl<T> Thenable<T> for Promise<T>
where
    T: Clone + Send + 'static,
{
    fn subscribe(self, resolver: Resolver<T>) {
        resolver.follow_progress(&self);
        let context = self.context().clone();
        self.attach(context, Box::new(move |outcome| resolver.settle_result(outcome)));
    }

    fn as_promise(&self) -> Option<&Promise<T>> {
        Some(self)
    }
}
