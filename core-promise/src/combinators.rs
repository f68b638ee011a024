//! Side-effect, timing and sequence combinators.
//!
//! Everything here is built on `chain`/`attach`; nothing touches a cell
//! directly.

use std::time::Duration;

use bridge_traits::ThreadContext;
use tracing::warn;

use crate::error::PromiseError;
use crate::helpers;
use crate::outcome::Outcome;
use crate::promise::{Promise, Resolver};

/// Once `side` settles, reject with its error if it failed, otherwise
/// settle `resolver` with `original`.
fn settle_after<T, U>(
    side: &Promise<U>,
    context: ThreadContext,
    resolver: &Resolver<T>,
    original: Result<T, PromiseError>,
) where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
{
    let resolver = resolver.clone();
    side.attach(
        context,
        Box::new(move |side_outcome| match side_outcome {
            Ok(_) => resolver.settle_result(original),
            Err(err) => resolver.reject(err),
        }),
    );
}

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    /// Run `on_fulfilled` for its side effect and pass the value on.
    ///
    /// If the callback's outcome is a promise, the value is passed on only
    /// after it fulfills. A failing callback rejects the returned promise.
    pub fn tap<U, R, F>(&self, on_fulfilled: F) -> Promise<T>
    where
        U: Clone + Send + 'static,
        R: Outcome<U>,
        F: FnOnce(&T) -> R + Send + 'static,
    {
        let context = self.context().clone();
        self.chain(context.clone(), move |outcome, resolver| match outcome {
            Ok(value) => {
                let side = Promise::<U>::guarded(context.clone(), || on_fulfilled(&value));
                settle_after(&side, context, resolver, Ok(value));
            }
            Err(err) => resolver.reject(err),
        })
    }

    /// Run `on_rejected` for its side effect and re-reject with the original
    /// error, unless the callback itself fails.
    pub fn tap_fail<U, R, F>(&self, on_rejected: F) -> Promise<T>
    where
        U: Clone + Send + 'static,
        R: Outcome<U>,
        F: FnOnce(&PromiseError) -> R + Send + 'static,
    {
        let context = self.context().clone();
        self.chain(context.clone(), move |outcome, resolver| match outcome {
            Ok(value) => resolver.resolve(value),
            Err(err) => {
                let side = Promise::<U>::guarded(context.clone(), || on_rejected(&err));
                settle_after(&side, context, resolver, Err(err));
            }
        })
    }

    /// Run `on_settled` whatever the outcome and forward that outcome,
    /// unless the callback fails.
    pub fn finally<U, R, F>(&self, on_settled: F) -> Promise<T>
    where
        U: Clone + Send + 'static,
        R: Outcome<U>,
        F: FnOnce() -> R + Send + 'static,
    {
        let context = self.context().clone();
        self.chain(context.clone(), move |outcome, resolver| {
            let side = Promise::<U>::guarded(context.clone(), on_settled);
            settle_after(&side, context, resolver, outcome);
        })
    }

    /// Fulfill with the same value at least `delay` after this promise
    /// fulfills. Rejections are forwarded without waiting.
    pub fn delay(&self, delay: Duration) -> Promise<T> {
        let context = self.context().clone();
        self.chain(context.clone(), move |outcome, resolver| match outcome {
            Ok(value) => {
                let timer = resolver.clone();
                if let Err(err) = context.post_delayed(delay, Box::new(move || timer.resolve(value)))
                {
                    resolver.reject(err);
                }
            }
            Err(err) => resolver.reject(err),
        })
    }

    /// Reject with [`PromiseError::Timeout`] unless this promise settles
    /// within `timeout`.
    pub fn timeout(&self, timeout: Duration) -> Promise<T> {
        self.timeout_with(timeout, PromiseError::Timeout)
    }

    /// Reject with `reason` unless this promise settles within `timeout`.
    ///
    /// The source is not cancelled; a late result is ignored.
    pub fn timeout_with(&self, timeout: Duration, reason: impl Into<PromiseError>) -> Promise<T> {
        let context = self.context().clone();
        let (promise, resolver) = Promise::pending(context.clone());

        let timer = resolver.clone();
        let reason = reason.into();
        if let Err(err) = context.post_delayed(timeout, Box::new(move || timer.reject(reason))) {
            warn!(
                thread = %context.thread(),
                error = %err,
                "Could not arm promise timeout"
            );
        }

        self.attach(
            context,
            Box::new(move |outcome| resolver.settle_result(outcome)),
        );
        promise
    }
}

impl<T> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
{
    /// Transform every element. See [`helpers::map`].
    pub fn map<U, R, F>(&self, mapper: F) -> Promise<Vec<U>>
    where
        U: Clone + Send + 'static,
        R: Outcome<U>,
        F: FnMut(T, usize) -> R + Send + 'static,
    {
        let context = self.context().clone();
        self.then(move |values| helpers::map(context, values, mapper))
    }

    /// Keep the elements whose predicate fulfills with `true`. See
    /// [`helpers::filter`].
    pub fn filter<R, F>(&self, predicate: F) -> Promise<Vec<T>>
    where
        R: Outcome<bool>,
        F: FnMut(&T, usize) -> R + Send + 'static,
    {
        let context = self.context().clone();
        self.then(move |values| helpers::filter(context, values, predicate))
    }

    /// Run `visitor` on every element, then fulfill with the unchanged
    /// sequence. See [`helpers::each`].
    pub fn each<U, R, F>(&self, visitor: F) -> Promise<Vec<T>>
    where
        U: Clone + Send + 'static,
        R: Outcome<U>,
        F: FnMut(&T, usize) -> R + Send + 'static,
    {
        let context = self.context().clone();
        self.then(move |values| helpers::each(context, values, visitor))
    }
}
