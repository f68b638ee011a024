//! Free functions for building and combining promises.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::ThreadContext;
use parking_lot::Mutex;

use crate::error::PromiseError;
use crate::outcome::Outcome;
use crate::promise::Promise;

/// Call `f` now and wrap its outcome. A panic becomes a rejection instead of
/// unwinding into the caller.
pub fn attempt<T, R, F>(context: ThreadContext, f: F) -> Promise<T>
where
    T: Clone + Send + 'static,
    R: Outcome<T>,
    F: FnOnce() -> R,
{
    Promise::guarded(context, f)
}

pub fn resolve<T>(context: ThreadContext, value: T) -> Promise<T>
where
    T: Clone + Send + 'static,
{
    Promise::resolved(context, value)
}

pub fn reject<T>(context: ThreadContext, reason: impl Into<PromiseError>) -> Promise<T>
where
    T: Clone + Send + 'static,
{
    Promise::rejected(context, reason)
}

/// Fulfill with `value` after `delay`.
pub fn delayed_resolve<T>(context: ThreadContext, value: T, delay: Duration) -> Promise<T>
where
    T: Clone + Send + 'static,
{
    delayed(context, Ok(value), delay)
}

/// Reject with `reason` after `delay`.
pub fn delayed_reject<T>(
    context: ThreadContext,
    reason: impl Into<PromiseError>,
    delay: Duration,
) -> Promise<T>
where
    T: Clone + Send + 'static,
{
    delayed(context, Err(reason.into()), delay)
}

fn delayed<T>(context: ThreadContext, outcome: Result<T, PromiseError>, delay: Duration) -> Promise<T>
where
    T: Clone + Send + 'static,
{
    let (promise, resolver) = Promise::pending(context.clone());
    let timer = resolver.clone();
    if let Err(err) = context.post_delayed(delay, Box::new(move || timer.settle_result(outcome))) {
        resolver.reject(err);
    }
    promise
}

struct Slots<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

/// Fulfill with every input's value, in input order, once all fulfill.
/// The first rejection observed rejects the result; other inputs are left
/// running and their results ignored.
///
/// Inputs are any [`Outcome`]: promises, or plain results.
pub fn all<T, R, I>(context: ThreadContext, inputs: I) -> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
    R: Outcome<T>,
    I: IntoIterator<Item = R>,
{
    let promises: Vec<Promise<T>> = inputs
        .into_iter()
        .map(|input| Promise::guarded(context.clone(), move || input))
        .collect();
    all_promises(context, promises)
}

fn all_promises<T>(context: ThreadContext, promises: Vec<Promise<T>>) -> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
{
    if promises.is_empty() {
        return Promise::resolved(context, Vec::new());
    }

    let (aggregate, resolver) = Promise::pending(context.clone());
    let slots = Arc::new(Mutex::new(Slots {
        values: vec![None; promises.len()],
        remaining: promises.len(),
    }));

    for (index, promise) in promises.into_iter().enumerate() {
        let resolver = resolver.clone();
        let slots = Arc::clone(&slots);
        promise.attach(
            context.clone(),
            Box::new(move |outcome| match outcome {
                Ok(value) => {
                    let complete = {
                        let mut slots = slots.lock();
                        slots.values[index] = Some(value);
                        slots.remaining -= 1;
                        if slots.remaining == 0 {
                            Some(slots.values.drain(..).flatten().collect())
                        } else {
                            None
                        }
                    };
                    if let Some(values) = complete {
                        resolver.resolve(values);
                    }
                }
                Err(err) => resolver.reject(err),
            }),
        );
    }

    aggregate
}

/// Fulfill with the first input to fulfill. If every input rejects, reject
/// with [`PromiseError::Aggregate`] holding the reasons in input order. An
/// empty input rejects with an empty aggregate.
pub fn any<T, R, I>(context: ThreadContext, inputs: I) -> Promise<T>
where
    T: Clone + Send + 'static,
    R: Outcome<T>,
    I: IntoIterator<Item = R>,
{
    let promises: Vec<Promise<T>> = inputs
        .into_iter()
        .map(|input| Promise::guarded(context.clone(), move || input))
        .collect();

    if promises.is_empty() {
        return Promise::rejected(context, PromiseError::Aggregate(Vec::new()));
    }

    let (first, resolver) = Promise::pending(context.clone());
    let slots = Arc::new(Mutex::new(Slots::<PromiseError> {
        values: vec![None; promises.len()],
        remaining: promises.len(),
    }));

    for (index, promise) in promises.into_iter().enumerate() {
        let resolver = resolver.clone();
        let slots = Arc::clone(&slots);
        promise.attach(
            context.clone(),
            Box::new(move |outcome| match outcome {
                Ok(value) => resolver.resolve(value),
                Err(err) => {
                    let complete = {
                        let mut slots = slots.lock();
                        slots.values[index] = Some(err);
                        slots.remaining -= 1;
                        if slots.remaining == 0 {
                            Some(slots.values.drain(..).flatten().collect())
                        } else {
                            None
                        }
                    };
                    if let Some(reasons) = complete {
                        resolver.reject(PromiseError::Aggregate(reasons));
                    }
                }
            }),
        );
    }

    first
}

/// Apply `mapper` to every element, in order, right away. The result holds
/// each element's (possibly asynchronous) outcome in input order; the first
/// rejection rejects it.
pub fn map<T, U, R, F>(context: ThreadContext, values: Vec<T>, mut mapper: F) -> Promise<Vec<U>>
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
    R: Outcome<U>,
    F: FnMut(T, usize) -> R,
{
    let promises: Vec<Promise<U>> = values
        .into_iter()
        .enumerate()
        .map(|(index, value)| Promise::guarded(context.clone(), || mapper(value, index)))
        .collect();
    all_promises(context, promises)
}

/// Keep the elements whose predicate fulfills with `true`, preserving order.
pub fn filter<T, R, F>(context: ThreadContext, values: Vec<T>, mut predicate: F) -> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
    R: Outcome<bool>,
    F: FnMut(&T, usize) -> R,
{
    let flags: Vec<Promise<bool>> = values
        .iter()
        .enumerate()
        .map(|(index, value)| Promise::guarded(context.clone(), || predicate(value, index)))
        .collect();

    all_promises(context, flags).then(move |keep| -> Result<Vec<T>, PromiseError> {
        Ok(values
            .into_iter()
            .zip(keep)
            .filter_map(|(value, keep)| keep.then_some(value))
            .collect())
    })
}

/// Run `visitor` on every element and fulfill with the unchanged sequence
/// once every visit has fulfilled.
pub fn each<T, U, R, F>(context: ThreadContext, values: Vec<T>, mut visitor: F) -> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
    R: Outcome<U>,
    F: FnMut(&T, usize) -> R,
{
    let visits: Vec<Promise<U>> = values
        .iter()
        .enumerate()
        .map(|(index, value)| Promise::guarded(context.clone(), || visitor(value, index)))
        .collect();

    all_promises(context, visits).then(move |_| -> Result<Vec<T>, PromiseError> { Ok(values) })
}
