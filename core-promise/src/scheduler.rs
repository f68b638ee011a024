//! Continuation delivery.
//!
//! A [`Reaction`] is a continuation bound to the thread that must run it.
//! Delivering one never runs it inline: it is always posted to its thread's
//! event loop, even when the value is already there.

use bridge_traits::ThreadContext;
use tracing::{trace, warn};

use crate::error::PromiseError;

/// Receives a settled promise's outcome on the reaction's thread.
pub(crate) type Deliver<T> = Box<dyn FnOnce(Result<T, PromiseError>) + Send + 'static>;

pub(crate) struct Reaction<T> {
    context: ThreadContext,
    deliver: Deliver<T>,
}

impl<T: Send + 'static> Reaction<T> {
    pub(crate) fn new(context: ThreadContext, deliver: Deliver<T>) -> Self {
        Self { context, deliver }
    }

    /// Post the outcome to the reaction's thread.
    ///
    /// When the loop is gone the continuation is dropped unrun. Whatever
    /// resolvers it captured are released with it, so dependent promises
    /// reject with [`PromiseError::Abandoned`] instead of hanging.
    pub(crate) fn dispatch(self, outcome: Result<T, PromiseError>) {
        let Reaction { context, deliver } = self;
        let thread = context.thread();
        match context.post(Box::new(move || deliver(outcome))) {
            Ok(()) => trace!(thread = %thread, "Continuation posted"),
            Err(err) => warn!(
                thread = %thread,
                error = %err,
                "Dropping continuation: event loop refused it"
            ),
        }
    }
}

/// Post every reaction of a batch, in order, with its own copy of the outcome.
pub(crate) fn dispatch_all<T>(batch: Vec<Reaction<T>>, outcome: &Result<T, PromiseError>)
where
    T: Clone + Send + 'static,
{
    for reaction in batch {
        reaction.dispatch(outcome.clone());
    }
}
