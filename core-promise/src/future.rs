//! Awaiting promises from async code.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::FutureExt;

use crate::error::PromiseError;
use crate::promise::Promise;

/// Future returned by awaiting a [`Promise`].
///
/// The outcome is delivered through the promise's event loop like any other
/// continuation, so that loop must be running for the future to complete.
/// If the loop shuts down first the future resolves to
/// [`PromiseError::Abandoned`].
#[must_use = "futures do nothing unless polled"]
pub struct PromiseFuture<T> {
    receiver: oneshot::Receiver<Result<T, PromiseError>>,
}

impl<T> Future for PromiseFuture<T> {
    type Output = Result<T, PromiseError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.receiver.poll_unpin(cx).map(|received| match received {
            Ok(outcome) => outcome,
            Err(oneshot::Canceled) => Err(PromiseError::Abandoned),
        })
    }
}

impl<T> IntoFuture for Promise<T>
where
    T: Clone + Send + 'static,
{
    type Output = Result<T, PromiseError>;
    type IntoFuture = PromiseFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        let (sender, receiver) = oneshot::channel();
        let context = self.context().clone();
        self.attach(
            context,
            Box::new(move |outcome| {
                // The future may have been dropped; nothing to deliver to.
                let _ = sender.send(outcome);
            }),
        );
        PromiseFuture { receiver }
    }
}
