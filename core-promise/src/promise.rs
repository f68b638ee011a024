//! Promise handles and resolvers.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_traits::ThreadContext;
use core_async::task::panic_message;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::cell::{Cell, Progress, PromiseStatus};
use crate::error::PromiseError;
use crate::outcome::{Outcome, Thenable};
use crate::scheduler::{Deliver, Reaction};

/// A handle to an eventual value of type `T`.
///
/// Handles are cheap to clone; every clone observes the same settlement.
/// Each handle carries the [`ThreadContext`] its continuations run on:
/// callbacks attached with [`then`](Promise::then) and friends always run on
/// that thread's event loop, never inline and never on the thread that
/// happened to settle the promise.
///
/// `T: Clone` because a settled value is handed to every continuation.
pub struct Promise<T> {
    cell: Arc<Cell<T>>,
    context: ThreadContext,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            context: self.context.clone(),
        }
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    /// Create a promise and run `executor` synchronously with its resolver.
    ///
    /// A panic inside `executor` rejects the promise with
    /// [`PromiseError::Panicked`]. If the executor neither settles the
    /// resolver nor keeps a clone of it, the promise is rejected with
    /// [`PromiseError::Abandoned`].
    ///
    /// ```ignore
    /// let promise = Promise::new(ctx, |resolver| {
    ///     std::thread::spawn(move || resolver.resolve(42));
    /// });
    /// ```
    pub fn new<F>(context: ThreadContext, executor: F) -> Self
    where
        F: FnOnce(Resolver<T>),
    {
        let (promise, resolver) = Self::pending(context);
        let guard = resolver.clone();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(move || executor(resolver))) {
            guard.reject(PromiseError::Panicked(panic_message(payload.as_ref())));
        }
        promise
    }

    /// A pending promise and the resolver that settles it.
    pub fn pending(context: ThreadContext) -> (Self, Resolver<T>) {
        let cell = Cell::new();
        let resolver = Resolver::owner(Arc::clone(&cell));
        (Self { cell, context }, resolver)
    }

    /// An already fulfilled promise.
    pub fn resolved(context: ThreadContext, value: T) -> Self {
        Self {
            cell: Cell::settled_with(Ok(value)),
            context,
        }
    }

    /// An already rejected promise.
    pub fn rejected(context: ThreadContext, reason: impl Into<PromiseError>) -> Self {
        Self {
            cell: Cell::settled_with(Err(reason.into())),
            context,
        }
    }

    /// A promise that adopts the eventual state of `thenable`.
    pub fn from_thenable<P>(context: ThreadContext, thenable: P) -> Self
    where
        P: Thenable<T>,
    {
        let (promise, resolver) = Self::pending(context);
        resolver.adopt(thenable);
        promise
    }

    pub fn status(&self) -> PromiseStatus {
        self.cell.status()
    }

    pub fn is_pending(&self) -> bool {
        self.status() == PromiseStatus::Pending
    }

    pub fn is_fulfilled(&self) -> bool {
        self.status() == PromiseStatus::Fulfilled
    }

    pub fn is_rejected(&self) -> bool {
        self.status() == PromiseStatus::Rejected
    }

    /// The thread this handle's continuations run on.
    pub fn context(&self) -> &ThreadContext {
        &self.context
    }

    /// The same promise, with continuations delivered to `context`.
    pub fn on(&self, context: ThreadContext) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            context,
        }
    }

    /// Run `on_fulfilled` with the value once fulfilled. Rejections pass
    /// through to the returned promise untouched.
    pub fn then<U, R, F>(&self, on_fulfilled: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        R: Outcome<U>,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.then_on(self.context.clone(), on_fulfilled)
    }

    /// [`then`](Promise::then), with the continuation and the returned
    /// handle bound to `context`.
    pub fn then_on<U, R, F>(&self, context: ThreadContext, on_fulfilled: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        R: Outcome<U>,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.chain(context, move |outcome, resolver| match outcome {
            Ok(value) => on_fulfilled(value).settle_into(resolver),
            Err(err) => resolver.reject(err),
        })
    }

    /// Handle both outcomes. Exactly one of the callbacks runs.
    pub fn then_or<U, R, F, G>(&self, on_fulfilled: F, on_rejected: G) -> Promise<U>
    where
        U: Clone + Send + 'static,
        R: Outcome<U>,
        F: FnOnce(T) -> R + Send + 'static,
        G: FnOnce(PromiseError) -> R + Send + 'static,
    {
        self.chain(self.context.clone(), move |outcome, resolver| match outcome {
            Ok(value) => on_fulfilled(value).settle_into(resolver),
            Err(err) => on_rejected(err).settle_into(resolver),
        })
    }

    /// Recover from a rejection. Fulfillments pass through untouched.
    pub fn fail<R, G>(&self, on_rejected: G) -> Promise<T>
    where
        R: Outcome<T>,
        G: FnOnce(PromiseError) -> R + Send + 'static,
    {
        self.chain(self.context.clone(), move |outcome, resolver| match outcome {
            Ok(value) => resolver.resolve(value),
            Err(err) => on_rejected(err).settle_into(resolver),
        })
    }

    /// Recover only from application errors of type `E`; every other
    /// rejection passes through.
    pub fn fail_on<E, R, G>(&self, on_rejected: G) -> Promise<T>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
        R: Outcome<T>,
        G: FnOnce(&E) -> R + Send + 'static,
    {
        self.chain(self.context.clone(), move |outcome, resolver| match outcome {
            Ok(value) => resolver.resolve(value),
            Err(err) => {
                if let Some(matched) = err.downcast_ref::<E>() {
                    on_rejected(matched).settle_into(resolver);
                    return;
                }
                resolver.reject(err);
            }
        })
    }

    /// Call `on_progress` on this handle's thread with every progress update
    /// reported while the promise is pending. Updates are delivered in the
    /// order they were reported from any one thread. Updates reported
    /// before the callback was attached, or after settlement, are not
    /// delivered.
    pub fn on_progress<F>(&self, on_progress: F) -> &Self
    where
        F: FnMut(Progress) + Send + 'static,
    {
        let context = self.context.clone();
        let on_progress = Arc::new(Mutex::new(on_progress));
        self.cell.listen(Arc::new(move |progress: &Progress| {
            let on_progress = Arc::clone(&on_progress);
            let progress = progress.clone();
            let posted = context.post(Box::new(move || {
                let mut on_progress = on_progress.lock();
                (*on_progress)(progress);
            }));
            if let Err(err) = posted {
                trace!(error = %err, "Dropping progress update: event loop refused it");
            }
        }));
        self
    }

    /// Block the calling thread until the promise settles.
    ///
    /// No events are processed while waiting. Calling this on the thread
    /// whose loop must deliver the value deadlocks; wait from another thread.
    pub fn wait(&self) -> Result<T, PromiseError> {
        self.cell.wait()
    }

    /// [`wait`](Promise::wait) with an upper bound. `None` if still pending
    /// when `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, PromiseError>> {
        self.cell.wait_until(Instant::now() + timeout)
    }

    pub(crate) fn attach(&self, context: ThreadContext, deliver: Deliver<T>) {
        self.cell.attach(Reaction::new(context, deliver));
    }

    /// A promise bound to `context`, settled by `handler` once this one
    /// settles. A panic in `handler` rejects the new promise.
    pub(crate) fn chain<U, H>(&self, context: ThreadContext, handler: H) -> Promise<U>
    where
        U: Clone + Send + 'static,
        H: FnOnce(Result<T, PromiseError>, &Resolver<U>) + Send + 'static,
    {
        let (promise, resolver) = Promise::pending(context.clone());
        self.cell.forward_progress(&promise.cell);
        self.attach(
            context,
            Box::new(move |outcome| {
                if let Err(payload) =
                    catch_unwind(AssertUnwindSafe(|| handler(outcome, &resolver)))
                {
                    let message = panic_message(payload.as_ref());
                    debug!(panic = %message, "Continuation panicked");
                    resolver.reject(PromiseError::Panicked(message));
                }
            }),
        );
        promise
    }

    /// Run `produce` now and turn whatever it returns (or its panic) into a
    /// promise bound to `context`.
    pub(crate) fn guarded<R, F>(context: ThreadContext, produce: F) -> Self
    where
        R: Outcome<T>,
        F: FnOnce() -> R,
    {
        let (promise, resolver) = Self::pending(context);
        match catch_unwind(AssertUnwindSafe(produce)) {
            Ok(outcome) => outcome.settle_into(&resolver),
            Err(payload) => {
                resolver.reject(PromiseError::Panicked(panic_message(payload.as_ref())))
            }
        }
        promise
    }
}

impl<T> fmt::Debug for Promise<T>
where
    T: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("status", &self.status())
            .field("thread", &self.context.thread())
            .finish()
    }
}

/// Settles one promise. Cloneable; every clone settles the same promise
/// and only the first settlement takes effect.
///
/// When the last resolver of a pending promise is dropped, the promise is
/// rejected with [`PromiseError::Abandoned`].
pub struct Resolver<T>
where
    T: Clone + Send + 'static,
{
    cell: Arc<Cell<T>>,
    /// Handed to an adopted thenable; may settle after ownership moved.
    adoption: bool,
}

impl<T> Resolver<T>
where
    T: Clone + Send + 'static,
{
    fn owner(cell: Arc<Cell<T>>) -> Self {
        cell.add_resolver();
        Self {
            cell,
            adoption: false,
        }
    }

    fn for_adoption(cell: Arc<Cell<T>>) -> Self {
        cell.add_resolver();
        Self {
            cell,
            adoption: true,
        }
    }

    pub fn resolve(&self, value: T) {
        self.settle_result(Ok(value));
    }

    pub fn reject(&self, reason: impl Into<PromiseError>) {
        self.settle_result(Err(reason.into()));
    }

    /// Settle with any [`Outcome`]: a result, or a promise to adopt.
    pub fn settle(&self, outcome: impl Outcome<T>) {
        outcome.settle_into(self);
    }

    /// Follow `thenable`: this promise settles however it settles.
    ///
    /// Once adopted, further `resolve`/`reject` calls on this resolver are
    /// ignored. Adopting a promise whose adoption chain leads back here
    /// rejects with [`PromiseError::CircularResolution`].
    pub fn adopt<P>(&self, thenable: P)
    where
        P: Thenable<T>,
    {
        let respect_adoption = !self.adoption;
        let source = thenable.as_promise().map(|promise| Arc::clone(&promise.cell));

        if !self.cell.begin_adoption(source.as_ref(), respect_adoption) {
            return;
        }

        // Walk only after linking: two promises adopting each other from
        // different threads must see at least one of the two links.
        if let Some(source) = &source {
            if self.cell.is_reachable_from(source) {
                debug!("Rejecting circular promise resolution");
                self.cell.settle(Err(PromiseError::CircularResolution), false);
                return;
            }
        }

        thenable.subscribe(Resolver::for_adoption(Arc::clone(&self.cell)));
    }

    /// Report progress to the promise's [`on_progress`](Promise::on_progress)
    /// callbacks and to promises chained from it. Returns false, and
    /// reports nothing, once the promise is settled or has adopted another.
    pub fn notify(&self, progress: impl Into<Progress>) -> bool {
        self.cell.notify(progress.into(), !self.adoption)
    }

    /// True until the promise is settled.
    pub fn is_pending(&self) -> bool {
        self.cell.status() == PromiseStatus::Pending
    }

    /// Pass `source`'s progress on to this resolver's promise.
    pub(crate) fn follow_progress(&self, source: &Promise<T>) {
        source.cell.forward_progress(&self.cell);
    }

    pub(crate) fn settle_result(&self, outcome: Result<T, PromiseError>) {
        self.cell.settle(outcome, !self.adoption);
    }
}

impl<T> Clone for Resolver<T>
where
    T: Clone + Send + 'static,
{
    fn clone(&self) -> Self {
        self.cell.add_resolver();
        Self {
            cell: Arc::clone(&self.cell),
            adoption: self.adoption,
        }
    }
}

impl<T> Drop for Resolver<T>
where
    T: Clone + Send + 'static,
{
    fn drop(&mut self) {
        self.cell.release_resolver();
    }
}

impl<T> fmt::Debug for Resolver<T>
where
    T: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("status", &self.cell.status())
            .field("adoption", &self.adoption)
            .finish()
    }
}
