//! Shared state behind every promise handle.
//!
//! A cell is settled at most once. Until then it queues reactions; at
//! settlement the queue is drained in attach order by exactly one thread at
//! a time, and reactions attached while a drain is running are appended to
//! it, so delivery order always matches attach order.
//!
//! Progress listeners live here too. They are called on the notifying
//! thread, and settlement discards them.

use std::collections::{HashSet, VecDeque};
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::PromiseError;
use crate::scheduler::{dispatch_all, Reaction};

/// Settlement state of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseStatus {
    Pending,
    Fulfilled,
    Rejected,
}

enum Status<T> {
    Pending,
    Fulfilled(T),
    Rejected(PromiseError),
}

impl<T: Clone> Status<T> {
    fn outcome(&self) -> Option<Result<T, PromiseError>> {
        match self {
            Status::Pending => None,
            Status::Fulfilled(value) => Some(Ok(value.clone())),
            Status::Rejected(err) => Some(Err(err.clone())),
        }
    }
}

struct State<T> {
    status: Status<T>,
    /// Reactions not yet posted, in attach order.
    queue: VecDeque<Reaction<T>>,
    /// A thread is currently posting `queue`.
    draining: bool,
    /// Resolution was handed to another promise or thenable.
    adopted: bool,
    /// The promise this cell adopted, for cycle detection.
    follows: Option<Weak<Cell<T>>>,
    /// Progress listeners, dropped at settlement.
    listeners: Vec<Listener>,
}

/// A progress update. Any JSON value: a percentage, a status line, a
/// structured record.
pub type Progress = serde_json::Value;

pub(crate) type Listener = Arc<dyn Fn(&Progress) + Send + Sync>;

thread_local! {
    /// Cascade steps waiting behind the one this thread is running.
    static CASCADE: std::cell::RefCell<Option<VecDeque<Box<dyn FnOnce()>>>> =
        const { std::cell::RefCell::new(None) };
}

/// Run `job` now, or queue it if this thread is already running a cascade
/// step. Abandoning one link of a chain releases the next link's last
/// resolver, and notifying one link notifies the next; the queue keeps both
/// flat however long the chain is.
fn cascade(job: Box<dyn FnOnce()>) {
    let first = CASCADE.with(|slot| {
        let mut slot = slot.borrow_mut();
        match slot.as_mut() {
            Some(waiting) => {
                waiting.push_back(job);
                None
            }
            None => {
                *slot = Some(VecDeque::new());
                Some(job)
            }
        }
    });
    let Some(first) = first else {
        return;
    };

    let _reset = CascadeScope;
    first();
    while let Some(next) =
        CASCADE.with(|slot| slot.borrow_mut().as_mut().and_then(VecDeque::pop_front))
    {
        next();
    }
}

/// Clears the queue when the outermost step returns or unwinds.
struct CascadeScope;

impl Drop for CascadeScope {
    fn drop(&mut self) {
        // Dropped outside the borrow: leftover jobs own cells whose drop may
        // release resolvers again.
        let leftover = CASCADE.try_with(|slot| slot.borrow_mut().take());
        drop(leftover);
    }
}

pub(crate) struct Cell<T> {
    state: Mutex<State<T>>,
    settled: Condvar,
    resolvers: AtomicUsize,
}

impl<T> Cell<T>
where
    T: Clone + Send + 'static,
{
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                status: Status::Pending,
                queue: VecDeque::new(),
                draining: false,
                adopted: false,
                follows: None,
                listeners: Vec::new(),
            }),
            settled: Condvar::new(),
            resolvers: AtomicUsize::new(0),
        })
    }

    pub(crate) fn settled_with(outcome: Result<T, PromiseError>) -> Arc<Self> {
        let cell = Self::new();
        cell.state.lock().status = match outcome {
            Ok(value) => Status::Fulfilled(value),
            Err(err) => Status::Rejected(err),
        };
        cell
    }

    pub(crate) fn status(&self) -> PromiseStatus {
        match self.state.lock().status {
            Status::Pending => PromiseStatus::Pending,
            Status::Fulfilled(_) => PromiseStatus::Fulfilled,
            Status::Rejected(_) => PromiseStatus::Rejected,
        }
    }

    /// Settle the cell. Returns false if it was already settled, or if
    /// `respect_adoption` is set and resolution was handed elsewhere.
    pub(crate) fn settle(&self, outcome: Result<T, PromiseError>, respect_adoption: bool) -> bool {
        let (listeners, drain) = {
            let mut state = self.state.lock();
            if !matches!(state.status, Status::Pending) || (respect_adoption && state.adopted) {
                return false;
            }
            state.status = match outcome {
                Ok(value) => Status::Fulfilled(value),
                Err(err) => Status::Rejected(err),
            };
            state.follows = None;
            trace!(
                reactions = state.queue.len(),
                fulfilled = matches!(state.status, Status::Fulfilled(_)),
                "Promise settled"
            );
            let drain = !state.draining && !state.queue.is_empty();
            state.draining |= drain;
            (mem::take(&mut state.listeners), drain)
        };
        self.settled.notify_all();
        // Listeners may own other cells; release them unlocked.
        drop(listeners);
        if drain {
            self.drain();
        }
        true
    }

    /// Queue a reaction. Reactions on a settled cell are posted right away,
    /// behind any reactions still being drained.
    pub(crate) fn attach(&self, reaction: Reaction<T>) {
        {
            let mut state = self.state.lock();
            state.queue.push_back(reaction);
            if matches!(state.status, Status::Pending) || state.draining {
                return;
            }
            state.draining = true;
        }
        self.drain();
    }

    fn drain(&self) {
        loop {
            let (batch, outcome) = {
                let mut state = self.state.lock();
                let outcome = match state.status.outcome() {
                    Some(outcome) if !state.queue.is_empty() => outcome,
                    _ => {
                        state.draining = false;
                        return;
                    }
                };
                let batch: Vec<_> = mem::take(&mut state.queue).into();
                (batch, outcome)
            };
            // Posting happens outside the lock: a refused post drops the
            // continuation, which may settle other cells.
            dispatch_all(batch, &outcome);
        }
    }

    /// Mark resolution as handed to `source` (`None` for a foreign
    /// thenable). Returns false if the cell is settled, or already adopted
    /// and `respect_adoption` is set.
    pub(crate) fn begin_adoption(
        &self,
        source: Option<&Arc<Cell<T>>>,
        respect_adoption: bool,
    ) -> bool {
        let mut state = self.state.lock();
        if !matches!(state.status, Status::Pending) || (respect_adoption && state.adopted) {
            return false;
        }
        state.adopted = true;
        state.follows = source.map(Arc::downgrade);
        true
    }

    /// Register a progress listener. False, and `listener` is dropped, if
    /// the cell is already settled.
    pub(crate) fn listen(&self, listener: Listener) -> bool {
        let mut state = self.state.lock();
        if !matches!(state.status, Status::Pending) {
            return false;
        }
        state.listeners.push(listener);
        true
    }

    /// Report progress to every listener. False once settled, or if
    /// `respect_adoption` is set and resolution was handed elsewhere.
    pub(crate) fn notify(&self, progress: Progress, respect_adoption: bool) -> bool {
        let listeners = {
            let state = self.state.lock();
            if !matches!(state.status, Status::Pending) || (respect_adoption && state.adopted) {
                return false;
            }
            state.listeners.clone()
        };
        for listener in listeners {
            listener(&progress);
        }
        true
    }

    /// Pass this cell's progress on to `target` until this cell settles.
    pub(crate) fn forward_progress<U>(&self, target: &Arc<Cell<U>>)
    where
        U: Clone + Send + 'static,
    {
        let target = Arc::clone(target);
        self.listen(Arc::new(move |progress: &Progress| {
            let target = Arc::clone(&target);
            let progress = progress.clone();
            cascade(Box::new(move || {
                target.notify(progress, false);
            }));
        }));
    }

    #[cfg(test)]
    fn is_adopted(&self) -> bool {
        self.state.lock().adopted
    }

    /// True when following the adoption chain from `source` leads back to
    /// this cell.
    pub(crate) fn is_reachable_from(self: &Arc<Self>, source: &Arc<Cell<T>>) -> bool {
        let mut seen = HashSet::new();
        let mut current = Arc::clone(source);
        loop {
            if Arc::ptr_eq(&current, self) {
                return true;
            }
            // A loop that does not pass through this cell
            if !seen.insert(Arc::as_ptr(&current)) {
                return false;
            }
            let next = current
                .state
                .lock()
                .follows
                .as_ref()
                .and_then(Weak::upgrade);
            match next {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    /// Block until settled.
    pub(crate) fn wait(&self) -> Result<T, PromiseError> {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = state.status.outcome() {
                return outcome;
            }
            self.settled.wait(&mut state);
        }
    }

    /// Block until settled or `deadline` passes.
    pub(crate) fn wait_until(&self, deadline: Instant) -> Option<Result<T, PromiseError>> {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = state.status.outcome() {
                return Some(outcome);
            }
            if self.settled.wait_until(&mut state, deadline).timed_out() {
                return state.status.outcome();
            }
        }
    }

    pub(crate) fn add_resolver(&self) {
        self.resolvers.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop one resolver; the last one to go rejects a still-pending cell.
    pub(crate) fn release_resolver(self: &Arc<Self>) {
        if self.resolvers.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }
        let cell = Arc::clone(self);
        cascade(Box::new(move || {
            if cell.settle(Err(PromiseError::Abandoned), false) {
                trace!("Promise abandoned by its last resolver");
            }
        }));
    }
}
