//! Thread-bound Event Loop Implementation

use bridge_traits::{
    dispatch::{Callback, Dispatcher, ThreadContext, ThreadKey},
    error::{BridgeError, Result},
};
use core_async::runtime::{self, Handle, Runtime};
use core_async::sync::watch;
use core_async::task::panic_message;
use core_async::time::{deadline_after, sleep, Duration, Instant, MAX_DELAY};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{debug, error, trace, warn};

/// How often `run_until` re-checks its condition while the queue is idle.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

const TIMER_THREAD_NAME: &str = "desktop-timer";

/// Runtime that drives delayed posts. Owned when the dispatcher started it.
struct TimerDriver {
    handle: Handle,
    runtime: Option<Runtime>,
}

/// Registry of event loops, addressed by [`ThreadKey`].
///
/// Delayed callbacks wait on a Tokio timer and are pushed onto their loop's
/// queue when it fires. The timer runtime is started on the first delayed
/// post unless one was supplied with [`with_timer_handle`](Self::with_timer_handle).
pub struct DesktopDispatcher {
    loops: RwLock<HashMap<ThreadKey, Arc<LoopQueue>>>,
    next_key: AtomicU64,
    timers: Mutex<Option<TimerDriver>>,
}

impl DesktopDispatcher {
    /// Create a dispatcher with no registered loops.
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    /// Create a dispatcher whose timers run on an existing runtime. The
    /// runtime is not owned and must outlive the delayed posts.
    pub fn with_timer_handle(handle: Handle) -> Arc<Self> {
        Self::build(Some(TimerDriver {
            handle,
            runtime: None,
        }))
    }

    fn build(timers: Option<TimerDriver>) -> Arc<Self> {
        Arc::new(Self {
            loops: RwLock::new(HashMap::new()),
            next_key: AtomicU64::new(1),
            timers: Mutex::new(timers),
        })
    }

    /// Number of loops currently accepting callbacks.
    pub fn loop_count(&self) -> usize {
        self.loops.read().len()
    }

    fn register(&self) -> Arc<LoopQueue> {
        let key = ThreadKey(self.next_key.fetch_add(1, Ordering::Relaxed));
        let queue = Arc::new(LoopQueue::new(key));
        self.loops.write().insert(key, Arc::clone(&queue));
        debug!(thread = %key, "Registered event loop");
        queue
    }

    fn unregister(&self, key: ThreadKey) {
        self.loops.write().remove(&key);
        debug!(thread = %key, "Unregistered event loop");
    }

    fn queue(&self, key: ThreadKey) -> Result<Arc<LoopQueue>> {
        self.loops
            .read()
            .get(&key)
            .cloned()
            .ok_or(BridgeError::LoopClosed(key))
    }

    fn timer_handle(&self) -> Result<Handle> {
        let mut timers = self.timers.lock();
        if let Some(driver) = timers.as_ref() {
            return Ok(driver.handle.clone());
        }

        let runtime = runtime::worker_runtime(1, TIMER_THREAD_NAME).map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to start timer runtime: {}", e))
        })?;
        let handle = runtime.handle().clone();
        debug!("Started timer runtime for delayed posts");
        *timers = Some(TimerDriver {
            handle: handle.clone(),
            runtime: Some(runtime),
        });
        Ok(handle)
    }
}

impl Dispatcher for DesktopDispatcher {
    fn post(&self, thread: ThreadKey, callback: Callback) -> Result<()> {
        let queue = self.queue(thread)?;
        queue.push(callback)
    }

    fn post_delayed(&self, thread: ThreadKey, delay: Duration, callback: Callback) -> Result<()> {
        let queue = self.queue(thread)?;
        let timers = self.timer_handle()?;
        let mut closed = queue.closed_signal();

        timers.spawn(async move {
            core_async::select! {
                _ = closed.wait_for(|closed| *closed) => {
                    trace!(thread = %queue.key, "Dropping delayed callback: event loop closed");
                }
                _ = sleep(delay.min(MAX_DELAY)) => {
                    if let Err(err) = queue.push(callback) {
                        trace!(thread = %queue.key, error = %err, "Dropping delayed callback");
                    }
                }
            }
        });
        Ok(())
    }
}

impl Drop for DesktopDispatcher {
    fn drop(&mut self) {
        // Dropping a Runtime inside async context panics; background shutdown
        // is safe from any thread.
        if let Some(runtime) = self.timers.get_mut().take().and_then(|d| d.runtime) {
            runtime.shutdown_background();
        }
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Callback>,
    closed: bool,
    quit_requested: bool,
}

struct LoopQueue {
    key: ThreadKey,
    state: Mutex<QueueState>,
    wakeup: Condvar,
    /// Flips to `true` when the loop closes; pending timers watch it.
    closed_tx: watch::Sender<bool>,
}

impl LoopQueue {
    fn new(key: ThreadKey) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            key,
            state: Mutex::new(QueueState::default()),
            wakeup: Condvar::new(),
            closed_tx,
        }
    }

    fn push(&self, callback: Callback) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BridgeError::LoopClosed(self.key));
        }
        state.ready.push_back(callback);
        self.wakeup.notify_one();
        Ok(())
    }

    fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }

    fn request_quit(&self) {
        let mut state = self.state.lock();
        state.quit_requested = true;
        self.wakeup.notify_all();
    }

    /// Marks the queue closed and hands back everything still queued so the
    /// caller can drop it without holding the lock.
    fn close(&self) -> VecDeque<Callback> {
        let ready = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.ready)
        };
        self.closed_tx.send_replace(true);
        ready
    }
}

enum Exit {
    Quit,
    Done,
    TimedOut,
}

/// An event loop bound to the thread that created it.
///
/// Callbacks posted to this loop's [`ThreadKey`] run only while the owning
/// thread is inside [`run`](EventLoop::run), [`run_until`](EventLoop::run_until),
/// [`run_for`](EventLoop::run_for) or [`process_events`](EventLoop::process_events).
/// Dropping the loop unregisters it; callbacks still queued are dropped
/// without running.
pub struct EventLoop {
    queue: Arc<LoopQueue>,
    dispatcher: Arc<DesktopDispatcher>,
    // Not Send: the loop belongs to the thread that created it.
    _thread_bound: PhantomData<*const ()>,
}

impl EventLoop {
    /// Register a new loop for the current thread.
    pub fn new(dispatcher: &Arc<DesktopDispatcher>) -> Self {
        Self {
            queue: dispatcher.register(),
            dispatcher: Arc::clone(dispatcher),
            _thread_bound: PhantomData,
        }
    }

    pub fn key(&self) -> ThreadKey {
        self.queue.key
    }

    /// Context that delivers callbacks to this loop.
    pub fn context(&self) -> ThreadContext {
        let dispatcher: Arc<dyn Dispatcher> = self.dispatcher.clone();
        ThreadContext::new(dispatcher, self.queue.key)
    }

    /// A handle that stops `run` from any thread.
    pub fn quit_handle(&self) -> QuitHandle {
        QuitHandle {
            queue: Arc::clone(&self.queue),
        }
    }

    /// Callbacks queued and ready to run. Delayed callbacks count once their
    /// timer has fired.
    pub fn pending_events(&self) -> usize {
        self.queue.state.lock().ready.len()
    }

    /// Runs the callbacks that are ready when called, without blocking.
    ///
    /// Callbacks posted while processing wait for the next call. Returns the
    /// number of callbacks run.
    pub fn process_events(&self) -> usize {
        let budget = self.queue.state.lock().ready.len();

        let mut ran = 0;
        while ran < budget {
            let next = self.queue.state.lock().ready.pop_front();
            match next {
                Some(callback) => {
                    self.invoke(callback);
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }

    /// Runs callbacks until [`QuitHandle::quit`] is called. Sleeps while the
    /// queue is empty.
    pub fn run(&self) {
        self.run_loop(None, None);
    }

    /// Runs callbacks until `done` returns true or the loop is asked to quit.
    ///
    /// `done` is checked between callbacks and at least every few
    /// milliseconds while idle. Returns whether `done` became true.
    pub fn run_until<F>(&self, mut done: F) -> bool
    where
        F: FnMut() -> bool,
    {
        matches!(self.run_loop(None, Some(&mut done)), Exit::Done)
    }

    /// Runs callbacks for `duration`, or until asked to quit.
    pub fn run_for(&self, duration: Duration) {
        self.run_loop(Some(deadline_after(duration)), None);
    }

    fn run_loop(&self, until: Option<Instant>, mut done: Option<&mut dyn FnMut() -> bool>) -> Exit {
        trace!(thread = %self.queue.key, "Event loop running");
        loop {
            if let Some(done) = done.as_mut() {
                if (*done)() {
                    return Exit::Done;
                }
            }

            let callback = {
                let mut state = self.queue.state.lock();
                loop {
                    if state.quit_requested {
                        state.quit_requested = false;
                        trace!(thread = %self.queue.key, "Event loop quit");
                        return Exit::Quit;
                    }

                    if let Some(callback) = state.ready.pop_front() {
                        break callback;
                    }

                    let now = Instant::now();
                    if until.is_some_and(|limit| limit <= now) {
                        return Exit::TimedOut;
                    }

                    // Idle: a push or quit wakes us. Only a pending condition
                    // check or run deadline bounds the wait.
                    let mut wake_at = done.as_ref().map(|_| now + POLL_INTERVAL);
                    if let Some(limit) = until {
                        wake_at = Some(wake_at.map_or(limit, |at| at.min(limit)));
                    }
                    match wake_at {
                        Some(at) => {
                            self.queue.wakeup.wait_until(&mut state, at);
                        }
                        None => self.queue.wakeup.wait(&mut state),
                    }

                    if let Some(done) = done.as_mut() {
                        drop(state);
                        if (*done)() {
                            return Exit::Done;
                        }
                        state = self.queue.state.lock();
                    }
                }
            };

            self.invoke(callback);
        }
    }

    fn invoke(&self, callback: Callback) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(callback)) {
            error!(
                thread = %self.queue.key,
                panic = %panic_message(payload.as_ref()),
                "Event loop callback panicked"
            );
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.dispatcher.unregister(self.queue.key);
        let ready = self.queue.close();
        let dropped = ready.len();
        if dropped > 0 {
            warn!(
                thread = %self.queue.key,
                dropped,
                "Event loop closed with callbacks still queued"
            );
        }
        // Dropping may settle promises whose resolvers lived in the callbacks;
        // that must happen after the queue lock is released.
        drop(ready);
    }
}

/// Stops a running [`EventLoop`] from any thread.
#[derive(Clone)]
pub struct QuitHandle {
    queue: Arc<LoopQueue>,
}

impl QuitHandle {
    pub fn quit(&self) {
        self.queue.request_quit();
    }

    pub fn key(&self) -> ThreadKey {
        self.queue.key
    }
}

/// An [`EventLoop`] running on a dedicated thread.
///
/// Dropping the handle quits the loop and joins the thread.
pub struct LoopThread {
    context: ThreadContext,
    quit: QuitHandle,
    join: Option<thread::JoinHandle<()>>,
}

impl LoopThread {
    /// Spawn a thread named `name` that runs an event loop until shut down.
    pub fn spawn(dispatcher: &Arc<DesktopDispatcher>, name: &str) -> io::Result<Self> {
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let dispatcher = Arc::clone(dispatcher);

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let event_loop = EventLoop::new(&dispatcher);
                if ready_tx
                    .send((event_loop.context(), event_loop.quit_handle()))
                    .is_err()
                {
                    return;
                }
                event_loop.run();
            })?;

        let (context, quit) = ready_rx.recv().map_err(|_| {
            io::Error::new(
                io::ErrorKind::Other,
                "event loop thread exited during startup",
            )
        })?;

        debug!(thread = %context.thread(), name, "Spawned event loop thread");

        Ok(Self {
            context,
            quit,
            join: Some(join),
        })
    }

    pub fn context(&self) -> ThreadContext {
        self.context.clone()
    }

    pub fn key(&self) -> ThreadKey {
        self.context.thread()
    }

    /// Quit the loop and wait for its thread to finish.
    pub fn shutdown(mut self) -> thread::Result<()> {
        self.quit.quit();
        match self.join.take() {
            Some(join) => join.join(),
            None => Ok(()),
        }
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        self.quit.quit();
        if let Some(join) = self.join.take() {
            // Joining from the loop's own thread would never return.
            if join.thread().id() != thread::current().id() && join.join().is_err() {
                warn!(thread = %self.context.thread(), "Event loop thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    fn recorder() -> (Arc<parking_lot::Mutex<Vec<u32>>>, impl Fn(u32) -> Callback) {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |n: u32| -> Callback {
            let sink = Arc::clone(&sink);
            Box::new(move || sink.lock().push(n))
        };
        (log, make)
    }

    #[test]
    fn test_post_runs_in_fifo_order() {
        let dispatcher = DesktopDispatcher::new();
        let event_loop = EventLoop::new(&dispatcher);
        let (log, make) = recorder();

        for n in 0..5 {
            dispatcher.post(event_loop.key(), make(n)).unwrap();
        }

        assert_eq!(event_loop.process_events(), 5);
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_post_never_runs_inline() {
        let dispatcher = DesktopDispatcher::new();
        let event_loop = EventLoop::new(&dispatcher);
        let context = event_loop.context();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        context
            .post(Box::new(move || flag.store(true, Ordering::SeqCst)))
            .unwrap();

        assert!(!ran.load(Ordering::SeqCst));
        event_loop.process_events();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_process_events_defers_nested_posts() {
        let dispatcher = DesktopDispatcher::new();
        let event_loop = EventLoop::new(&dispatcher);
        let context = event_loop.context();
        let count = Arc::new(AtomicUsize::new(0));

        let inner_count = Arc::clone(&count);
        let inner_context = context.clone();
        context
            .post(Box::new(move || {
                inner_count.fetch_add(1, Ordering::SeqCst);
                let again = Arc::clone(&inner_count);
                inner_context
                    .post(Box::new(move || {
                        again.fetch_add(1, Ordering::SeqCst);
                    }))
                    .unwrap();
            }))
            .unwrap();

        assert_eq!(event_loop.process_events(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(event_loop.process_events(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delayed_callbacks_respect_deadlines() {
        let dispatcher = DesktopDispatcher::new();
        let event_loop = EventLoop::new(&dispatcher);
        let (log, make) = recorder();
        let key = event_loop.key();

        dispatcher
            .post_delayed(key, Duration::from_millis(40), make(2))
            .unwrap();
        dispatcher
            .post_delayed(key, Duration::from_millis(10), make(1))
            .unwrap();
        dispatcher.post(key, make(0)).unwrap();

        let start = Instant::now();
        event_loop.run_until(|| log.lock().len() == 3);

        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_delayed_callback_waits_for_its_timer() {
        let dispatcher = DesktopDispatcher::new();
        let event_loop = EventLoop::new(&dispatcher);
        let (log, make) = recorder();

        let start = Instant::now();
        event_loop
            .context()
            .post_delayed(Duration::from_millis(30), make(1))
            .unwrap();

        assert_eq!(event_loop.process_events(), 0);
        assert!(event_loop.run_until(|| !log.lock().is_empty()));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_timer_wakes_idle_run() {
        let dispatcher = DesktopDispatcher::new();
        let event_loop = EventLoop::new(&dispatcher);
        let quit = event_loop.quit_handle();
        let (log, make) = recorder();

        let context = event_loop.context();
        context.post_delayed(Duration::from_millis(15), make(7)).unwrap();
        context
            .post_delayed(Duration::from_millis(40), Box::new(move || quit.quit()))
            .unwrap();

        event_loop.run();
        assert_eq!(*log.lock(), vec![7]);
    }

    #[test]
    fn test_post_to_closed_loop_fails_and_drops_callback() {
        let dispatcher = DesktopDispatcher::new();
        let event_loop = EventLoop::new(&dispatcher);
        let key = event_loop.key();
        drop(event_loop);

        let marker = Arc::new(());
        let held = Arc::clone(&marker);
        let err = dispatcher
            .post(key, Box::new(move || drop(held)))
            .unwrap_err();

        assert!(matches!(err, BridgeError::LoopClosed(k) if k == key));
        assert_eq!(Arc::strong_count(&marker), 1);
        assert_eq!(dispatcher.loop_count(), 0);
    }

    #[test]
    fn test_dropping_loop_drops_queued_callbacks() {
        let dispatcher = DesktopDispatcher::new();
        let event_loop = EventLoop::new(&dispatcher);
        let marker = Arc::new(());
        let held = Arc::clone(&marker);

        event_loop
            .context()
            .post(Box::new(move || drop(held)))
            .unwrap();
        assert_eq!(Arc::strong_count(&marker), 2);

        drop(event_loop);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_dropping_loop_cancels_pending_timers() {
        let dispatcher = DesktopDispatcher::new();
        let event_loop = EventLoop::new(&dispatcher);
        let marker = Arc::new(());
        let held = Arc::clone(&marker);

        event_loop
            .context()
            .post_delayed(Duration::from_secs(60), Box::new(move || drop(held)))
            .unwrap();
        assert_eq!(Arc::strong_count(&marker), 2);

        drop(event_loop);
        let deadline = Instant::now() + Duration::from_secs(2);
        while Arc::strong_count(&marker) > 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_delayed_post_to_closed_loop_fails() {
        let dispatcher = DesktopDispatcher::new();
        let key = EventLoop::new(&dispatcher).key();

        let err = dispatcher
            .post_delayed(key, Duration::from_millis(1), Box::new(|| {}))
            .unwrap_err();
        assert!(matches!(err, BridgeError::LoopClosed(k) if k == key));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_timers_on_supplied_runtime() {
        let dispatcher = DesktopDispatcher::with_timer_handle(Handle::current());
        let (tx, rx) = core_async::sync::oneshot::channel();

        let worker = LoopThread::spawn(&dispatcher, "timer-host").unwrap();
        worker
            .context()
            .post_delayed(
                Duration::from_millis(10),
                Box::new(move || {
                    let _ = tx.send(thread::current().name().map(str::to_string));
                }),
            )
            .unwrap();

        assert_eq!(rx.await.unwrap().as_deref(), Some("timer-host"));
        assert!(dispatcher.timers.lock().as_ref().is_some_and(|d| d.runtime.is_none()));
    }

    #[test]
    fn test_panicking_callback_does_not_stop_loop() {
        let dispatcher = DesktopDispatcher::new();
        let event_loop = EventLoop::new(&dispatcher);
        let (log, make) = recorder();

        event_loop
            .context()
            .post(Box::new(|| panic!("callback failure")))
            .unwrap();
        event_loop.context().post(make(9)).unwrap();

        assert_eq!(event_loop.process_events(), 2);
        assert_eq!(*log.lock(), vec![9]);
    }

    #[test]
    fn test_run_for_returns_after_duration() {
        let dispatcher = DesktopDispatcher::new();
        let event_loop = EventLoop::new(&dispatcher);

        let start = Instant::now();
        event_loop.run_for(Duration::from_millis(20));

        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_loop_thread_runs_callbacks_on_its_thread() {
        let dispatcher = DesktopDispatcher::new();
        let worker = LoopThread::spawn(&dispatcher, "loop-test").unwrap();
        let (tx, rx) = mpsc::channel();

        worker
            .context()
            .post(Box::new(move || {
                let name = thread::current().name().map(str::to_string);
                tx.send(name).unwrap();
            }))
            .unwrap();

        let name = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(name.as_deref(), Some("loop-test"));

        let key = worker.key();
        worker.shutdown().unwrap();
        assert!(dispatcher.post(key, Box::new(|| {})).is_err());
    }

    #[test]
    fn test_quit_handle_stops_run() {
        let dispatcher = DesktopDispatcher::new();
        let event_loop = EventLoop::new(&dispatcher);
        let quit = event_loop.quit_handle();

        event_loop
            .context()
            .post_delayed(Duration::from_millis(10), Box::new(move || quit.quit()))
            .unwrap();

        event_loop.run();
        assert_eq!(event_loop.pending_events(), 0);
    }
}
