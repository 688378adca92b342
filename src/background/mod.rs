//! Background task queue with host-driven completion callbacks.
//!
//! A [`BackgroundTaskQueue`] runs [`QueuedTask::process`] on one dedicated
//! worker thread, in FIFO order. Completion hooks
//! ([`QueuedTask::after_complete`]) never run on that thread: finished tasks
//! wait in the backlog until the host's next [`Ticker`] tick harvests them,
//! so a single-threaded host sees completions on its own cadence.
//!
//! The worker is started lazily by the first [`enqueue`](BackgroundTaskQueue::enqueue)
//! and stopped by [`dispose`](BackgroundTaskQueue::dispose), by dropping the
//! queue, or on its own once the backlog has been empty for the configured
//! [`IdleGrace`]. A later `enqueue` starts a fresh worker.
//!
//! ```text
//!   Idle ──enqueue──▶ Active ──dispose / idle grace elapsed──▶ Stopping ──joined──▶ Idle
//! ```
//!
//! A panic inside `process` stops the worker and leaves the queue faulted:
//! `enqueue` fails with [`QueueError::WorkerPanicked`] until the owner calls
//! `dispose`, which reports the fault once and resets the queue.

mod backlog;
mod worker;

pub use backlog::Backlog;

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::collections::{SlotId, SlotList};
use crate::config::{IdleGrace, QueueConfig};
use crate::ticker::{SubscriptionId, Ticker};

/// Errors produced by the task queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("background worker panicked: {message}")]
    WorkerPanicked { message: String },

    #[error("failed to spawn background worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("a queue cannot be disposed from its own worker thread")]
    DisposeFromWorker,

    #[error("task {0} is not pending")]
    NotPending(SlotId),
}

/// A unit of work for a [`BackgroundTaskQueue`].
///
/// Tasks are shared between the worker and the host, so every hook takes
/// `&self`; use interior mutability for results.
pub trait QueuedTask: Send + Sync + Sized + 'static {
    /// Called on the enqueuing thread, under the backlog lock, before this
    /// task is added. Returning `false` discards the task.
    ///
    /// Must not call back into the queue.
    fn before_enqueue(&self, _backlog: &mut Backlog<'_, Self>) -> bool {
        true
    }

    /// Does the work. Called once, on the worker thread.
    fn process(&self);

    /// Called on the thread that ticks the host [`Ticker`], some time after
    /// `process` returned.
    fn after_complete(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Active,
    Stopping,
}

struct State<T> {
    phase: Phase,
    tasks: SlotList<Arc<T>>,
    /// In-flight task; `None` once the worker has drained everything queued.
    current: Option<SlotId>,
    grace: IdleGrace,
    /// Time the backlog has been empty; `None` while tasks remain.
    idle_timer: Option<Duration>,
    fault: Option<String>,
    /// Set by the worker, under the lock, as it returns.
    worker_exited: bool,
    worker: Option<JoinHandle<()>>,
    subscription: Option<SubscriptionId>,
}

/// Handles taken from the state when a stop begins.
struct Teardown {
    worker: Option<JoinHandle<()>>,
    subscription: Option<SubscriptionId>,
}

impl<T> State<T> {
    fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            tasks: SlotList::with_capacity(0),
            current: None,
            grace: IdleGrace::Never,
            idle_timer: None,
            fault: None,
            worker_exited: false,
            worker: None,
            subscription: None,
        }
    }

    /// Unlinks every task the worker has moved past, oldest first.
    fn take_completed(&mut self) -> Vec<Arc<T>> {
        let mut completed = Vec::new();
        while let Some(id) = self.tasks.first() {
            if self.current == Some(id) {
                break;
            }
            match self.tasks.remove(id) {
                Ok(task) => completed.push(task),
                Err(_) => break,
            }
        }
        completed
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    /// Wakes the worker.
    wake: Condvar,
    /// Signalled when a stop finishes and the queue is idle again.
    stopped: Condvar,
    ticker: Ticker,
    config: QueueConfig,
}

impl<T: QueuedTask> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the worker and subscribes to the ticker. Called with the lock held.
    fn activate(self: &Arc<Self>, state: &mut State<T>) -> Result<(), QueueError> {
        let shared = Arc::clone(self);
        let worker = thread::Builder::new()
            .name(self.config.worker_name.clone())
            .spawn(move || worker::run(&shared))?;

        let weak = Arc::downgrade(self);
        let subscription = self.ticker.subscribe(move |delta| {
            if let Some(shared) = weak.upgrade() {
                shared.on_tick(delta);
            }
        });

        state.phase = Phase::Active;
        state.tasks = SlotList::with_capacity(self.config.initial_capacity);
        state.current = None;
        state.idle_timer = None;
        state.worker_exited = false;
        state.worker = Some(worker);
        state.subscription = Some(subscription);

        debug!(worker = %self.config.worker_name, "background worker started");
        Ok(())
    }

    /// Harvests finished tasks, or advances the idle timer once the backlog
    /// is empty.
    ///
    /// Completion hooks run before the queue decides whether it is idle, so
    /// work they enqueue keeps the worker alive.
    fn on_tick(&self, delta: Duration) {
        let mut state = self.lock();
        if state.phase != Phase::Active {
            return;
        }

        let (idle_timer, grace) = (state.idle_timer, state.grace);
        if let Some(elapsed) = idle_timer {
            if let IdleGrace::After(limit) = grace {
                let elapsed = elapsed.saturating_add(delta);
                state.idle_timer = Some(elapsed);
                if elapsed > limit {
                    drop(state);
                    self.stop_idle();
                }
            }
            return;
        }

        let completed = state.take_completed();
        drop(state);

        if !completed.is_empty() {
            trace!(count = completed.len(), "harvested completed tasks");
        }
        for task in &completed {
            task.after_complete();
        }
        drop(completed);

        let mut state = self.lock();
        if state.phase != Phase::Active || state.idle_timer.is_some() || !state.tasks.is_empty() {
            return;
        }
        let grace = state.grace;
        match grace {
            IdleGrace::Immediate => {
                drop(state);
                self.stop_idle();
            }
            IdleGrace::After(_) | IdleGrace::Never => state.idle_timer = Some(Duration::ZERO),
        }
    }

    fn stop_idle(&self) {
        debug!("background queue idle, stopping worker");
        if let Err(error) = self.dispose() {
            warn!(%error, "idle background queue stopped with an error");
        }
    }

    fn dispose(&self) -> Result<(), QueueError> {
        match self.begin_stop()? {
            Some(teardown) => self.finish_stop(teardown),
            None => Ok(()),
        }
    }

    /// Moves an active queue to `Stopping` and wakes the worker so it can
    /// drain and exit. Returns `None` if there is nothing to stop.
    fn begin_stop(&self) -> Result<Option<Teardown>, QueueError> {
        let teardown = {
            let mut state = self.lock();
            if state.phase != Phase::Active {
                return Ok(None);
            }
            let on_worker = state
                .worker
                .as_ref()
                .is_some_and(|worker| worker.thread().id() == thread::current().id());
            if on_worker {
                return Err(QueueError::DisposeFromWorker);
            }
            state.phase = Phase::Stopping;
            Teardown {
                worker: state.worker.take(),
                subscription: state.subscription.take(),
            }
        };
        self.wake.notify_all();
        Ok(Some(teardown))
    }

    /// Joins the worker, harvests what it finished and resets to `Idle`.
    fn finish_stop(&self, teardown: Teardown) -> Result<(), QueueError> {
        if let Some(subscription) = teardown.subscription {
            self.ticker.unsubscribe(subscription);
        }
        let joined = teardown.worker.map(JoinHandle::join);

        let (completed, leftover, fault) = {
            let mut state = self.lock();
            let completed = state.take_completed();
            let mut fault = state.fault.take();
            if let Some(Err(payload)) = joined {
                fault.get_or_insert_with(|| worker::panic_message(payload.as_ref()));
            }
            let leftover = std::mem::replace(&mut *state, State::idle()).tasks;
            (completed, leftover, fault)
        };
        self.stopped.notify_all();

        for task in &completed {
            task.after_complete();
        }
        if !leftover.is_empty() {
            debug!(dropped = leftover.len(), "dropped tasks the worker never finished");
        }
        drop(leftover);

        debug!(worker = %self.config.worker_name, "background worker stopped");
        match fault {
            Some(message) => Err(QueueError::WorkerPanicked { message }),
            None => Ok(()),
        }
    }
}

/// A FIFO queue drained by a single background thread.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::time::Duration;
/// use slotqueue::{BackgroundTaskQueue, IdleGrace, QueuedTask, Ticker};
///
/// #[derive(Default)]
/// struct Checksum {
///     done: AtomicBool,
/// }
///
/// impl QueuedTask for Checksum {
///     fn process(&self) {
///         // expensive work off the host thread
///     }
///
///     fn after_complete(&self) {
///         self.done.store(true, Ordering::SeqCst);
///     }
/// }
///
/// let ticker = Ticker::new();
/// let queue = BackgroundTaskQueue::new(ticker.clone());
/// queue.enqueue(Checksum::default(), IdleGrace::Immediate).unwrap();
///
/// // The host loop: tick until the queue has stopped itself.
/// while queue.is_working() {
///     ticker.tick(Duration::from_millis(16));
///     std::thread::sleep(Duration::from_millis(1));
/// }
/// assert!(!queue.has_task());
/// ```
pub struct BackgroundTaskQueue<T: QueuedTask> {
    shared: Arc<Shared<T>>,
}

impl<T: QueuedTask> BackgroundTaskQueue<T> {
    /// Creates an idle queue harvested by `ticker`, with default settings.
    pub fn new(ticker: Ticker) -> Self {
        Self::with_config(ticker, QueueConfig::default())
    }

    pub fn with_config(ticker: Ticker, config: QueueConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::idle()),
                wake: Condvar::new(),
                stopped: Condvar::new(),
                ticker,
                config,
            }),
        }
    }

    /// Adds `task` to the back of the queue, starting the worker if needed.
    ///
    /// `grace` replaces the queue's idle grace period, and the idle timer is
    /// reset, even when the task is then rejected by
    /// [`QueuedTask::before_enqueue`].
    ///
    /// While the queue is stopping, the task joins the drain if the worker is
    /// still running. Once the worker has exited, this blocks until the stop
    /// finishes and then starts a fresh worker.
    ///
    /// Returns `Ok(false)` if `before_enqueue` rejected the task.
    ///
    /// # Errors
    ///
    /// - [`QueueError::WorkerPanicked`] while the queue is faulted; call
    ///   [`dispose`](Self::dispose) to reset it.
    /// - [`QueueError::Spawn`] if the worker thread could not be started.
    pub fn enqueue(&self, task: T, grace: IdleGrace) -> Result<bool, QueueError> {
        let mut state = self.shared.lock();
        while state.phase == Phase::Stopping && state.worker_exited {
            trace!("enqueue waiting for the stopping worker to be joined");
            state = self
                .shared
                .stopped
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if let Some(message) = &state.fault {
            return Err(QueueError::WorkerPanicked {
                message: message.clone(),
            });
        }
        if state.phase == Phase::Idle {
            self.shared.activate(&mut state)?;
        }

        state.grace = grace;
        state.idle_timer = None;

        let task = Arc::new(task);
        let state = &mut *state;
        if !task.before_enqueue(&mut Backlog::new(&mut state.tasks, state.current)) {
            trace!("task rejected before enqueue");
            return Ok(false);
        }

        let id = state.tasks.add_last(task);
        if state.current.is_none() {
            state.current = Some(id);
        }
        trace!(task = %id, backlog = state.tasks.len(), "task enqueued");

        self.shared.wake.notify_one();
        Ok(true)
    }

    /// [`enqueue`](Self::enqueue) with the configured idle grace period.
    pub fn submit(&self, task: T) -> Result<bool, QueueError> {
        self.enqueue(task, self.shared.config.idle_grace)
    }

    /// Visits every task in the backlog, oldest first, under the backlog lock.
    ///
    /// `f` must not call back into the queue.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&T),
    {
        let state = self.shared.lock();
        for task in state.tasks.iter() {
            f(task.as_ref());
        }
    }

    /// Drops every task the worker has not started. The in-flight task keeps
    /// running. Dropped tasks get neither `process` nor `after_complete`.
    ///
    /// Returns the number of tasks dropped.
    pub fn clear_unprocessed(&self) -> usize {
        let removed = {
            let mut state = self.shared.lock();
            let Some(current) = state.current else {
                return 0;
            };
            let mut removed = Vec::new();
            while let Some(next) = state.tasks.next(current) {
                match state.tasks.remove(next) {
                    Ok(task) => removed.push(task),
                    Err(_) => break,
                }
            }
            removed
        };
        if !removed.is_empty() {
            debug!(count = removed.len(), "cleared unprocessed tasks");
        }
        removed.len()
    }

    /// Stops the worker and returns the queue to idle.
    ///
    /// Blocks until the worker has finished every task queued so far, then
    /// runs `after_complete` for them on the calling thread. Does nothing if
    /// the queue is idle.
    ///
    /// # Errors
    ///
    /// - [`QueueError::WorkerPanicked`] if a task panicked since the worker
    ///   started. The queue is still reset.
    /// - [`QueueError::DisposeFromWorker`] when called from inside
    ///   [`QueuedTask::process`]; nothing is changed.
    pub fn dispose(&self) -> Result<(), QueueError> {
        self.shared.dispose()
    }

    /// Returns `true` while tasks are queued, running, or waiting to be harvested.
    pub fn has_task(&self) -> bool {
        !self.shared.lock().tasks.is_empty()
    }

    /// Number of tasks in the backlog.
    pub fn len(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_task()
    }

    /// Returns `true` while a worker is running and accepting work.
    pub fn is_working(&self) -> bool {
        self.shared.lock().phase == Phase::Active
    }

    /// Returns `true` if a task panicked and the queue has not been disposed since.
    pub fn is_faulted(&self) -> bool {
        self.shared.lock().fault.is_some()
    }

    /// Thread id of the current worker, if one is running.
    pub fn worker_id(&self) -> Option<ThreadId> {
        self.shared
            .lock()
            .worker
            .as_ref()
            .map(|worker| worker.thread().id())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }
}

impl<T: QueuedTask> Drop for BackgroundTaskQueue<T> {
    fn drop(&mut self) {
        if let Err(error) = self.shared.dispose() {
            warn!(%error, "background queue dropped with an error");
        }
    }
}

impl<T: QueuedTask> fmt::Debug for BackgroundTaskQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("BackgroundTaskQueue")
            .field("phase", &state.phase)
            .field("backlog", &state.tasks.len())
            .field("in_flight", &state.current)
            .field("faulted", &state.fault.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::Instant;

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;
    type Hook = Box<dyn Fn(&Job, &mut Backlog<'_, Job>) -> bool + Send + Sync>;

    struct Job {
        name: &'static str,
        key: u32,
        log: Log,
        gate: Option<Mutex<Receiver<()>>>,
        fail: bool,
        hook: Option<Hook>,
    }

    impl Job {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                key: 0,
                log: Arc::clone(log),
                gate: None,
                fail: false,
                hook: None,
            }
        }

        fn keyed(mut self, key: u32) -> Self {
            self.key = key;
            self
        }

        fn gated(mut self) -> (Self, Sender<()>) {
            let (tx, rx) = mpsc::channel();
            self.gate = Some(Mutex::new(rx));
            (self, tx)
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn with_hook<F>(mut self, hook: F) -> Self
        where
            F: Fn(&Job, &mut Backlog<'_, Job>) -> bool + Send + Sync + 'static,
        {
            self.hook = Some(Box::new(hook));
            self
        }

        fn record(&self, event: &str) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{event}:{}", self.name));
        }
    }

    impl QueuedTask for Job {
        fn before_enqueue(&self, backlog: &mut Backlog<'_, Self>) -> bool {
            match &self.hook {
                Some(hook) => hook(self, backlog),
                None => true,
            }
        }

        fn process(&self) {
            if let Some(gate) = &self.gate {
                let _ = gate.lock().unwrap().recv();
            }
            if self.fail {
                panic!("{} failed", self.name);
            }
            self.record("process");
        }

        fn after_complete(&self) {
            self.record("complete");
        }
    }

    fn new_log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    /// Names recorded for one kind of event, in order.
    fn events(log: &Log, kind: &str) -> Vec<String> {
        entries(log)
            .into_iter()
            .filter_map(|entry| entry.strip_prefix(&format!("{kind}:")).map(str::to_owned))
            .collect()
    }

    fn supersede(job: &Job, backlog: &mut Backlog<'_, Job>) -> bool {
        let stale: Vec<_> = backlog
            .pending()
            .filter(|(_, queued)| queued.key == job.key)
            .map(|(id, _)| id)
            .collect();
        for id in stale {
            backlog.cancel(id).unwrap();
        }
        true
    }

    fn pump_until(ticker: &Ticker, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for the queue");
            ticker.tick(Duration::ZERO);
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn idle_queue_reports_nothing() {
        let queue: BackgroundTaskQueue<Job> = BackgroundTaskQueue::new(Ticker::new());
        assert!(!queue.is_working());
        assert!(!queue.has_task());
        assert!(queue.worker_id().is_none());
        assert_eq!(queue.clear_unprocessed(), 0);
        assert!(queue.dispose().is_ok());
    }

    #[test]
    fn rejected_task_is_not_linked() {
        let ticker = Ticker::new();
        let log = new_log();
        let queue = BackgroundTaskQueue::new(ticker.clone());

        let accepted = queue
            .enqueue(Job::new("a", &log).with_hook(|_, _| false), IdleGrace::Never)
            .unwrap();

        assert!(!accepted);
        assert!(!queue.has_task());
        // The worker still starts, as it would for an accepted task.
        assert!(queue.is_working());
        assert_eq!(ticker.len(), 1);
        queue.dispose().unwrap();
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn newer_task_supersedes_pending_one() {
        let ticker = Ticker::new();
        let log = new_log();
        let queue = BackgroundTaskQueue::new(ticker.clone());

        let (blocker, release) = Job::new("blocker", &log).gated();
        queue.enqueue(blocker, IdleGrace::Never).unwrap();
        queue
            .enqueue(Job::new("old", &log).keyed(1).with_hook(supersede), IdleGrace::Never)
            .unwrap();
        queue
            .enqueue(Job::new("new", &log).keyed(1).with_hook(supersede), IdleGrace::Never)
            .unwrap();
        assert_eq!(queue.len(), 2);

        release.send(()).unwrap();
        pump_until(&ticker, || !queue.has_task());

        assert_eq!(events(&log, "process"), vec!["blocker", "new"]);
        assert_eq!(events(&log, "complete"), vec!["blocker", "new"]);
    }

    #[test]
    fn in_flight_task_cannot_be_cancelled() {
        let ticker = Ticker::new();
        let log = new_log();
        let queue = BackgroundTaskQueue::new(ticker.clone());
        let outcome = Arc::new(Mutex::new(None));

        let (blocker, release) = Job::new("blocker", &log).gated();
        queue.enqueue(blocker, IdleGrace::Never).unwrap();

        let seen = Arc::clone(&outcome);
        let probe = Job::new("probe", &log).with_hook(move |_, backlog| {
            let in_flight = backlog.in_flight().unwrap();
            assert!(!backlog.is_pending(in_flight));
            assert_eq!(backlog.get(in_flight).map(|job| job.name), Some("blocker"));
            *seen.lock().unwrap() = Some(backlog.cancel(in_flight));
            true
        });
        queue.enqueue(probe, IdleGrace::Never).unwrap();

        let result = outcome.lock().unwrap().take().unwrap();
        assert!(matches!(result, Err(QueueError::NotPending(_))));

        release.send(()).unwrap();
        queue.dispose().unwrap();
        assert_eq!(
            entries(&log),
            vec![
                "process:blocker",
                "process:probe",
                "complete:blocker",
                "complete:probe"
            ]
        );
    }

    #[test]
    fn for_each_visits_backlog_in_order() {
        let log = new_log();
        let queue = BackgroundTaskQueue::new(Ticker::new());

        let (blocker, release) = Job::new("a", &log).gated();
        queue.enqueue(blocker, IdleGrace::Never).unwrap();
        queue.enqueue(Job::new("b", &log), IdleGrace::Never).unwrap();
        queue.enqueue(Job::new("c", &log), IdleGrace::Never).unwrap();

        let mut names = Vec::new();
        queue.for_each(|job| names.push(job.name));
        assert_eq!(names, vec!["a", "b", "c"]);

        release.send(()).unwrap();
    }

    #[test]
    fn completion_runs_on_ticking_thread() {
        struct WhereAmI {
            process_thread: Mutex<Option<(ThreadId, Option<String>)>>,
            complete_thread: Arc<Mutex<Option<ThreadId>>>,
        }

        impl QueuedTask for WhereAmI {
            fn process(&self) {
                let current = thread::current();
                *self.process_thread.lock().unwrap() =
                    Some((current.id(), current.name().map(str::to_owned)));
            }

            fn after_complete(&self) {
                let (worker, name) = self.process_thread.lock().unwrap().clone().unwrap();
                assert_ne!(worker, thread::current().id());
                assert_eq!(name.as_deref(), Some("test-worker"));
                *self.complete_thread.lock().unwrap() = Some(thread::current().id());
            }
        }

        let ticker = Ticker::new();
        let config = QueueConfig {
            worker_name: String::from("test-worker"),
            ..QueueConfig::default()
        };
        let queue = BackgroundTaskQueue::with_config(ticker.clone(), config);
        let completed_on = Arc::new(Mutex::new(None));

        queue
            .enqueue(
                WhereAmI {
                    process_thread: Mutex::new(None),
                    complete_thread: Arc::clone(&completed_on),
                },
                IdleGrace::Never,
            )
            .unwrap();
        pump_until(&ticker, || !queue.has_task());

        assert_eq!(*completed_on.lock().unwrap(), Some(thread::current().id()));
    }

    #[test]
    fn panic_faults_queue_until_disposed() {
        let ticker = Ticker::new();
        let log = new_log();
        let queue = BackgroundTaskQueue::new(ticker.clone());

        queue.enqueue(Job::new("ok", &log), IdleGrace::Never).unwrap();
        queue
            .enqueue(Job::new("boom", &log).failing(), IdleGrace::Never)
            .unwrap();
        pump_until(&ticker, || queue.is_faulted());

        let err = queue
            .enqueue(Job::new("refused", &log), IdleGrace::Never)
            .unwrap_err();
        assert!(matches!(err, QueueError::WorkerPanicked { ref message } if message == "boom failed"));

        // The failed task is stuck in flight, so the queue never goes idle.
        pump_until(&ticker, || entries(&log).contains(&String::from("complete:ok")));
        assert!(queue.has_task());
        assert!(queue.is_working());

        let err = queue.dispose().unwrap_err();
        assert!(matches!(err, QueueError::WorkerPanicked { .. }));
        assert!(!queue.is_faulted());
        assert!(!queue.has_task());
        assert!(ticker.is_empty());

        // A fresh worker takes new work.
        queue.enqueue(Job::new("again", &log), IdleGrace::Never).unwrap();
        queue.dispose().unwrap();
        assert_eq!(
            entries(&log),
            vec!["process:ok", "complete:ok", "process:again", "complete:again"]
        );
    }

    #[test]
    fn enqueue_after_worker_exit_waits_for_fresh_worker() {
        let ticker = Ticker::new();
        let log = new_log();
        let queue = BackgroundTaskQueue::new(ticker.clone());

        queue.enqueue(Job::new("a", &log), IdleGrace::Never).unwrap();
        let first_worker = queue.worker_id();

        // Stop halfway: the worker drains and exits, the join has not happened.
        let teardown = queue.shared.begin_stop().unwrap().unwrap();
        pump_until(&ticker, || queue.shared.lock().worker_exited);

        thread::scope(|scope| {
            let late = scope.spawn(|| queue.enqueue(Job::new("late", &log), IdleGrace::Never));
            thread::sleep(Duration::from_millis(50));
            assert!(!late.is_finished());

            queue.shared.finish_stop(teardown).unwrap();
            assert!(late.join().unwrap().unwrap());
        });

        assert!(queue.is_working());
        assert!(queue.worker_id().is_some());
        assert_ne!(queue.worker_id(), first_worker);

        queue.dispose().unwrap();
        assert_eq!(events(&log, "process"), vec!["a", "late"]);
        assert_eq!(events(&log, "complete"), vec!["a", "late"]);
    }

    #[test]
    fn enqueue_while_worker_drains_joins_the_drain() {
        let ticker = Ticker::new();
        let log = new_log();
        let queue = BackgroundTaskQueue::new(ticker.clone());

        let (blocker, release) = Job::new("blocker", &log).gated();
        queue.enqueue(blocker, IdleGrace::Never).unwrap();
        let teardown = queue.shared.begin_stop().unwrap().unwrap();

        // The worker is still busy, so the task rides along with the drain.
        assert!(queue.enqueue(Job::new("rider", &log), IdleGrace::Never).unwrap());
        release.send(()).unwrap();
        queue.shared.finish_stop(teardown).unwrap();

        assert!(!queue.is_working());
        assert_eq!(
            entries(&log),
            vec![
                "process:blocker",
                "process:rider",
                "complete:blocker",
                "complete:rider"
            ]
        );
    }

    #[test]
    fn submit_uses_configured_grace() {
        let ticker = Ticker::new();
        let log = new_log();
        let config = QueueConfig {
            idle_grace: IdleGrace::Immediate,
            ..QueueConfig::default()
        };
        let queue = BackgroundTaskQueue::with_config(ticker.clone(), config);

        queue.submit(Job::new("a", &log)).unwrap();
        pump_until(&ticker, || !queue.is_working());

        assert_eq!(entries(&log), vec!["process:a", "complete:a"]);
    }

    #[test]
    fn drop_waits_for_queued_work() {
        let ticker = Ticker::new();
        let log = new_log();
        {
            let queue = BackgroundTaskQueue::new(ticker.clone());
            for name in ["a", "b"] {
                queue.enqueue(Job::new(name, &log), IdleGrace::Never).unwrap();
            }
        }
        assert!(ticker.is_empty());
        assert_eq!(
            entries(&log),
            vec!["process:a", "process:b", "complete:a", "complete:b"]
        );
    }
}
