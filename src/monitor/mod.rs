//! Tick-driven watching of work that runs elsewhere.
//!
//! A [`TaskMonitor`] holds handles to threads or Tokio tasks and reports on
//! them from the host's [`Ticker`]. On every tick each watch gets its update
//! callback. Once its handle reports completion the watch is dropped from the
//! monitor and its completion callback runs exactly once, receiving the
//! handle so the host can collect the result.
//!
//! Callbacks run on the ticking thread with no monitor lock held, so they may
//! add or remove watches. A watch added during a tick is first polled on the
//! next one. The monitor only subscribes to the ticker while it has watches.

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use thiserror::Error;
use tracing::{debug, trace};

use crate::collections::{SlotId, SlotList};
use crate::ticker::{SubscriptionId, Ticker};

/// Errors produced by the task monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to spawn monitored thread: {0}")]
    Spawn(#[from] io::Error),
}

/// A handle that can say whether the work behind it has finished.
pub trait Completion: Send + 'static {
    fn is_complete(&self) -> bool;
}

impl<T: Send + 'static> Completion for thread::JoinHandle<T> {
    fn is_complete(&self) -> bool {
        self.is_finished()
    }
}

impl<T: Send + 'static> Completion for tokio::task::JoinHandle<T> {
    fn is_complete(&self) -> bool {
        self.is_finished()
    }
}

/// Handle returned by [`TaskMonitor::add`].
///
/// Stays tied to its watch: once the watch is gone the id never matches a
/// later watch, even one stored in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId {
    slot: SlotId,
    serial: u64,
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch{}.{}", self.slot, self.serial)
    }
}

type UpdateFn<W> = Box<dyn FnMut(&W) + Send>;
type CompleteFn<W> = Box<dyn FnOnce(W) + Send>;

struct Entry<W> {
    handle: W,
    on_update: Option<UpdateFn<W>>,
    on_complete: CompleteFn<W>,
}

struct Watch<W> {
    serial: u64,
    /// `None` while a tick is running this watch's callbacks.
    entry: Option<Entry<W>>,
}

struct Registry<W> {
    watches: SlotList<Watch<W>>,
    next_serial: u64,
    subscription: Option<SubscriptionId>,
}

impl<W> Registry<W> {
    fn holds(&self, id: WatchId) -> bool {
        self.watches
            .get(id.slot)
            .is_some_and(|watch| watch.serial == id.serial)
    }

    fn checkout(&mut self, id: WatchId) -> Option<Entry<W>> {
        self.watches
            .get_mut(id.slot)
            .filter(|watch| watch.serial == id.serial)?
            .entry
            .take()
    }
}

struct Inner<W> {
    registry: Mutex<Registry<W>>,
    ticker: Ticker,
}

impl<W: Completion> Inner<W> {
    fn lock(&self) -> MutexGuard<'_, Registry<W>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(self: &Arc<Self>, entry: Entry<W>) -> WatchId {
        let mut registry = self.lock();
        let serial = registry.next_serial;
        registry.next_serial += 1;
        let slot = registry.watches.add_last(Watch {
            serial,
            entry: Some(entry),
        });

        if registry.subscription.is_none() {
            let weak = Arc::downgrade(self);
            registry.subscription = Some(self.ticker.subscribe(move |_delta| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_tick();
                }
            }));
            debug!("task monitor subscribed to ticker");
        }

        let id = WatchId { slot, serial };
        trace!(watch = %id, "watch added");
        id
    }

    /// Called with the lock held.
    fn release_if_empty(&self, registry: &mut Registry<W>) {
        if !registry.watches.is_empty() {
            return;
        }
        if let Some(subscription) = registry.subscription.take() {
            self.ticker.unsubscribe(subscription);
            debug!("task monitor unsubscribed from ticker");
        }
    }

    fn on_tick(&self) {
        let ids: Vec<WatchId> = self
            .lock()
            .watches
            .entries()
            .map(|(slot, watch)| WatchId {
                slot,
                serial: watch.serial,
            })
            .collect();
        for id in ids {
            self.poll(id);
        }
    }

    fn poll(&self, id: WatchId) {
        let Some(mut entry) = self.lock().checkout(id) else {
            return;
        };
        if let Some(update) = entry.on_update.as_mut() {
            update(&entry.handle);
        }
        let complete = entry.handle.is_complete();

        let mut registry = self.lock();
        if !registry.holds(id) {
            drop(registry);
            trace!(watch = %id, "watch removed by its own callback");
            return;
        }
        if complete {
            let _ = registry.watches.remove(id.slot);
            self.release_if_empty(&mut registry);
            drop(registry);
            trace!(watch = %id, "watched task completed");
            (entry.on_complete)(entry.handle);
        } else if let Some(watch) = registry.watches.get_mut(id.slot) {
            watch.entry = Some(entry);
        }
    }
}

impl<W> Drop for Inner<W> {
    fn drop(&mut self) {
        let registry = self
            .registry
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(subscription) = registry.subscription.take() {
            self.ticker.unsubscribe(subscription);
        }
    }
}

/// Watches task handles and reports on them once per host tick.
///
/// Clones share one set of watches. Dropping the last clone unsubscribes
/// from the ticker and drops any remaining handles without calling back.
///
/// # Examples
///
/// ```
/// use std::sync::mpsc;
/// use std::thread::JoinHandle;
/// use std::time::Duration;
/// use slotqueue::{TaskMonitor, Ticker};
///
/// let ticker = Ticker::new();
/// let monitor: TaskMonitor<JoinHandle<_>> = TaskMonitor::new(ticker.clone());
///
/// let (tx, rx) = mpsc::channel();
/// monitor
///     .spawn("answer", || 6 * 7, move |result| {
///         let _ = tx.send(result.ok());
///     })
///     .unwrap();
///
/// // The host loop.
/// let answer = loop {
///     ticker.tick(Duration::from_millis(16));
///     if let Ok(answer) = rx.try_recv() {
///         break answer;
///     }
///     std::thread::sleep(Duration::from_millis(1));
/// };
/// assert_eq!(answer, Some(42));
/// assert!(monitor.is_empty());
/// ```
pub struct TaskMonitor<W: Completion> {
    inner: Arc<Inner<W>>,
}

impl<W: Completion> TaskMonitor<W> {
    pub fn new(ticker: Ticker) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    watches: SlotList::with_capacity(4),
                    next_serial: 0,
                    subscription: None,
                }),
                ticker,
            }),
        }
    }

    /// Watches `handle` and calls `on_complete` with it on the first tick
    /// that finds it complete.
    pub fn add<C>(&self, handle: W, on_complete: C) -> WatchId
    where
        C: FnOnce(W) + Send + 'static,
    {
        self.inner.insert(Entry {
            handle,
            on_update: None,
            on_complete: Box::new(on_complete),
        })
    }

    /// Like [`add`](Self::add), but also calls `on_update` on every tick
    /// while the watch is live, including the tick that completes it.
    pub fn add_with_update<U, C>(&self, handle: W, on_update: U, on_complete: C) -> WatchId
    where
        U: FnMut(&W) + Send + 'static,
        C: FnOnce(W) + Send + 'static,
    {
        self.inner.insert(Entry {
            handle,
            on_update: Some(Box::new(on_update)),
            on_complete: Box::new(on_complete),
        })
    }

    /// Stops watching. No further callbacks run for this watch.
    ///
    /// Returns the handle, or `None` if the watch is unknown or is the one
    /// whose callback is currently running. In that case the handle is
    /// dropped once the callback returns.
    pub fn remove(&self, id: WatchId) -> Option<W> {
        let watch = {
            let mut registry = self.inner.lock();
            if !registry.holds(id) {
                return None;
            }
            let watch = registry.watches.remove(id.slot).ok()?;
            self.inner.release_if_empty(&mut registry);
            watch
        };
        trace!(watch = %id, "watch removed");
        watch.entry.map(|entry| entry.handle)
    }

    pub fn contains(&self, id: WatchId) -> bool {
        self.inner.lock().holds(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Send + 'static> TaskMonitor<thread::JoinHandle<R>> {
    /// Runs `work` on a new named thread and watches it. `on_complete`
    /// receives the joined result on the ticking thread.
    ///
    /// # Errors
    ///
    /// [`MonitorError::Spawn`] if the thread could not be created.
    pub fn spawn<F, C>(
        &self,
        name: impl Into<String>,
        work: F,
        on_complete: C,
    ) -> Result<WatchId, MonitorError>
    where
        F: FnOnce() -> R + Send + 'static,
        C: FnOnce(thread::Result<R>) + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.into()).spawn(work)?;
        Ok(self.add(handle, move |handle: thread::JoinHandle<R>| {
            on_complete(handle.join())
        }))
    }
}

impl<W: Completion> Clone for TaskMonitor<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Completion> fmt::Debug for TaskMonitor<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskMonitor")
            .field("watches", &self.len())
            .finish_non_exhaustive()
    }
}
