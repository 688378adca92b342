//! Host tick scheduler.
//!
//! A [`Ticker`] is the host's periodic "once per frame" hook. Components
//! subscribe a callback and receive the unscaled time elapsed since the
//! previous tick. The host decides when ticks happen: a game or editor loop
//! calls [`Ticker::tick`] directly, a Tokio application can hand the loop to
//! [`Ticker::drive`].
//!
//! Tickers are cheap to clone; clones share one subscriber registry.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::trace;

/// Callback invoked once per tick with the elapsed time.
pub type TickCallback = Arc<dyn Fn(Duration) + Send + Sync + 'static>;

/// Handle returned by [`Ticker::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, TickCallback)>,
}

impl Registry {
    fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.subscribers.iter().any(|(sid, _)| *sid == id)
    }
}

/// Shared registry of per-tick callbacks.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
/// use slotqueue::Ticker;
///
/// let ticker = Ticker::new();
/// let ticks = Arc::new(AtomicU32::new(0));
///
/// let counter = Arc::clone(&ticks);
/// let id = ticker.subscribe(move |_delta| {
///     counter.fetch_add(1, Ordering::Relaxed);
/// });
///
/// ticker.tick(Duration::from_millis(16));
/// assert!(ticker.unsubscribe(id));
/// ticker.tick(Duration::from_millis(16));
///
/// assert_eq!(ticks.load(Ordering::Relaxed), 1);
/// ```
#[derive(Clone, Default)]
pub struct Ticker {
    registry: Arc<Mutex<Registry>>,
}

impl Ticker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` to run on every subsequent tick.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.subscribers.push((id, Arc::new(callback)));
        trace!(subscription = id.0, "tick subscriber added");
        id
    }

    /// Removes a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.lock();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|(sid, _)| *sid != id);
        let removed = registry.subscribers.len() < before;
        if removed {
            trace!(subscription = id.0, "tick subscriber removed");
        }
        removed
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().subscribers.is_empty()
    }

    /// Runs every subscriber once, in subscription order.
    ///
    /// The registry is not locked while callbacks run, so a callback may
    /// subscribe or unsubscribe (itself included). Subscribers added during
    /// a tick first run on the next one; subscribers removed during a tick
    /// are skipped if they have not run yet.
    pub fn tick(&self, delta: Duration) {
        let snapshot: Vec<_> = self.lock().subscribers.clone();
        for (id, callback) in snapshot {
            if self.lock().is_subscribed(id) {
                callback(delta);
            }
        }
    }

    /// Ticks forever at `period`, passing the measured time between ticks.
    ///
    /// Late ticks are delayed rather than bunched up. Stop the loop by
    /// aborting the task running it.
    ///
    /// Each tick runs its callbacks synchronously on the runtime thread
    /// polling this future. For a [`BackgroundTaskQueue`] that means
    /// `after_complete` hooks, and the worker join of an idle stop, block
    /// that thread until they return. The same holds for [`TaskMonitor`]
    /// callbacks. Keep hooks short, or spawn the driver on a runtime with
    /// spare worker threads.
    ///
    /// [`BackgroundTaskQueue`]: crate::background::BackgroundTaskQueue
    /// [`TaskMonitor`]: crate::monitor::TaskMonitor
    ///
    /// ```rust,no_run
    /// use std::time::Duration;
    /// use slotqueue::Ticker;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let ticker = Ticker::new();
    ///     let host = tokio::spawn(ticker.clone().drive(Duration::from_millis(16)));
    ///     // ... enqueue work on queues built with `ticker` ...
    ///     host.abort();
    /// }
    /// ```
    pub async fn drive(self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last = Instant::now();
        loop {
            let now = interval.tick().await;
            let delta = now.saturating_duration_since(last);
            last = now;
            self.tick(delta);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticker")
            .field("subscribers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn subscribers_run_in_order() {
        let ticker = Ticker::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let log = Arc::clone(&log);
            ticker.subscribe(move |_| log.lock().unwrap().push(name));
        }
        ticker.tick(Duration::ZERO);

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(ticker.len(), 3);
    }

    #[test]
    fn delta_is_forwarded() {
        let ticker = Ticker::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        ticker.subscribe(move |delta| sink.lock().unwrap().push(delta));

        ticker.tick(Duration::from_millis(16));
        ticker.tick(Duration::from_millis(33));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Duration::from_millis(16), Duration::from_millis(33)]
        );
    }

    #[test]
    fn unsubscribe_unknown_id() {
        let ticker = Ticker::new();
        let id = ticker.subscribe(|_| {});
        assert!(ticker.unsubscribe(id));
        assert!(!ticker.unsubscribe(id));
        assert!(ticker.is_empty());
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let ticker = Ticker::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let id = {
            let ticker_handle = ticker.clone();
            let calls = Arc::clone(&calls);
            let slot = Arc::clone(&slot);
            ticker.subscribe(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *slot.lock().unwrap() {
                    ticker_handle.unsubscribe(id);
                }
            })
        };
        *slot.lock().unwrap() = Some(id);

        ticker.tick(Duration::ZERO);
        ticker.tick(Duration::ZERO);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(ticker.is_empty());
    }

    #[test]
    fn removed_subscriber_is_skipped_within_the_same_tick() {
        let ticker = Ticker::new();
        let second_ran = Arc::new(AtomicUsize::new(0));
        let victim: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        {
            let ticker_handle = ticker.clone();
            let victim = Arc::clone(&victim);
            ticker.subscribe(move |_| {
                if let Some(id) = victim.lock().unwrap().take() {
                    ticker_handle.unsubscribe(id);
                }
            });
        }
        let counter = Arc::clone(&second_ran);
        let id = ticker.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        *victim.lock().unwrap() = Some(id);

        ticker.tick(Duration::ZERO);
        assert_eq!(second_ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn drive_ticks_subscribers() {
        let ticker = Ticker::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        ticker.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let host = tokio::spawn(ticker.clone().drive(Duration::from_millis(5)));
        tokio::time::sleep(Duration::from_millis(60)).await;
        host.abort();

        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }
}
