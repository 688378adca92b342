//! The view of the backlog handed to [`QueuedTask::before_enqueue`].

use std::sync::Arc;

use crate::collections::{SlotId, SlotList};

use super::{QueueError, QueuedTask};

/// The queue's backlog, as seen while a new task is being enqueued.
///
/// The backlog holds, in order: tasks the worker has finished but the host
/// has not harvested yet, the in-flight task, and pending tasks the worker
/// has not started. Only pending tasks may be cancelled.
///
/// # Examples
///
/// A task that supersedes queued work for the same key:
///
/// ```
/// use slotqueue::background::{Backlog, QueuedTask};
///
/// struct Rebuild {
///     asset: u32,
/// }
///
/// impl QueuedTask for Rebuild {
///     fn before_enqueue(&self, backlog: &mut Backlog<'_, Self>) -> bool {
///         let stale: Vec<_> = backlog
///             .pending()
///             .filter(|(_, queued)| queued.asset == self.asset)
///             .map(|(id, _)| id)
///             .collect();
///         for id in stale {
///             // Ids come from `pending()`, so cancelling cannot fail.
///             let _ = backlog.cancel(id);
///         }
///         true
///     }
///
///     fn process(&self) {
///         // rebuild `self.asset`
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Backlog<'a, T> {
    tasks: &'a mut SlotList<Arc<T>>,
    in_flight: Option<SlotId>,
}

impl<'a, T: QueuedTask> Backlog<'a, T> {
    pub(super) fn new(tasks: &'a mut SlotList<Arc<T>>, in_flight: Option<SlotId>) -> Self {
        Self { tasks, in_flight }
    }

    /// Id of the task the worker is running, or `None` when it has drained
    /// everything queued so far.
    pub fn in_flight(&self) -> Option<SlotId> {
        self.in_flight
    }

    /// Number of tasks in the backlog, harvested-pending ones included.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.tasks.get(id).map(Arc::as_ref)
    }

    /// Every task in the backlog, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> + '_ {
        self.tasks.entries().map(|(id, task)| (id, task.as_ref()))
    }

    /// Tasks queued after the in-flight one, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = (SlotId, &T)> + '_ {
        let tasks = &*self.tasks;
        let start = self.in_flight.and_then(|id| tasks.next(id));
        std::iter::successors(start, move |id| tasks.next(*id))
            .filter_map(move |id| tasks.get(id).map(|task| (id, task.as_ref())))
    }

    /// Returns `true` if `id` names a task the worker has not started.
    pub fn is_pending(&self, id: SlotId) -> bool {
        self.pending().any(|(pending, _)| pending == id)
    }

    /// Drops a pending task. It will get neither `process` nor
    /// `after_complete`.
    ///
    /// # Errors
    ///
    /// [`QueueError::NotPending`] if `id` is the in-flight task, a finished
    /// task, or not in the backlog at all.
    pub fn cancel(&mut self, id: SlotId) -> Result<(), QueueError> {
        if !self.is_pending(id) {
            return Err(QueueError::NotPending(id));
        }
        self.tasks
            .remove(id)
            .map(drop)
            .map_err(|_| QueueError::NotPending(id))
    }
}
