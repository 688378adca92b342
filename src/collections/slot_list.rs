//! Doubly-linked list stored in a growable slot array.
//!
//! Every node lives at a fixed position in a backing `Vec`, addressed by an
//! opaque [`SlotId`]. Removed slots are pushed onto a free stack and reused
//! before the array grows, so steady-state insertion and removal never touch
//! the allocator.
//!
//! Ids stay valid for as long as the node they name stays linked, which makes
//! them safe to keep as cursors across calls (the background queue keeps its
//! in-flight position this way).

use std::fmt;
use std::iter::FusedIterator;
use std::ops::{Index, IndexMut};

use thiserror::Error;

/// Smallest backing capacity a list is ever created with.
const MIN_CAPACITY: usize = 4;

/// Backing capacity used by [`SlotList::new`].
const DEFAULT_CAPACITY: usize = 16;

/// Opaque handle to a node of a [`SlotList`].
///
/// Handles are only meaningful for the list that returned them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Misuse of a [`SlotList`]: a stale handle or an operation on an empty list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SlotListError {
    #[error("slot {0} is not linked")]
    InvalidId(SlotId),

    #[error("list is empty")]
    Empty,
}

#[derive(Debug, Clone)]
enum Slot<T> {
    Free,
    Linked {
        previous: Option<SlotId>,
        next: Option<SlotId>,
        value: T,
    },
}

/// A doubly-linked list with O(1) insertion and removal by [`SlotId`].
///
/// # Examples
///
/// ```
/// use slotqueue::collections::SlotList;
///
/// let mut list = SlotList::new();
/// let b = list.add_last("b");
/// list.add_first("a");
/// list.add_after(b, "c").unwrap();
///
/// assert_eq!(list.iter().copied().collect::<Vec<_>>(), ["a", "b", "c"]);
///
/// assert_eq!(list.remove(b), Ok("b"));
/// assert!(list.remove(b).is_err());
/// assert_eq!(list.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct SlotList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<SlotId>,
    first: Option<SlotId>,
    last: Option<SlotId>,
}

impl<T> SlotList<T> {
    /// Creates an empty list with the default backing capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty list with room for `capacity` nodes (at least 4).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.max(MIN_CAPACITY)),
            free: Vec::new(),
            first: None,
            last: None,
        }
    }

    /// Id of the first node, or `None` when empty.
    pub fn first(&self) -> Option<SlotId> {
        self.first
    }

    /// Id of the last node, or `None` when empty.
    pub fn last(&self) -> Option<SlotId> {
        self.last
    }

    /// Number of linked nodes.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    /// Number of slots the backing array can hold before it grows.
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Returns `true` if `id` names a currently linked node.
    pub fn contains(&self, id: SlotId) -> bool {
        matches!(self.slots.get(id.0), Some(Slot::Linked { .. }))
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        match self.slots.get(id.0) {
            Some(Slot::Linked { value, .. }) => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        match self.slots.get_mut(id.0) {
            Some(Slot::Linked { value, .. }) => Some(value),
            _ => None,
        }
    }

    /// Id of the node after `id`, or `None` at the end of the list.
    pub fn next(&self, id: SlotId) -> Option<SlotId> {
        self.links(id).and_then(|(_, next)| next)
    }

    /// Id of the node before `id`, or `None` at the start of the list.
    pub fn previous(&self, id: SlotId) -> Option<SlotId> {
        self.links(id).and_then(|(previous, _)| previous)
    }

    /// Links `value` at the front. O(1).
    pub fn add_first(&mut self, value: T) -> SlotId {
        let id = self.alloc(None, self.first, value);
        match self.first {
            Some(first) => self.set_previous(first, Some(id)),
            None => self.last = Some(id),
        }
        self.first = Some(id);
        id
    }

    /// Links `value` at the back. O(1).
    pub fn add_last(&mut self, value: T) -> SlotId {
        let id = self.alloc(self.last, None, value);
        match self.last {
            Some(last) => self.set_next(last, Some(id)),
            None => self.first = Some(id),
        }
        self.last = Some(id);
        id
    }

    /// Links `value` right after the node `id`. O(1).
    ///
    /// # Errors
    ///
    /// [`SlotListError::InvalidId`] if `id` is not linked.
    pub fn add_after(&mut self, id: SlotId, value: T) -> Result<SlotId, SlotListError> {
        let (_, next) = self.links(id).ok_or(SlotListError::InvalidId(id))?;
        let new_id = self.alloc(Some(id), next, value);
        match next {
            Some(next) => self.set_previous(next, Some(new_id)),
            None => self.last = Some(new_id),
        }
        self.set_next(id, Some(new_id));
        Ok(new_id)
    }

    /// Links `value` right before the node `id`. O(1).
    ///
    /// # Errors
    ///
    /// [`SlotListError::InvalidId`] if `id` is not linked.
    pub fn add_before(&mut self, id: SlotId, value: T) -> Result<SlotId, SlotListError> {
        let (previous, _) = self.links(id).ok_or(SlotListError::InvalidId(id))?;
        let new_id = self.alloc(previous, Some(id), value);
        match previous {
            Some(previous) => self.set_next(previous, Some(new_id)),
            None => self.first = Some(new_id),
        }
        self.set_previous(id, Some(new_id));
        Ok(new_id)
    }

    /// Unlinks the node `id` and returns its value. O(1).
    ///
    /// # Errors
    ///
    /// [`SlotListError::InvalidId`] if `id` is not linked, e.g. it was
    /// already removed.
    pub fn remove(&mut self, id: SlotId) -> Result<T, SlotListError> {
        self.unlink(id).ok_or(SlotListError::InvalidId(id))
    }

    /// Unlinks the first node and returns its value.
    ///
    /// # Errors
    ///
    /// [`SlotListError::Empty`] if the list has no nodes.
    pub fn remove_first(&mut self) -> Result<T, SlotListError> {
        let id = self.first.ok_or(SlotListError::Empty)?;
        self.remove(id)
    }

    /// Unlinks the last node and returns its value.
    ///
    /// # Errors
    ///
    /// [`SlotListError::Empty`] if the list has no nodes.
    pub fn remove_last(&mut self) -> Result<T, SlotListError> {
        let id = self.last.ok_or(SlotListError::Empty)?;
        self.remove(id)
    }

    /// Drops every node. Capacity is kept.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.first = None;
        self.last = None;
    }

    /// Iterates over values from first to last.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            entries: self.entries(),
        }
    }

    /// Iterates over `(id, value)` pairs from first to last.
    pub fn entries(&self) -> Entries<'_, T> {
        Entries {
            list: self,
            cursor: self.first,
            remaining: self.len(),
        }
    }

    fn links(&self, id: SlotId) -> Option<(Option<SlotId>, Option<SlotId>)> {
        match self.slots.get(id.0) {
            Some(Slot::Linked { previous, next, .. }) => Some((*previous, *next)),
            _ => None,
        }
    }

    fn set_next(&mut self, id: SlotId, to: Option<SlotId>) {
        if let Some(Slot::Linked { next, .. }) = self.slots.get_mut(id.0) {
            *next = to;
        }
    }

    fn set_previous(&mut self, id: SlotId, to: Option<SlotId>) {
        if let Some(Slot::Linked { previous, .. }) = self.slots.get_mut(id.0) {
            *previous = to;
        }
    }

    fn alloc(&mut self, previous: Option<SlotId>, next: Option<SlotId>, value: T) -> SlotId {
        let slot = Slot::Linked {
            previous,
            next,
            value,
        };

        if let Some(id) = self.free.pop() {
            self.slots[id.0] = slot;
            return id;
        }

        // Double explicitly so growth does not depend on Vec's strategy.
        if self.slots.len() == self.slots.capacity() {
            let additional = self.slots.capacity().max(MIN_CAPACITY);
            self.slots.reserve_exact(additional);
        }
        self.slots.push(slot);
        SlotId(self.slots.len() - 1)
    }

    fn unlink(&mut self, id: SlotId) -> Option<T> {
        let (previous, next) = self.links(id)?;
        let Slot::Linked { value, .. } = std::mem::replace(&mut self.slots[id.0], Slot::Free)
        else {
            return None;
        };

        if self.first == Some(id) {
            self.first = next;
        }
        if self.last == Some(id) {
            self.last = previous;
        }
        if let Some(previous) = previous {
            self.set_next(previous, next);
        }
        if let Some(next) = next {
            self.set_previous(next, previous);
        }

        self.free.push(id);
        Some(value)
    }
}

impl<T> Default for SlotList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<SlotId> for SlotList<T> {
    type Output = T;

    /// # Panics
    ///
    /// Panics if `id` is not linked.
    fn index(&self, id: SlotId) -> &T {
        match self.get(id) {
            Some(value) => value,
            None => panic!("invalid slot id {id}"),
        }
    }
}

impl<T> IndexMut<SlotId> for SlotList<T> {
    fn index_mut(&mut self, id: SlotId) -> &mut T {
        match self.get_mut(id) {
            Some(value) => value,
            None => panic!("invalid slot id {id}"),
        }
    }
}

impl<T> Extend<T> for SlotList<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.add_last(value);
        }
    }
}

impl<T> FromIterator<T> for SlotList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = Self::new();
        list.extend(iter);
        list
    }
}

impl<'a, T> IntoIterator for &'a SlotList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

/// Iterator over `(id, value)` pairs, created by [`SlotList::entries`].
#[derive(Debug, Clone)]
pub struct Entries<'a, T> {
    list: &'a SlotList<T>,
    cursor: Option<SlotId>,
    remaining: usize,
}

impl<'a, T> Iterator for Entries<'a, T> {
    type Item = (SlotId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        match self.list.slots.get(id.0) {
            Some(Slot::Linked { next, value, .. }) => {
                self.cursor = *next;
                self.remaining = self.remaining.saturating_sub(1);
                Some((id, value))
            }
            _ => {
                self.cursor = None;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Entries<'_, T> {}

impl<T> FusedIterator for Entries<'_, T> {}

/// Iterator over values, created by [`SlotList::iter`].
#[derive(Debug, Clone)]
pub struct Iter<'a, T> {
    entries: Entries<'a, T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        self.entries.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}
