//! Object pooling with scoped leases.
//!
//! An [`ObjectPool`] keeps a stack of idle objects. [`spawn`](ObjectPool::spawn)
//! pops one (or builds a fresh one when the stack is empty) and
//! [`despawn`](ObjectPool::despawn) hands it back. For short-lived scratch
//! objects, [`lease`](ObjectPool::lease) returns a guard that gives the
//! object back on drop.
//!
//! Pools do not reset objects on return; callers clear what they reuse.

use std::fmt;
use std::ops::{Deref, DerefMut};

use tracing::trace;

/// Smallest idle-stack capacity a pool starts with.
const MIN_STACK_CAPACITY: usize = 16;

/// A stack of reusable objects built by a factory.
///
/// # Examples
///
/// ```
/// use slotqueue::pool::ObjectPool;
///
/// let mut pool: ObjectPool<Vec<u8>> = ObjectPool::new(2);
/// assert_eq!(pool.len(), 2);
///
/// {
///     let mut scratch = pool.lease();
///     scratch.extend_from_slice(b"hello");
///     assert_eq!(scratch.len(), 5);
/// }
///
/// // The leased buffer is back, contents and all.
/// assert_eq!(pool.len(), 2);
/// let mut buf = pool.spawn();
/// buf.clear();
/// pool.despawn(buf);
/// ```
pub struct ObjectPool<T, F = fn() -> T> {
    objects: Vec<T>,
    factory: F,
}

impl<T: Default> ObjectPool<T> {
    /// Creates a pool of `T::default()` objects, building `preallocate` up front.
    pub fn new(preallocate: usize) -> Self {
        Self::with_factory(preallocate, T::default as fn() -> T)
    }
}

impl<T, F> ObjectPool<T, F>
where
    F: FnMut() -> T,
{
    /// Creates a pool that builds objects with `factory`.
    pub fn with_factory(preallocate: usize, factory: F) -> Self {
        let mut pool = Self {
            objects: Vec::with_capacity(preallocate.max(MIN_STACK_CAPACITY)),
            factory,
        };
        pool.add_objects(preallocate);
        pool
    }

    /// Builds `quantity` new objects and stores them as idle.
    pub fn add_objects(&mut self, quantity: usize) {
        self.objects.reserve(quantity);
        for _ in 0..quantity {
            let object = (self.factory)();
            self.objects.push(object);
        }
    }

    /// Takes an idle object, or builds one if none is idle.
    pub fn spawn(&mut self) -> T {
        match self.objects.pop() {
            Some(object) => object,
            None => {
                trace!("object pool empty, building a new object");
                (self.factory)()
            }
        }
    }

    /// Returns an object to the pool.
    pub fn despawn(&mut self, object: T) {
        self.objects.push(object);
    }

    /// Borrows an object until the returned guard is dropped.
    pub fn lease(&mut self) -> Lease<'_, T, F> {
        let object = self.spawn();
        Lease {
            object: Some(object),
            pool: self,
        }
    }

    /// Number of idle objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl<T, F> fmt::Debug for ObjectPool<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("idle", &self.objects.len())
            .finish_non_exhaustive()
    }
}

/// A pooled object that returns to its pool when dropped.
pub struct Lease<'a, T, F = fn() -> T>
where
    F: FnMut() -> T,
{
    // `None` only after `detach` or during drop.
    object: Option<T>,
    pool: &'a mut ObjectPool<T, F>,
}

impl<T, F> Lease<'_, T, F>
where
    F: FnMut() -> T,
{
    /// Keeps the object instead of returning it to the pool.
    pub fn detach(mut self) -> T {
        match self.object.take() {
            Some(object) => object,
            None => unreachable!("lease already released"),
        }
    }
}

impl<T, F> Deref for Lease<'_, T, F>
where
    F: FnMut() -> T,
{
    type Target = T;

    fn deref(&self) -> &T {
        match &self.object {
            Some(object) => object,
            None => unreachable!("lease already released"),
        }
    }
}

impl<T, F> DerefMut for Lease<'_, T, F>
where
    F: FnMut() -> T,
{
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.object {
            Some(object) => object,
            None => unreachable!("lease already released"),
        }
    }
}

impl<T, F> Drop for Lease<'_, T, F>
where
    F: FnMut() -> T,
{
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            self.pool.despawn(object);
        }
    }
}

impl<T: fmt::Debug, F> fmt::Debug for Lease<'_, T, F>
where
    F: FnMut() -> T,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lease").field(&self.object).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn preallocates_objects() {
        let pool: ObjectPool<String> = ObjectPool::new(3);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn spawn_reuses_despawned_objects() {
        let built = Rc::new(Cell::new(0));
        let counter = Rc::clone(&built);
        let mut pool = ObjectPool::with_factory(0, move || {
            counter.set(counter.get() + 1);
            Vec::<u32>::new()
        });

        let mut a = pool.spawn();
        a.push(7);
        pool.despawn(a);
        let again = pool.spawn();

        assert_eq!(again, vec![7]);
        assert_eq!(built.get(), 1);
    }

    #[test]
    fn empty_pool_builds_on_demand() {
        let mut pool: ObjectPool<u64> = ObjectPool::new(0);
        assert!(pool.is_empty());
        assert_eq!(pool.spawn(), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn add_objects_grows_idle_stack() {
        let mut pool: ObjectPool<u8> = ObjectPool::new(1);
        pool.add_objects(4);
        assert_eq!(pool.len(), 5);
    }

    #[test]
    fn lease_returns_object_on_drop() {
        let mut pool: ObjectPool<String> = ObjectPool::new(1);
        {
            let mut lease = pool.lease();
            lease.push_str("scratch");
            assert_eq!(&*lease, "scratch");
        }
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.spawn(), "scratch");
    }

    #[test]
    fn detached_lease_stays_out() {
        let mut pool: ObjectPool<String> = ObjectPool::new(1);
        let kept = pool.lease().detach();
        assert_eq!(kept, "");
        assert!(pool.is_empty());
    }
}
