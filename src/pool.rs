//! Bounded object pool with in-place recycling.
//!
//! A [`Pool`] hands out reusable instances instead of allocating fresh ones
//! in a hot loop. The capacity is a hard bound: once every instance is
//! leased, [`Pool::get`] fails instead of growing, which turns a leak
//! (instances leased and never returned) into an immediate, visible error.
//!
//! Single-threaded by design. The pool lives inside one simulation tick of
//! a cooperative loop; for multi-threaded use, give each worker its own
//! pool or guard a pool behind external synchronization.

use std::cell::RefCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::{Rc, Weak};

use thiserror::Error;

/// Failures surfaced by pool operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Capacity reached with nothing free. Usually a leak: instances were
    /// leased and never returned. Never bypassed by growing the pool.
    #[error("pool exhausted: all {capacity} instances are leased")]
    Exhausted { capacity: usize },
    /// The released value was not leased from this pool.
    #[error("released value was not leased from this pool")]
    InvalidRelease,
}

/// Contract a pooled value type must satisfy.
///
/// A poolable value carries its [`Provenance`]: a stable instance id plus a
/// weak link back to the owning pool, so derived values can be drawn from
/// the same pool instead of allocated.
pub trait Poolable: Sized {
    /// Construction arguments accepted by the builder and recycler.
    type Args;

    /// Build a fresh instance outside any pool.
    fn allocate(args: Self::Args) -> Self;

    fn provenance(&self) -> &Provenance<Self>;
    fn provenance_mut(&mut self) -> &mut Provenance<Self>;

    /// Derive a new instance: from the owning pool when the back-reference
    /// is live, otherwise freshly allocated. The only possible failure is
    /// the pool's own exhaustion.
    fn derive_or_allocate(&self, args: Self::Args) -> Result<Pooled<Self>, PoolError> {
        match self.provenance().pool() {
            Some(pool) => pool.get(args),
            None => Ok(Pooled::unmanaged(Self::allocate(args))),
        }
    }
}

/// Where a value came from. Unpooled values have neither id nor pool link.
pub struct Provenance<T: Poolable> {
    id: Option<u64>,
    pool: Option<PoolRef<T>>,
}

impl<T: Poolable> Provenance<T> {
    pub fn unpooled() -> Self {
        Self { id: None, pool: None }
    }

    /// Stable identity stamped by the owning pool when the instance was
    /// built. Survives recycling, so it doubles as reuse-order evidence.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Upgrade the weak back-reference. `None` for unpooled values and
    /// after the owning pool has been dropped.
    pub fn pool(&self) -> Option<Pool<T>> {
        self.pool.as_ref().and_then(PoolRef::upgrade)
    }

    fn bind(&mut self, id: u64, pool: PoolRef<T>) {
        self.id = Some(id);
        self.pool = Some(pool);
    }

    fn is_from(&self, shared: &Rc<RefCell<Shared<T>>>) -> bool {
        match &self.pool {
            Some(pool_ref) => match pool_ref.0.upgrade() {
                Some(rc) => Rc::ptr_eq(&rc, shared),
                None => false,
            },
            None => false,
        }
    }
}

impl<T: Poolable> Default for Provenance<T> {
    fn default() -> Self {
        Self::unpooled()
    }
}

impl<T: Poolable> fmt::Debug for Provenance<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provenance")
            .field("id", &self.id)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

/// Weak handle to a pool, stored inside pooled values. Never keeps the
/// pool alive.
pub struct PoolRef<T: Poolable>(Weak<RefCell<Shared<T>>>);

impl<T: Poolable> PoolRef<T> {
    pub fn upgrade(&self) -> Option<Pool<T>> {
        self.0.upgrade().map(|shared| Pool { shared })
    }
}

impl<T: Poolable> Clone for PoolRef<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

struct Shared<T: Poolable> {
    /// LIFO stack of (id, instance) available for recycling.
    /// Most-recently-returned is reused first.
    free: Vec<(u64, T)>,
    /// Ids of instances currently checked out.
    leased: Vec<u64>,
    capacity: usize,
    /// Builder invocations ever made. Monotonic; recycling never counts.
    total_allocations: u64,
    builder: Box<dyn FnMut(T::Args) -> T>,
    recycler: Box<dyn FnMut(&mut T, T::Args)>,
}

/// Bounded pool of reusable `T` instances.
///
/// Cloning yields another handle to the same pool. Instances are built
/// lazily, only when a `get` finds the free list empty, so the first ticks
/// of a loop warm the pool up and later ticks recycle at zero allocations.
pub struct Pool<T: Poolable> {
    shared: Rc<RefCell<Shared<T>>>,
}

impl<T: Poolable> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: Poolable> Pool<T> {
    /// The builder runs only when the free list is empty and headroom
    /// remains; the recycler overwrites a free instance in place. Neither
    /// may call back into the pool.
    pub fn new<B, R>(builder: B, recycler: R, capacity: usize) -> Self
    where
        B: FnMut(T::Args) -> T + 'static,
        R: FnMut(&mut T, T::Args) + 'static,
    {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                free: Vec::with_capacity(capacity),
                leased: Vec::with_capacity(capacity),
                capacity,
                total_allocations: 0,
                builder: Box::new(builder),
                recycler: Box::new(recycler),
            })),
        }
    }

    /// Lease an instance: recycle the most recently returned one, or build
    /// a new one while below capacity. At capacity with nothing free, fails
    /// with [`PoolError::Exhausted`] and leaves the pool untouched.
    pub fn get(&self, args: T::Args) -> Result<Pooled<T>, PoolError> {
        let mut shared = self.shared.borrow_mut();
        let shared = &mut *shared;
        if let Some((id, mut value)) = shared.free.pop() {
            (shared.recycler)(&mut value, args);
            shared.leased.push(id);
            Ok(Pooled::managed(value, self.clone()))
        } else if shared.leased.len() < shared.capacity {
            let mut value = (shared.builder)(args);
            shared.total_allocations += 1;
            let id = shared.total_allocations;
            value
                .provenance_mut()
                .bind(id, PoolRef(Rc::downgrade(&self.shared)));
            shared.leased.push(id);
            Ok(Pooled::managed(value, self.clone()))
        } else {
            Err(PoolError::Exhausted {
                capacity: shared.capacity,
            })
        }
    }

    /// Return a value previously leased from this pool. This is the
    /// explicit path for values detached via [`Pooled::into_inner`];
    /// ordinary leases return themselves on drop.
    ///
    /// Releasing a value this pool never leased (or one leased from a
    /// different pool) is a caller bug, reported as
    /// [`PoolError::InvalidRelease`].
    pub fn release(&self, value: T) -> Result<(), PoolError> {
        let mut shared = self.shared.borrow_mut();
        let id = match value.provenance().id() {
            Some(id) if value.provenance().is_from(&self.shared) => id,
            _ => return Err(PoolError::InvalidRelease),
        };
        let pos = shared
            .leased
            .iter()
            .position(|&leased| leased == id)
            .ok_or(PoolError::InvalidRelease)?;
        shared.leased.swap_remove(pos);
        shared.free.push((id, value));
        Ok(())
    }

    /// Scoped acquisition: every lease taken inside the scope has been
    /// released by the time the scope exits, on every exit path (normal
    /// return, `?` propagation, unwind), because leases are drop guards.
    /// Leases moved out of the scope stay checked out; they are reported
    /// here and ultimately caught by the capacity bound.
    pub fn using<R>(&self, scope: impl FnOnce(&Pool<T>) -> R) -> R {
        let before = self.leased_count();
        let out = scope(self);
        let after = self.leased_count();
        if after > before {
            log::warn!(
                "{} lease(s) escaped a pool scope ({before} -> {after} outstanding)",
                after - before
            );
        }
        out
    }

    /// Builder invocations ever made by this pool.
    pub fn total_allocations(&self) -> u64 {
        self.shared.borrow().total_allocations
    }

    /// Instances available for recycling.
    pub fn free_count(&self) -> usize {
        self.shared.borrow().free.len()
    }

    /// Instances currently checked out.
    pub fn leased_count(&self) -> usize {
        self.shared.borrow().leased.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.borrow().capacity
    }
}

/// RAII lease. Derefs to the value; returns it to the pool on drop.
pub struct Pooled<T: Poolable> {
    value: Option<T>,
    pool: Option<Pool<T>>,
}

impl<T: Poolable> Pooled<T> {
    fn managed(value: T, pool: Pool<T>) -> Self {
        Self {
            value: Some(value),
            pool: Some(pool),
        }
    }

    /// Wrap a value that has no owning pool; dropping it just drops the
    /// value.
    pub fn unmanaged(value: T) -> Self {
        Self {
            value: Some(value),
            pool: None,
        }
    }

    /// Detach the value from guard management. A detached value stays
    /// leased until handed back through [`Pool::release`]; forgetting to
    /// do so shows up as pool exhaustion.
    pub fn into_inner(mut self) -> T {
        self.pool = None;
        self.value.take().expect("lease value present until drop")
    }
}

impl<T: Poolable + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled").field("value", &self.value).finish()
    }
}

impl<T: Poolable> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("lease value present until drop")
    }
}

impl<T: Poolable> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("lease value present until drop")
    }
}

impl<T: Poolable> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let (Some(value), Some(pool)) = (self.value.take(), self.pool.take()) {
            if let Err(err) = pool.release(value) {
                log::warn!("lease could not be returned: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal poolable payload for exercising the pool.
    #[derive(Debug)]
    struct Probe {
        a: f32,
        b: f32,
        provenance: Provenance<Self>,
    }

    impl Probe {
        fn new(a: f32, b: f32) -> Self {
            Self {
                a,
                b,
                provenance: Provenance::unpooled(),
            }
        }
    }

    impl Poolable for Probe {
        type Args = (f32, f32);

        fn allocate((a, b): (f32, f32)) -> Self {
            Self::new(a, b)
        }

        fn provenance(&self) -> &Provenance<Self> {
            &self.provenance
        }

        fn provenance_mut(&mut self) -> &mut Provenance<Self> {
            &mut self.provenance
        }
    }

    fn probe_pool(capacity: usize) -> Pool<Probe> {
        Pool::new(
            |(a, b)| Probe::new(a, b),
            |probe, (a, b)| {
                probe.a = a;
                probe.b = b;
            },
            capacity,
        )
    }

    #[test]
    fn capacity_invariant_holds_across_calls() {
        let pool = probe_pool(4);
        let mut held = Vec::new();
        for i in 0..4 {
            held.push(pool.get((i as f32, 0.0)).unwrap());
            assert!(pool.leased_count() + pool.free_count() <= 4);
        }
        held.pop();
        assert!(pool.leased_count() + pool.free_count() <= 4);
        assert_eq!(pool.free_count(), 1);
        held.clear();
        assert_eq!(pool.free_count(), 4);
        assert_eq!(pool.leased_count(), 0);
    }

    #[test]
    fn exhaustion_fails_without_mutation() {
        let pool = probe_pool(2);
        let _a = pool.get((1.0, 1.0)).unwrap();
        let _b = pool.get((2.0, 2.0)).unwrap();
        let err = pool.get((3.0, 3.0)).unwrap_err();
        assert_eq!(err, PoolError::Exhausted { capacity: 2 });
        assert_eq!(pool.leased_count(), 2);
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.total_allocations(), 2);
    }

    #[test]
    fn allocations_count_builds_not_recycles() {
        let pool = probe_pool(2);
        {
            let _a = pool.get((1.0, 1.0)).unwrap();
        }
        assert_eq!(pool.total_allocations(), 1);
        {
            let recycled = pool.get((5.0, 6.0)).unwrap();
            assert_eq!((recycled.a, recycled.b), (5.0, 6.0));
        }
        assert_eq!(pool.total_allocations(), 1);
    }

    #[test]
    fn most_recently_returned_is_reused_first() {
        let pool = probe_pool(2);
        let a = pool.get((1.0, 0.0)).unwrap();
        let b = pool.get((2.0, 0.0)).unwrap();
        let a_id = a.provenance().id();
        let b_id = b.provenance().id();
        assert!(a_id.is_some() && b_id.is_some());
        drop(a);
        drop(b); // returned last, reused first
        let c = pool.get((3.0, 0.0)).unwrap();
        assert_eq!(c.provenance().id(), b_id);
        let d = pool.get((4.0, 0.0)).unwrap();
        assert_eq!(d.provenance().id(), a_id);
    }

    #[test]
    fn capacity_two_walkthrough() {
        let pool = probe_pool(2);
        let a = pool.get((1.0, 1.0)).unwrap();
        assert_eq!(pool.total_allocations(), 1);
        let b = pool.get((2.0, 2.0)).unwrap();
        assert_eq!(pool.total_allocations(), 2);
        assert!(matches!(
            pool.get((3.0, 3.0)),
            Err(PoolError::Exhausted { .. })
        ));
        let a_id = a.provenance().id();
        drop(a);
        let c = pool.get((3.0, 3.0)).unwrap();
        assert_eq!((c.a, c.b), (3.0, 3.0));
        assert_eq!(c.provenance().id(), a_id);
        assert_eq!(pool.total_allocations(), 2);
        drop(b);
    }

    #[test]
    fn scope_leases_land_in_free_on_normal_exit() {
        let pool = probe_pool(8);
        assert_eq!(pool.free_count(), 0);
        pool.using(|p| {
            let _held: Vec<_> = (0..5).map(|i| p.get((i as f32, 0.0)).unwrap()).collect();
        });
        assert_eq!(pool.free_count(), 5);
        assert_eq!(pool.leased_count(), 0);
    }

    #[test]
    fn scope_cleans_up_on_error_propagation() {
        let pool = probe_pool(4);
        let result: Result<(), &str> = pool.using(|p| {
            let _a = p.get((1.0, 1.0)).map_err(|_| "get failed")?;
            let _b = p.get((2.0, 2.0)).map_err(|_| "get failed")?;
            Err("scope body failed")
        });
        assert!(result.is_err());
        assert_eq!(pool.leased_count(), 0);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn lease_moved_out_of_scope_stays_leased() {
        let pool = probe_pool(2);
        let escaped = pool.using(|p| p.get((1.0, 1.0)).unwrap());
        assert_eq!(pool.leased_count(), 1);
        drop(escaped);
        assert_eq!(pool.leased_count(), 0);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn detached_lease_stays_checked_out_until_released() {
        let pool = probe_pool(2);
        let value = pool.get((1.0, 1.0)).unwrap().into_inner();
        assert_eq!(pool.leased_count(), 1);
        assert_eq!(pool.free_count(), 0);
        pool.release(value).unwrap();
        assert_eq!(pool.leased_count(), 0);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn releasing_foreign_value_is_rejected() {
        let pool = probe_pool(2);
        let other = probe_pool(2);
        let from_other = other.get((1.0, 1.0)).unwrap().into_inner();
        assert_eq!(pool.release(from_other), Err(PoolError::InvalidRelease));
        // Never leased from anywhere.
        assert_eq!(
            pool.release(Probe::new(0.0, 0.0)),
            Err(PoolError::InvalidRelease)
        );
        assert_eq!(pool.free_count(), 0);
    }
}
