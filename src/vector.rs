//! Pool-aware 2D vector value.
//!
//! [`PoolVec2`] wraps a `glam::Vec2` and satisfies the [`Poolable`]
//! contract: derived operations (`add`, `scale`, `duplicate`) draw their
//! result from the owning pool when one is attached, so a warm hot loop
//! does no allocation at all. Without a pool they allocate fresh values.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec2;

use crate::pool::{Pool, PoolError, Poolable, Pooled, Provenance};

/// Process-wide count of direct `PoolVec2` constructions. Diagnostic only;
/// the per-pool counter is [`Pool::total_allocations`].
static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);

/// Direct constructions since startup (or the last explicit reset).
pub fn allocations() -> u64 {
    ALLOCATIONS.load(Ordering::Relaxed)
}

/// Explicit diagnostic reset. Nothing else ever clears the counter.
pub fn reset_allocations() {
    ALLOCATIONS.store(0, Ordering::Relaxed);
}

/// A pool wired with the standard `PoolVec2` builder and recycler.
pub fn vec2_pool(capacity: usize) -> Pool<PoolVec2> {
    Pool::new(
        |(x, y)| PoolVec2::new(x, y),
        |v, (x, y)| {
            v.set(x, y);
        },
        capacity,
    )
}

/// A 2D vector that may be managed by a [`Pool`].
#[derive(Debug)]
pub struct PoolVec2 {
    v: Vec2,
    provenance: Provenance<Self>,
}

impl PoolVec2 {
    pub fn new(x: f32, y: f32) -> Self {
        ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        Self {
            v: Vec2::new(x, y),
            provenance: Provenance::unpooled(),
        }
    }

    pub fn x(&self) -> f32 {
        self.v.x
    }

    pub fn y(&self) -> f32 {
        self.v.y
    }

    /// Copy of the raw math value, for writing results back into
    /// caller-owned state before a scope exits.
    pub fn as_vec2(&self) -> Vec2 {
        self.v
    }

    /// Overwrite both components in place. No allocation.
    pub fn set(&mut self, x: f32, y: f32) -> &mut Self {
        self.v.x = x;
        self.v.y = y;
        self
    }

    /// Overwrite this vector with another's components. No allocation;
    /// provenance stays with this instance.
    pub fn copy_from(&mut self, other: &PoolVec2) -> &mut Self {
        self.v = other.v;
        self
    }

    /// Sum of `self` and `other`.
    pub fn add(&self, other: &PoolVec2) -> Result<Pooled<Self>, PoolError> {
        self.derive_or_allocate((self.v.x + other.v.x, self.v.y + other.v.y))
    }

    /// `self` scaled by `factor`.
    pub fn scale(&self, factor: f32) -> Result<Pooled<Self>, PoolError> {
        self.derive_or_allocate((self.v.x * factor, self.v.y * factor))
    }

    /// Copy of `self`.
    pub fn duplicate(&self) -> Result<Pooled<Self>, PoolError> {
        self.derive_or_allocate((self.v.x, self.v.y))
    }
}

impl Poolable for PoolVec2 {
    type Args = (f32, f32);

    fn allocate((x, y): (f32, f32)) -> Self {
        Self::new(x, y)
    }

    fn provenance(&self) -> &Provenance<Self> {
        &self.provenance
    }

    fn provenance_mut(&mut self) -> &mut Provenance<Self> {
        &mut self.provenance
    }
}
