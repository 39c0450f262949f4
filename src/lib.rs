//! Bounded object pooling for per-frame 2D math.
//!
//! A [`Pool`] recycles fixed-shape values (here, 2D vectors) instead of
//! allocating new ones each iteration of a hot loop. The capacity is a
//! hard bound that turns leaks into immediate errors, and leases are RAII
//! guards, so everything obtained inside a [`Pool::using`] scope is back
//! in the free list when the scope exits.

pub mod pool;
pub mod sim;
pub mod vector;

pub use pool::{Pool, PoolError, Poolable, Pooled};
pub use vector::PoolVec2;
