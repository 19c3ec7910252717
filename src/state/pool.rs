//! Sized frame accounting per state variant.
//!
//! State objects are allocated through `Arc`. Each variant that the runtime
//! creates in bulk (generators, futures) additionally takes a [`PoolLease`]
//! for its exact aligned layout at construction and returns the same layout
//! when it drops. The pool therefore always balances: every lease is
//! released with the size it was taken with, and `live_bytes` returns to
//! zero once every state of that variant is gone.

use core::alloc::Layout;
use core::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Accounting pool for generator states.
pub static GENERATOR_POOL: FramePool = FramePool::new("generator");
/// Accounting pool for future states.
pub static FUTURE_POOL: FramePool = FramePool::new("future");

/// Returns the aligned footprint of `T`.
#[must_use]
pub fn aligned_size<T>() -> usize {
    Layout::new::<T>().pad_to_align().size()
}

/// Per-variant allocation accounting.
#[derive(Debug)]
pub struct FramePool {
    name: &'static str,
    live: AtomicUsize,
    live_bytes: AtomicUsize,
    allocated: AtomicU64,
    released: AtomicU64,
}

/// Snapshot of a pool's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Leases currently outstanding.
    pub live: usize,
    /// Bytes currently leased.
    pub live_bytes: usize,
    /// Total leases ever taken.
    pub allocated: u64,
    /// Total leases ever returned.
    pub released: u64,
}

impl FramePool {
    /// Creates an empty pool.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            live: AtomicUsize::new(0),
            live_bytes: AtomicUsize::new(0),
            allocated: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    /// Returns the pool name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Takes a lease sized for `T`.
    #[must_use]
    pub fn lease<T>(&'static self) -> PoolLease {
        let layout = Layout::new::<T>().pad_to_align();
        self.live.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_add(layout.size(), Ordering::Relaxed);
        self.allocated.fetch_add(1, Ordering::Relaxed);
        PoolLease { pool: self, layout }
    }

    fn release(&self, layout: Layout) {
        self.live.fetch_sub(1, Ordering::Relaxed);
        self.live_bytes.fetch_sub(layout.size(), Ordering::Relaxed);
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            live: self.live.load(Ordering::Relaxed),
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
            allocated: self.allocated.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
        }
    }
}

/// An outstanding lease; returns its layout to the pool on drop.
pub struct PoolLease {
    pool: &'static FramePool,
    layout: Layout,
}

impl PoolLease {
    /// Returns the leased layout.
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.pool.release(self.layout);
    }
}

impl fmt::Debug for PoolLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolLease")
            .field("pool", &self.pool.name)
            .field("size", &self.layout.size())
            .field("align", &self.layout.align())
            .finish()
    }
}
