//! # In-flight Task Guard
//!
//! Lock-free accounting of how many fire-and-forget tasks a component currently
//! has running. The `EventBus` asks the guard for a permit before spawning a
//! subscriber task; when the guard is at capacity the delivery is dropped
//! instead of growing the task count without bound.
//!
//! ## Core Functionality:
//!
//! - **Atomic Accounting**: `current` is an `AtomicU64`, so many publishers can
//!   take and return permits without contending on a mutex.
//! - **RAII Permits**: an `InflightPermit` returns its slot when dropped, which
//!   happens when the spawned task finishes, panics or is cancelled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Capacity-bounded counter of running tasks.
#[derive(Debug)]
pub struct InflightGuard {
    /// Maximum number of concurrently held permits.
    capacity: u64,
    /// Permits currently held.
    current: Arc<AtomicU64>,
    /// Acquisitions refused because the guard was full.
    rejected: AtomicU64,
}

/// A held slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct InflightPermit {
    current: Arc<AtomicU64>,
}

impl Drop for InflightPermit {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::AcqRel);
    }
}

impl InflightGuard {
    /// Creates a guard allowing at most `capacity` concurrent permits.
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            current: Arc::new(AtomicU64::new(0)),
            rejected: AtomicU64::new(0),
        }
    }

    /// Takes a permit, or returns `None` when the guard is at capacity.
    pub fn try_acquire(&self) -> Option<InflightPermit> {
        let mut current = self.current.load(Ordering::Acquire);
        loop {
            if current >= self.capacity {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            match self.current.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(InflightPermit {
                        current: Arc::clone(&self.current),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Permits currently held.
    pub fn in_flight(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Maximum concurrent permits.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Total acquisitions refused so far.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}
