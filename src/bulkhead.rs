//! Bulkhead bounding concurrent in-flight calls.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

struct Slots {
    occupied: AtomicU32,
    capacity: u32,
}

/// A counting semaphore with non-blocking acquisition.
///
/// Unlike a worker-pool queue, a saturated bulkhead fails fast: callers
/// are rejected immediately rather than queued. One permit is held for
/// the entire retry sequence of a single external request, not
/// re-acquired per attempt. Cloning shares the same slots.
pub struct Bulkhead {
    slots: Arc<Slots>,
}

impl Clone for Bulkhead {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl Bulkhead {
    /// Creates a bulkhead with `capacity` concurrent slots.
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: Arc::new(Slots {
                occupied: AtomicU32::new(0),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Claims a slot, or `None` immediately if all are occupied.
    ///
    /// The returned permit releases the slot exactly once when dropped,
    /// covering every exit path. A release without a prior acquire is
    /// unrepresentable: permits only exist through this method.
    pub fn try_acquire(&self) -> Option<BulkheadPermit> {
        let mut occupied = self.slots.occupied.load(Ordering::Acquire);
        loop {
            if occupied >= self.slots.capacity {
                return None;
            }
            match self.slots.occupied.compare_exchange(
                occupied,
                occupied + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(BulkheadPermit {
                        slots: Arc::clone(&self.slots),
                    })
                }
                Err(actual) => occupied = actual,
            }
        }
    }

    /// Number of currently occupied slots.
    pub fn in_flight(&self) -> u32 {
        self.slots.occupied.load(Ordering::Acquire)
    }

    /// Configured capacity.
    pub fn capacity(&self) -> u32 {
        self.slots.capacity
    }
}

/// RAII handle for one occupied bulkhead slot.
pub struct BulkheadPermit {
    slots: Arc<Slots>,
}

impl Drop for BulkheadPermit {
    fn drop(&mut self) {
        self.slots.occupied.fetch_sub(1, Ordering::AcqRel);
    }
}
