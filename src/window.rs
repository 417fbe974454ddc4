//! Bounded sliding record of recent call outcomes.

use parking_lot::Mutex;
use smallvec::SmallVec;

/// Holds the most recent `capacity` dependency-call outcomes and computes
/// the failure rate over them.
///
/// The window is count-based: the oldest outcome is evicted when a new
/// one arrives at capacity. Reset clears it entirely, which happens when
/// the breaker closes after a successful probe.
pub struct FailureWindow {
    outcomes: Mutex<SmallVec<[bool; 64]>>,
    capacity: usize,
}

impl FailureWindow {
    /// Creates a window holding at most `capacity` outcomes.
    pub fn new(capacity: usize) -> Self {
        Self {
            outcomes: Mutex::new(SmallVec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Records one outcome, evicting the oldest if the window is full.
    pub fn record(&self, success: bool) {
        let mut outcomes = self.outcomes.lock();
        if outcomes.len() == self.capacity {
            outcomes.remove(0);
        }
        outcomes.push(success);
    }

    /// Fraction of recorded outcomes that failed, 0.0 when empty.
    pub fn failure_rate(&self) -> f64 {
        let outcomes = self.outcomes.lock();
        if outcomes.is_empty() {
            return 0.0;
        }

        let failures = outcomes.iter().filter(|success| !**success).count();
        failures as f64 / outcomes.len() as f64
    }

    /// Number of outcomes currently recorded.
    pub fn len(&self) -> usize {
        self.outcomes.lock().len()
    }

    /// Whether no outcomes are recorded.
    pub fn is_empty(&self) -> bool {
        self.outcomes.lock().is_empty()
    }

    /// Clears the window.
    pub fn reset(&self) {
        self.outcomes.lock().clear();
    }
}
