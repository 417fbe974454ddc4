//! Circuit breaker state machine.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// The three states of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls execute normally and every dependency outcome is recorded.
    Closed = 0,

    /// Calls are rejected without invoking the protected unit.
    Open = 1,

    /// A limited number of probe calls are allowed through to test
    /// recovery.
    HalfOpen = 2,
}

impl CircuitState {
    /// Metrics/log label for this state.
    pub fn as_label(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Current state plus the monotonic instant it was entered, in one
/// lock-free cell.
///
/// The entry time is kept as microseconds since a per-cell epoch so
/// both fields are plain atomics. Transitions are compare-and-set, so
/// concurrent callers racing the same transition resolve to exactly one
/// winner.
pub(crate) struct StateCell {
    state: AtomicU8,
    entered_at_us: AtomicU64,
    epoch: Instant,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            entered_at_us: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    pub(crate) fn current(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// How long the breaker has been in its current state. Drives the
    /// open-state cool-down.
    pub(crate) fn time_in_state(&self) -> Duration {
        let entered = self.entered_at_us.load(Ordering::Acquire);
        Duration::from_micros(self.now_us().saturating_sub(entered))
    }

    /// CAS transition; returns true only for the caller that won it.
    pub(crate) fn transition(&self, from: CircuitState, to: CircuitState) -> bool {
        let swapped = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if swapped {
            self.entered_at_us.store(self.now_us(), Ordering::Release);
        }

        swapped
    }

    /// Open -> half-open, once the cool-down has elapsed.
    pub(crate) fn begin_probing(&self) -> bool {
        self.transition(CircuitState::Open, CircuitState::HalfOpen)
    }

    /// Half-open -> closed, after a successful probe.
    pub(crate) fn close(&self) -> bool {
        self.transition(CircuitState::HalfOpen, CircuitState::Closed)
    }

    /// Half-open -> open, after a failed probe. Restarts the cool-down.
    pub(crate) fn reopen(&self) -> bool {
        self.transition(CircuitState::HalfOpen, CircuitState::Open)
    }
}
