//! Circuit breaker guarding the dependency call.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{CallError, PipelineError};
use crate::metrics::MetricSink;
use crate::state::{CircuitState, StateCell};
use crate::window::FailureWindow;

/// Tuning knobs for the breaker.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failure rate over the window at or above which the breaker trips.
    pub failure_rate_threshold: f64,

    /// Minimum recorded outcomes before the rate is considered at all.
    pub min_samples: usize,

    /// How long the breaker stays open before admitting probes.
    pub open_duration: Duration,

    /// How many probe calls are admitted while half-open.
    pub half_open_probe_count: u32,

    /// Capacity of the sliding outcome window.
    pub window_size: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            min_samples: 4,
            open_duration: Duration::from_secs(10),
            half_open_probe_count: 3,
            window_size: 16,
        }
    }
}

/// How a call was admitted; a probe's outcome drives the half-open
/// transitions, a normal call's outcome only feeds the window.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

struct BreakerInner {
    state: StateCell,
    window: FailureWindow,
    config: BreakerConfig,
    probes_left: AtomicU32,
    sink: Arc<dyn MetricSink>,
}

/// Process-wide circuit breaker, one instance per protected dependency.
///
/// Cloning is cheap and shares the same state, so one breaker can be
/// handed to every worker. In the open state calls are rejected without
/// invoking the wrapped unit; after the cool-down a bounded number of
/// probes decide whether to close again.
pub struct CircuitBreaker {
    inner: Arc<BreakerInner>,
}

impl Clone for CircuitBreaker {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl CircuitBreaker {
    /// Creates a breaker with the given configuration and metric sink.
    pub fn new(config: BreakerConfig, sink: Arc<dyn MetricSink>) -> Self {
        let inner = BreakerInner {
            state: StateCell::new(),
            window: FailureWindow::new(config.window_size),
            config,
            probes_left: AtomicU32::new(0),
            sink,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Current state of the breaker.
    pub fn current_state(&self) -> CircuitState {
        self.inner.state.current()
    }

    /// Failure rate over the current window.
    pub fn failure_rate(&self) -> f64 {
        self.inner.window.failure_rate()
    }

    /// Executes `unit` under the breaker's protection.
    ///
    /// When the breaker is open the unit is never invoked and
    /// [`PipelineError::CircuitOpen`] is returned. Otherwise the unit
    /// runs, its dependency outcome is recorded into the failure window,
    /// and the transition rules are applied. Domain errors (no fault
    /// kind) pass through without touching the window.
    pub fn guard<T, F>(&self, unit: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> Result<T, CallError>,
    {
        let admission = self.admit()?;

        let result = unit();
        self.settle(admission, &result);

        result.map_err(PipelineError::Call)
    }

    /// Decides whether a call may proceed, handling the open -> half-open
    /// transition when the cool-down has elapsed.
    fn admit(&self) -> Result<Admission, PipelineError> {
        match self.inner.state.current() {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                if self.inner.state.time_in_state() >= self.inner.config.open_duration
                    && self.inner.state.begin_probing()
                {
                    // This caller won the transition and becomes the
                    // first probe; the rest of the budget is opened up
                    // for concurrent callers.
                    self.inner.probes_left.store(
                        self.inner.config.half_open_probe_count.saturating_sub(1),
                        Ordering::Release,
                    );

                    info!(state = "half-open", "circuit breaker admitting probes");
                    self.inner
                        .sink
                        .record_state_transition("open", "half-open");
                    self.inner.sink.record_probe_attempt(true);

                    return Ok(Admission::Probe);
                }

                error!("circuit breaker is open, rejecting call");
                Err(PipelineError::CircuitOpen)
            }
            CircuitState::HalfOpen => {
                if self.take_probe_token() {
                    self.inner.sink.record_probe_attempt(true);
                    Ok(Admission::Probe)
                } else {
                    self.inner.sink.record_probe_attempt(false);
                    Err(PipelineError::CircuitOpen)
                }
            }
        }
    }

    /// CAS-decrements the probe budget; false once it is spent.
    fn take_probe_token(&self) -> bool {
        let mut probes = self.inner.probes_left.load(Ordering::Acquire);
        loop {
            if probes == 0 {
                return false;
            }
            match self.inner.probes_left.compare_exchange(
                probes,
                probes - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => probes = actual,
            }
        }
    }

    /// Records the outcome of an admitted call and applies the
    /// transition rules.
    fn settle<T>(&self, admission: Admission, result: &Result<T, CallError>) {
        let success = match result {
            Ok(_) => true,
            Err(error) if error.is_dependency_fault() => false,
            // Caller error, not dependency instability: invisible to the
            // window. A probe spent on it is handed back so dependency
            // outcomes keep deciding recovery; otherwise domain errors
            // could drain the budget and wedge the breaker half-open.
            Err(_) => {
                if admission == Admission::Probe {
                    self.inner.probes_left.fetch_add(1, Ordering::AcqRel);
                }
                return;
            }
        };

        self.inner.window.record(success);

        if admission == Admission::Probe {
            if success {
                if self.inner.state.close() {
                    self.inner.window.reset();
                    info!(state = "closed", "circuit breaker recovered");
                    self.inner
                        .sink
                        .record_state_transition("half-open", "closed");
                }
            } else if self.inner.state.reopen() {
                warn!(state = "open", "probe failed, circuit breaker reopening");
                self.inner
                    .sink
                    .record_state_transition("half-open", "open");
            }
            return;
        }

        if !success && self.should_trip() && self.inner.state.transition(CircuitState::Closed, CircuitState::Open)
        {
            error!(
                failure_rate = self.inner.window.failure_rate(),
                "failure rate over threshold, circuit breaker opening"
            );
            self.inner.sink.record_state_transition("closed", "open");
        }
    }

    fn should_trip(&self) -> bool {
        self.inner.window.len() >= self.inner.config.min_samples
            && self.inner.window.failure_rate() >= self.inner.config.failure_rate_threshold
    }

    /// Forces the breaker open, e.g. from an operator control.
    pub fn force_open(&self) -> bool {
        let from = self.inner.state.current();
        if from == CircuitState::Open {
            return false;
        }

        if self.inner.state.transition(from, CircuitState::Open) {
            self.inner
                .sink
                .record_state_transition(from.as_label(), "open");
            return true;
        }
        false
    }

    /// Forces the breaker closed and clears the window.
    pub fn force_closed(&self) -> bool {
        let from = self.inner.state.current();
        let closed = match from {
            CircuitState::Open => self
                .inner
                .state
                .transition(CircuitState::Open, CircuitState::Closed),
            CircuitState::HalfOpen => self.inner.state.close(),
            CircuitState::Closed => false,
        };

        if closed {
            self.inner.window.reset();
            self.inner
                .sink
                .record_state_transition(from.as_label(), "closed");
        }

        closed
    }
}
