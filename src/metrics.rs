//! Metrics emission boundary.
//!
//! The pipeline only needs a narrow sink: count things, time the whole
//! span, note breaker transitions. Sinks are side-effect only and must
//! never influence control flow.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::time::Duration;

/// Receiver for pipeline events. Implement this to bridge into a real
/// metrics backend.
pub trait MetricSink: Send + Sync + 'static {
    /// Records one completed traversal: its terminal label (`SUCCESS` or
    /// a reason code) and its total duration. Called exactly once per
    /// traversal.
    fn record_call(&self, outcome: &'static str, duration: Duration);

    /// Records a breaker state transition.
    fn record_state_transition(&self, from: &'static str, to: &'static str);

    /// Records a half-open probe attempt and whether it was permitted.
    fn record_probe_attempt(&self, permitted: bool);

    /// Increments a named counter, optionally tagged.
    fn incr(&self, counter: &'static str, tag: Option<&str>);
}

impl<M: MetricSink> MetricSink for std::sync::Arc<M> {
    fn record_call(&self, outcome: &'static str, duration: Duration) {
        (**self).record_call(outcome, duration);
    }

    fn record_state_transition(&self, from: &'static str, to: &'static str) {
        (**self).record_state_transition(from, to);
    }

    fn record_probe_attempt(&self, permitted: bool) {
        (**self).record_probe_attempt(permitted);
    }

    fn incr(&self, counter: &'static str, tag: Option<&str>) {
        (**self).incr(counter, tag);
    }
}

/// A sink that discards all events.
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_call(&self, _outcome: &'static str, _duration: Duration) {}
    fn record_state_transition(&self, _from: &'static str, _to: &'static str) {}
    fn record_probe_attempt(&self, _permitted: bool) {}
    fn incr(&self, _counter: &'static str, _tag: Option<&str>) {}
}

/// An inspectable sink for tests and demos.
pub struct InMemoryMetrics {
    counters: Mutex<AHashMap<String, u64>>,
    calls: Mutex<Vec<(&'static str, Duration)>>,
    transitions: Mutex<Vec<(&'static str, &'static str)>>,
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMetrics {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(AHashMap::new()),
            calls: Mutex::new(Vec::new()),
            transitions: Mutex::new(Vec::new()),
        }
    }

    /// Current value of `counter`, with `tag` appended as `counter:tag`
    /// when the increment carried one. Zero when never incremented.
    pub fn counter(&self, key: &str) -> u64 {
        self.counters.lock().get(key).copied().unwrap_or(0)
    }

    /// Every recorded traversal, in completion order.
    pub fn calls(&self) -> Vec<(&'static str, Duration)> {
        self.calls.lock().clone()
    }

    /// Number of recorded traversals.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Every recorded breaker transition, in order.
    pub fn transitions(&self) -> Vec<(&'static str, &'static str)> {
        self.transitions.lock().clone()
    }
}

impl MetricSink for InMemoryMetrics {
    fn record_call(&self, outcome: &'static str, duration: Duration) {
        self.calls.lock().push((outcome, duration));
    }

    fn record_state_transition(&self, from: &'static str, to: &'static str) {
        self.transitions.lock().push((from, to));
    }

    fn record_probe_attempt(&self, permitted: bool) {
        let counter = if permitted {
            "breaker.probe.permitted"
        } else {
            "breaker.probe.rejected"
        };
        *self.counters.lock().entry(counter.to_string()).or_insert(0) += 1;
    }

    fn incr(&self, counter: &'static str, tag: Option<&str>) {
        let key = match tag {
            Some(tag) => format!("{}:{}", counter, tag),
            None => counter.to_string(),
        };
        *self.counters.lock().entry(key).or_insert(0) += 1;
    }
}
