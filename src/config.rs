//! Pipeline construction.

use std::sync::Arc;
use std::time::Duration;

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::bulkhead::Bulkhead;
use crate::chaos::FaultInjector;
use crate::client::{AddressClient, DependencyClient, OrderStore};
use crate::error::FaultKind;
use crate::metrics::{MetricSink, NullMetricSink};
use crate::pipeline::Pipeline;
use crate::rate::{RateConfig, RateGate};
use crate::retry::{RetryExecutor, RetryPolicy};

/// Builder assembling a [`Pipeline`] from per-stage settings and the
/// collaborators behind its narrow interfaces.
///
/// The order store and address client have no defaults and must be
/// provided; everything else falls back to sensible settings.
pub struct PipelineBuilder {
    rate: RateConfig,
    bulkhead_capacity: u32,
    retry: RetryPolicy,
    breaker: BreakerConfig,
    injector: FaultInjector,
    store: Option<Arc<dyn OrderStore>>,
    addresses: Option<Arc<dyn AddressClient>>,
    sink: Arc<dyn MetricSink>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            rate: RateConfig::default(),
            bulkhead_capacity: 4,
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
            injector: FaultInjector::new(),
            store: None,
            addresses: None,
            sink: Arc::new(NullMetricSink),
        }
    }

    /// Sets admissions allowed per rate window.
    pub fn rate_limit(mut self, limit_per_window: u32) -> Self {
        self.rate.limit_per_window = limit_per_window;
        self
    }

    /// Sets the rate window length.
    pub fn rate_window(mut self, window: Duration) -> Self {
        self.rate.window = window;
        self
    }

    /// Sets the number of concurrent in-flight slots.
    pub fn bulkhead_capacity(mut self, capacity: u32) -> Self {
        self.bulkhead_capacity = capacity;
        self
    }

    /// Sets total attempts, initial call included.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    /// Sets the inter-attempt backoff schedule.
    pub fn backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.retry.backoff = backoff;
        self
    }

    /// Sets which fault classes get retried.
    pub fn retry_on(mut self, retry_on: Vec<FaultKind>) -> Self {
        self.retry.retry_on = retry_on;
        self
    }

    /// Sets the failure rate at or above which the breaker trips.
    pub fn failure_rate_threshold(mut self, threshold: f64) -> Self {
        self.breaker.failure_rate_threshold = threshold;
        self
    }

    /// Sets the minimum samples before the failure rate is considered.
    pub fn min_samples(mut self, min_samples: usize) -> Self {
        self.breaker.min_samples = min_samples;
        self
    }

    /// Sets how long the breaker stays open before probing.
    pub fn open_duration(mut self, open_duration: Duration) -> Self {
        self.breaker.open_duration = open_duration;
        self
    }

    /// Sets how many probes are admitted while half-open.
    pub fn half_open_probe_count(mut self, probe_count: u32) -> Self {
        self.breaker.half_open_probe_count = probe_count;
        self
    }

    /// Sets the breaker's sliding window capacity.
    pub fn window_size(mut self, window_size: usize) -> Self {
        self.breaker.window_size = window_size;
        self
    }

    /// Shares a fault injector with the pipeline, keeping a handle for
    /// runtime toggling.
    pub fn fault_injector(mut self, injector: FaultInjector) -> Self {
        self.injector = injector;
        self
    }

    /// Sets the order store.
    pub fn order_store(mut self, store: Arc<dyn OrderStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the address service client.
    pub fn address_client(mut self, addresses: Arc<dyn AddressClient>) -> Self {
        self.addresses = Some(addresses);
        self
    }

    /// Sets the metric sink.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Assembles the pipeline.
    ///
    /// # Panics
    ///
    /// Panics if the order store or address client was not provided.
    pub fn build(self) -> Pipeline {
        let store = self
            .store
            .expect("an order store must be provided before building the pipeline");
        let addresses = self
            .addresses
            .expect("an address client must be provided before building the pipeline");

        let client =
            DependencyClient::new(store, addresses, self.injector, Arc::clone(&self.sink));

        Pipeline::new(
            RateGate::new(self.rate),
            Bulkhead::new(self.bulkhead_capacity),
            RetryExecutor::new(self.retry),
            CircuitBreaker::new(self.breaker, Arc::clone(&self.sink)),
            client,
            self.sink,
        )
    }
}
