//! Explicit composition of the fault-tolerance stages.

use std::sync::Arc;

use tracing::warn;

use crate::breaker::CircuitBreaker;
use crate::bulkhead::Bulkhead;
use crate::client::DependencyClient;
use crate::error::PipelineError;
use crate::metrics::MetricSink;
use crate::model::{CallContext, Order};
use crate::outcome::{self, Outcome};
use crate::rate::RateGate;
use crate::retry::RetryExecutor;

/// The full pipeline, stages applied in a fixed, documented order:
///
/// ```text
/// RateGate -> Bulkhead -> RetryExecutor -> CircuitBreaker
///          -> FaultInjector -> DependencyClient
/// ```
///
/// Each shared-state stage (rate gate, bulkhead, breaker) is one
/// explicitly constructed instance shared across all callers; nothing
/// here relies on declaration-order conventions. Within one call, no
/// stage is skipped except by an earlier stage's rejection.
pub struct Pipeline {
    rate: RateGate,
    bulkhead: Bulkhead,
    retry: RetryExecutor,
    breaker: CircuitBreaker,
    client: DependencyClient,
    sink: Arc<dyn MetricSink>,
}

impl Pipeline {
    /// Starts a builder with default settings.
    pub fn builder() -> crate::config::PipelineBuilder {
        crate::config::PipelineBuilder::new()
    }

    pub(crate) fn new(
        rate: RateGate,
        bulkhead: Bulkhead,
        retry: RetryExecutor,
        breaker: CircuitBreaker,
        client: DependencyClient,
        sink: Arc<dyn MetricSink>,
    ) -> Self {
        Self {
            rate,
            bulkhead,
            retry,
            breaker,
            client,
            sink,
        }
    }

    /// The shared circuit breaker, for observation and manual control.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// The shared bulkhead, for observation.
    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }

    /// Handles one external request end to end.
    ///
    /// The span timer lives in the [`CallContext`] and is recorded
    /// exactly once, on every path, when the outcome is resolved.
    pub fn handle(&self, order_number: &str) -> Outcome {
        let ctx = CallContext::new(order_number);

        let result = self.dispatch(&ctx);
        let outcome = outcome::resolve(result);

        self.sink.record_call(outcome.reason_label(), ctx.elapsed());
        match &outcome {
            Outcome::Success(_) => self.sink.incr("orders.successful", None),
            Outcome::Failure(failure) => {
                self.sink.incr("orders.failed", Some(failure.reason.as_str()))
            }
        }

        outcome
    }

    fn dispatch(&self, ctx: &CallContext) -> Result<Order, PipelineError> {
        if !self.rate.admit() {
            warn!(order_number = %ctx.order_number, "rate gate rejected call");
            return Err(PipelineError::RateLimited);
        }

        let Some(_permit) = self.bulkhead.try_acquire() else {
            warn!(order_number = %ctx.order_number, "bulkhead full");
            return Err(PipelineError::BulkheadFull);
        };

        // Admitted past rate gate and bulkhead: the request now counts
        // as processed. Rejected calls are visible through the failure
        // counters and the per-traversal record instead.
        self.sink.incr("orders.processed", None);

        // The permit is held across the whole retry sequence and
        // released on drop, whichever way we leave this scope.
        self.retry
            .execute(|| self.breaker.guard(|| self.client.enrich(ctx)))
    }
}
