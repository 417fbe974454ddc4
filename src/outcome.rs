//! Terminal outcome classification.
//!
//! The resolver maps the terminal state of a traversal onto exactly one
//! reason code so the caller can pick a response code. Precedence is
//! encoded in the match below: a breaker rejection is never reported as
//! retry exhaustion, an admission rejection is never reported as an
//! upstream error.

use crate::error::{CallError, PipelineError};
use crate::model::Order;
use std::fmt::{self, Display, Formatter};

/// Why a traversal failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    /// No order exists for the correlation key.
    OrderNotFound,

    /// The circuit breaker rejected the call.
    CircuitOpen,

    /// Every concurrency slot was occupied.
    BulkheadFull,

    /// The rate gate's window was saturated.
    RateLimit,

    /// The dependency kept failing until retries ran out.
    RetryExhausted,

    /// Any other dependency failure.
    UpstreamError,
}

impl ReasonCode {
    /// Wire label for this reason, as recorded in metrics and returned to
    /// callers.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::OrderNotFound => "ORDER_NOT_FOUND",
            ReasonCode::CircuitOpen => "CIRCUIT_OPEN",
            ReasonCode::BulkheadFull => "BULKHEAD_FULL",
            ReasonCode::RateLimit => "RATE_LIMIT",
            ReasonCode::RetryExhausted => "RETRY_EXHAUSTED",
            ReasonCode::UpstreamError => "UPSTREAM_ERROR",
        }
    }

    /// The HTTP status a fronting controller should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            ReasonCode::CircuitOpen => 503,
            ReasonCode::BulkheadFull | ReasonCode::RateLimit => 429,
            ReasonCode::RetryExhausted => 502,
            ReasonCode::OrderNotFound => 404,
            ReasonCode::UpstreamError => 500,
        }
    }
}

impl Display for ReasonCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure: human-readable message, reason code, and whether
/// the caller may reasonably resubmit the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Human-readable description of the failure.
    pub message: String,

    /// The single reason code assigned to this traversal.
    pub reason: ReasonCode,

    /// Whether resubmitting the request may succeed.
    pub retryable: bool,
}

/// The terminal result of one pipeline traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The order, enriched where the address service answered.
    Success(Order),

    /// A classified failure.
    Failure(Failure),
}

impl Outcome {
    /// Whether the traversal produced an order.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Metrics label for this outcome.
    pub fn reason_label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "SUCCESS",
            Outcome::Failure(failure) => failure.reason.as_str(),
        }
    }
}

/// Resolves the terminal state of a traversal into an [`Outcome`].
///
/// Admission rejections carry the retryable flags of the stage that
/// raised them: a breaker rejection or a full bulkhead clears on its own
/// and is worth resubmitting, a rate rejection is the caller's own
/// volume and is not.
pub fn resolve(result: Result<Order, PipelineError>) -> Outcome {
    let failure = match result {
        Ok(order) => return Outcome::Success(order),
        Err(PipelineError::CircuitOpen) => Failure {
            message: "Address service is unavailable - circuit breaker is open".to_string(),
            reason: ReasonCode::CircuitOpen,
            retryable: true,
        },
        Err(PipelineError::BulkheadFull) => Failure {
            message: "Service overloaded".to_string(),
            reason: ReasonCode::BulkheadFull,
            retryable: true,
        },
        Err(PipelineError::RateLimited) => Failure {
            message: "Too many requests. Please try again later.".to_string(),
            reason: ReasonCode::RateLimit,
            retryable: false,
        },
        Err(PipelineError::RetriesExhausted(source)) => Failure {
            message: format!("Address service failed after retry attempts: {}", source),
            reason: ReasonCode::RetryExhausted,
            retryable: false,
        },
        Err(PipelineError::Call(CallError::OrderNotFound(order_number))) => Failure {
            message: format!("Order not found: {}", order_number),
            reason: ReasonCode::OrderNotFound,
            retryable: false,
        },
        Err(PipelineError::Call(source)) => Failure {
            message: format!("Address service call failed: {}", source),
            reason: ReasonCode::UpstreamError,
            retryable: false,
        },
    };

    Outcome::Failure(failure)
}
