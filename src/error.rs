//! Error types raised inside the pipeline.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// The transient fault classes a retry policy can elect to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The dependency did not answer in time.
    Timeout,

    /// The connection to the dependency could not be established.
    Connection,

    /// The dependency answered with a 5xx status.
    ServerError,
}

/// An error raised while executing the protected unit of work: the order
/// store read plus the outbound address call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The address call timed out.
    Timeout,

    /// The address call failed at the connection level.
    Connection,

    /// The address service answered with a non-success HTTP status.
    UpstreamStatus(u16),

    /// No order exists for the given order number. This is caller error,
    /// not dependency instability: it is never retried and never counted
    /// against the circuit breaker.
    OrderNotFound(String),
}

impl CallError {
    /// The transient fault class of this error, or `None` for domain
    /// errors and non-5xx upstream statuses.
    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            CallError::Timeout => Some(FaultKind::Timeout),
            CallError::Connection => Some(FaultKind::Connection),
            CallError::UpstreamStatus(status) if *status >= 500 => Some(FaultKind::ServerError),
            _ => None,
        }
    }

    /// Whether this error reflects dependency instability. Only such
    /// errors feed the circuit breaker's failure window.
    pub fn is_dependency_fault(&self) -> bool {
        self.fault_kind().is_some()
    }
}

impl Display for CallError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Timeout => write!(f, "address call timed out"),
            CallError::Connection => write!(f, "address connection failed"),
            CallError::UpstreamStatus(status) => {
                write!(f, "address service returned HTTP {}", status)
            }
            CallError::OrderNotFound(order_number) => {
                write!(f, "order not found: {}", order_number)
            }
        }
    }
}

impl Error for CallError {}

/// The terminal error of one pipeline traversal, before resolution into
/// an [`Outcome`](crate::Outcome).
///
/// The first three variants are admission rejections: the pipeline
/// protecting itself without invoking the dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The rate gate's window was saturated.
    RateLimited,

    /// Every concurrency slot was occupied.
    BulkheadFull,

    /// The circuit breaker rejected the call without invoking it.
    CircuitOpen,

    /// Every retry attempt failed; carries the last underlying fault.
    RetriesExhausted(CallError),

    /// The unit of work failed and was not (or could not be) retried.
    Call(CallError),
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::RateLimited => write!(f, "rate limit exceeded"),
            PipelineError::BulkheadFull => write!(f, "bulkhead is at capacity"),
            PipelineError::CircuitOpen => write!(f, "circuit breaker is open"),
            PipelineError::RetriesExhausted(source) => {
                write!(f, "retries exhausted: {}", source)
            }
            PipelineError::Call(source) => write!(f, "call failed: {}", source),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PipelineError::RetriesExhausted(source) | PipelineError::Call(source) => Some(source),
            _ => None,
        }
    }
}
