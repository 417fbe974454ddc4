//! # orderguard
//!
//! A layered fault-tolerance pipeline protecting a caller from the
//! instability of a downstream dependency it must call synchronously:
//! an order lookup enriched with address data fetched from a remote
//! service.
//!
//! Every outbound call traverses the stages in a fixed order, outermost
//! first:
//!
//! ```text
//! RateGate -> Bulkhead -> RetryExecutor -> CircuitBreaker
//!          -> FaultInjector -> DependencyClient
//! ```
//!
//! - **RateGate** bounds admissions per time window, rejecting the
//!   overflow immediately.
//! - **Bulkhead** bounds concurrent in-flight calls with a non-blocking
//!   counting semaphore; one slot spans a whole retry sequence.
//! - **RetryExecutor** re-invokes the guarded unit on transient faults
//!   with a backoff schedule, and never retries a breaker rejection.
//! - **CircuitBreaker** tracks recent dependency outcomes in a sliding
//!   window and fails fast while the dependency is unhealthy.
//! - **FaultInjector** deterministically forces latency, timeouts,
//!   connection failures, or server errors for chaos testing.
//! - **DependencyClient** performs the repository read and the outbound
//!   address call behind narrow traits.
//!
//! The terminal state of each traversal resolves to an [`Outcome`]:
//! either the enriched order, or a [`Failure`] carrying exactly one
//! [`ReasonCode`] and a retryable flag.
//!
//! ## Usage
//!
//! ```rust
//! use orderguard::{Address, AddressClient, CallError, InMemoryOrderStore, Order, Outcome, Pipeline};
//! use std::sync::Arc;
//!
//! struct StaticAddresses;
//!
//! impl AddressClient for StaticAddresses {
//!     fn fetch(&self, postal_code: &str) -> Result<Option<Address>, CallError> {
//!         Ok(Some(Address {
//!             id: 1,
//!             postal_code: postal_code.to_string(),
//!             state: "TX".to_string(),
//!             city: "Austin".to_string(),
//!         }))
//!     }
//! }
//!
//! let store = Arc::new(InMemoryOrderStore::new());
//! store.insert(Order::new(1, "ORDER-1", "12345"));
//!
//! let pipeline = Pipeline::builder()
//!     .order_store(store)
//!     .address_client(Arc::new(StaticAddresses))
//!     .build();
//!
//! match pipeline.handle("ORDER-1") {
//!     Outcome::Success(order) => {
//!         assert_eq!(order.shipping_state.as_deref(), Some("TX"));
//!         assert_eq!(order.shipping_city.as_deref(), Some("Austin"));
//!     }
//!     Outcome::Failure(failure) => panic!("unexpected failure: {}", failure.message),
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod breaker;
mod bulkhead;
mod chaos;
mod client;
mod config;
mod error;
mod metrics;
mod model;
mod outcome;
mod pipeline;
mod rate;
mod retry;
mod state;
mod window;

// Re-exports
pub use breaker::{BreakerConfig, CircuitBreaker};
pub use bulkhead::{Bulkhead, BulkheadPermit};
pub use chaos::{ChaosDirective, FaultInjector};
pub use client::{AddressClient, DependencyClient, InMemoryOrderStore, OrderStore};
pub use config::PipelineBuilder;
pub use error::{CallError, FaultKind, PipelineError};
pub use metrics::{InMemoryMetrics, MetricSink, NullMetricSink};
pub use model::{Address, CallContext, Order};
pub use outcome::{resolve, Failure, Outcome, ReasonCode};
pub use pipeline::Pipeline;
pub use rate::{RateConfig, RateGate};
pub use retry::{RetryExecutor, RetryPolicy};
pub use state::CircuitState;
pub use window::FailureWindow;
