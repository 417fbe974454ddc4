//! Deterministic fault injection for exercising every failure path.

use parking_lot::RwLock;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::CallError;

/// A snapshot of the fault-injection configuration.
///
/// Every flag is deterministic, not probabilistic, so tests reproduce
/// exactly. Latency is additive and does not fail the call by itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChaosDirective {
    /// Master switch; when false every other field is ignored.
    pub enabled: bool,

    /// Milliseconds to suspend the caller before any synthetic fault.
    pub latency_ms: u64,

    /// Raise a synthetic timeout.
    pub timeout: bool,

    /// Raise a synthetic connection failure.
    pub connection_error: bool,

    /// Raise a synthetic HTTP 500.
    pub http_500: bool,
}

/// Runtime-mutable fault injector, invoked after the breaker admits a
/// call and before the real dependency call executes, so injected faults
/// are observed by retry and breaker exactly as real ones would be.
///
/// Each call reads the directive as a single atomic snapshot; an admin
/// toggle flipping fields mid-flight can never produce a mixed view
/// within one call. Cloning shares the same directive.
pub struct FaultInjector {
    directive: Arc<RwLock<ChaosDirective>>,
}

impl Clone for FaultInjector {
    fn clone(&self) -> Self {
        Self {
            directive: Arc::clone(&self.directive),
        }
    }
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultInjector {
    /// Creates an injector with chaos disabled.
    pub fn new() -> Self {
        Self {
            directive: Arc::new(RwLock::new(ChaosDirective::default())),
        }
    }

    /// Replaces the directive wholesale.
    pub fn configure(&self, directive: ChaosDirective) {
        *self.directive.write() = directive;
    }

    /// Current directive snapshot.
    pub fn snapshot(&self) -> ChaosDirective {
        *self.directive.read()
    }

    /// Flips only the master switch.
    pub fn set_enabled(&self, enabled: bool) {
        self.directive.write().enabled = enabled;
    }

    /// Applies the directive: optional latency, then at most one
    /// synthetic fault, in a fixed order.
    pub fn inject(&self) -> Result<(), CallError> {
        let directive = self.snapshot();

        if !directive.enabled {
            return Ok(());
        }

        if directive.latency_ms > 0 {
            warn!(latency_ms = directive.latency_ms, "injecting latency");
            thread::sleep(Duration::from_millis(directive.latency_ms));
        }

        if directive.timeout {
            warn!("injecting timeout");
            return Err(CallError::Timeout);
        }

        if directive.connection_error {
            warn!("injecting connection failure");
            return Err(CallError::Connection);
        }

        if directive.http_500 {
            warn!("injecting HTTP 500");
            return Err(CallError::UpstreamStatus(500));
        }

        Ok(())
    }
}
