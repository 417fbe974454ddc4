//! Rate gate bounding admissions per time window.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Rate gate settings.
#[derive(Debug, Clone)]
pub struct RateConfig {
    /// Admissions allowed per window.
    pub limit_per_window: u32,

    /// Window length; the counter resets when it elapses.
    pub window: Duration,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            limit_per_window: 25,
            window: Duration::from_secs(1),
        }
    }
}

struct WindowState {
    opened_at: Instant,
    admitted: u32,
}

struct RateInner {
    config: RateConfig,
    state: Mutex<WindowState>,
}

/// Fixed-window admission gate, the outermost pipeline stage.
///
/// Non-blocking: a saturated window rejects immediately, it never queues.
/// Within one window exactly `limit_per_window` calls are admitted; the
/// next call is rejected until the window rolls over. Cloning shares the
/// same window.
pub struct RateGate {
    inner: Arc<RateInner>,
}

impl Clone for RateGate {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl RateGate {
    /// Creates a gate with the given settings.
    pub fn new(config: RateConfig) -> Self {
        Self {
            inner: Arc::new(RateInner {
                state: Mutex::new(WindowState {
                    opened_at: Instant::now(),
                    admitted: 0,
                }),
                config,
            }),
        }
    }

    /// Admits the call if the current window has room.
    pub fn admit(&self) -> bool {
        let mut state = self.inner.state.lock();

        if state.opened_at.elapsed() >= self.inner.config.window {
            state.opened_at = Instant::now();
            state.admitted = 0;
        }

        if state.admitted < self.inner.config.limit_per_window {
            state.admitted += 1;
            true
        } else {
            false
        }
    }

    /// Admissions counted against the current window.
    pub fn admitted_in_window(&self) -> u32 {
        self.inner.state.lock().admitted
    }
}
