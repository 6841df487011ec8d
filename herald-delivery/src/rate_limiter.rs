//! Admission control using a sliding window log
//!
//! Every dispatch must be admitted before it may touch a backend. The
//! limiter keeps the timestamps of admissions made within the trailing
//! window and admits a new request only while fewer than `max_requests`
//! remain.
//!
//! # Sliding Window Algorithm
//!
//! - On each call, timestamps older than `window` are discarded
//! - If fewer than `max_requests` timestamps remain, `now` is recorded and the
//!   request is admitted
//! - Otherwise the request is denied; nothing is recorded
//!
//! # Example
//!
//! ```text
//! Limit: 5 requests per 1000ms
//! t=0ms..4ms: 5 admissions
//! t=500ms:    denied (5 in window)
//! t=1000ms:   admitted (t=0 has left the window)
//! ```
//!
//! The limiter is a pure boolean gate. It never blocks; callers decide what
//! happens on denial. State is process-local, so it is only meaningful for a
//! single coordinating instance.

use std::{collections::VecDeque, time::Duration};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Configuration for admission control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum admissions within one window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Length of the sliding window (milliseconds)
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
        }
    }
}

const fn default_max_requests() -> u32 {
    5
}

const fn default_window_ms() -> u64 {
    1000
}

/// Admission timestamps within the trailing window, oldest first
#[derive(Debug, Default)]
struct RateWindow {
    admitted: VecDeque<Instant>,
}

impl RateWindow {
    /// Drop every timestamp that has left the window
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.admitted.front() {
            if now.duration_since(oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window admission controller
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    state: Mutex<RateWindow>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests as usize,
            window: Duration::from_millis(config.window_ms),
            state: Mutex::new(RateWindow::default()),
        }
    }

    /// Admit or deny one request
    ///
    /// Returns `true` and records the admission if fewer than `max_requests`
    /// admissions happened within the window, `false` otherwise.
    pub fn admit(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.prune(now, self.window);

        if state.admitted.len() < self.max_requests {
            state.admitted.push_back(now);
            true
        } else {
            let in_window = state.admitted.len();
            drop(state);
            tracing::debug!(
                in_window,
                max_requests = self.max_requests,
                window_ms = self.window.as_millis(),
                "Admission denied, rate limit reached"
            );
            false
        }
    }

    /// Get current window occupancy (for monitoring/debugging)
    pub fn stats(&self) -> RateLimitStats {
        let mut state = self.state.lock();
        state.prune(Instant::now(), self.window);

        RateLimitStats {
            in_window: state.admitted.len(),
            max_requests: self.max_requests,
        }
    }
}

/// Statistics for the admission window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStats {
    /// Admissions currently inside the window
    pub in_window: usize,
    /// Capacity of the window
    pub max_requests: usize,
}
