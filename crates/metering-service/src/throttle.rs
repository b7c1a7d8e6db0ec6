//! Request throttling.
//!
//! Two independent gates sit in front of the consumption guard:
//!
//! - a fixed-window rate limiter keyed by `(caller, route)`, injected through
//!   the [`RateLimiter`] trait so its lifetime is owned by [`crate::AppState`]
//!   rather than module-level statics, and swappable for a shared counter
//!   store in multi-process deployments;
//! - a per-account daily soft quota on costly operation kinds, counted
//!   against usage records since UTC midnight.
//!
//! Both reject before any credit is touched.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Under the limit; the request may proceed.
    Allowed,

    /// Over the limit for the current window.
    Limited {
        /// Seconds until the window rolls over.
        retry_after_seconds: u64,
    },
}

/// A rate limiter keyed by `(caller, route)`.
pub trait RateLimiter: Send + Sync {
    /// Record one request and decide whether it may proceed.
    fn check(&self, caller: &str, route: &str) -> RateDecision;
}

struct Window {
    started_at: Instant,
    count: u32,
}

/// In-memory fixed-window limiter for single-process deployments.
///
/// Each `(caller, route)` key gets a counter that resets when the window
/// elapses. Requests beyond `max_requests` within a window are rejected.
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<(String, String), Window>>,
}

impl FixedWindowLimiter {
    /// Create a limiter allowing `max_requests` per `window` per key.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check at an explicit instant. Test seam; `check` passes `Instant::now`.
    fn check_at(&self, caller: &str, route: &str, now: Instant) -> RateDecision {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Expired windows for other keys accumulate otherwise.
        windows.retain(|_, w| now.duration_since(w.started_at) < self.window);

        let window = windows
            .entry((caller.to_string(), route.to_string()))
            .or_insert(Window {
                started_at: now,
                count: 0,
            });

        if now.duration_since(window.started_at) >= self.window {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.max_requests {
            let elapsed = now.duration_since(window.started_at);
            let remaining = self.window.saturating_sub(elapsed);
            return RateDecision::Limited {
                retry_after_seconds: remaining.as_secs().max(1),
            };
        }

        window.count += 1;
        RateDecision::Allowed
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, caller: &str, route: &str) -> RateDecision {
        self.check_at(caller, route, Instant::now())
    }
}
