//! Per-user sliding-window admission for the automation endpoint.
//!
//! Each user gets a list of recent call instants. A check prunes entries
//! older than the window, allows the call if fewer than the maximum remain
//! and records it; a denial records nothing and reports how long until the
//! oldest retained call leaves the window.

use dashmap::DashMap;
use std::time::{Duration, Instant};

pub const MAX_REQUESTS_PER_WINDOW: usize = 10;
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub retry_after_seconds: Option<u64>,
}

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    calls: DashMap<String, Vec<Instant>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_limits(MAX_REQUESTS_PER_WINDOW, WINDOW)
    }

    pub fn with_limits(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            calls: DashMap::new(),
        }
    }

    pub fn check(&self, user_id: &str) -> RateDecision {
        self.check_at(user_id, Instant::now())
    }

    fn check_at(&self, user_id: &str, now: Instant) -> RateDecision {
        let mut calls = self.calls.entry(user_id.to_string()).or_default();
        calls.retain(|t| now.duration_since(*t) < self.window);

        if calls.len() < self.max_requests {
            calls.push(now);
            return RateDecision {
                allowed: true,
                retry_after_seconds: None,
            };
        }

        // Entries are in insertion order, so the front is the oldest.
        let remaining = match calls.first() {
            Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
            None => self.window,
        };
        let mut seconds = remaining.as_secs();
        if remaining.subsec_nanos() > 0 {
            seconds += 1;
        }
        RateDecision {
            allowed: false,
            retry_after_seconds: Some(seconds.max(1)),
        }
    }
}
