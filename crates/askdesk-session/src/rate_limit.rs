//! Sliding-window rate limiter keyed by session id.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// Width of the sliding window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Per-key request timestamps. The DashMap entry lock makes prune + check +
/// record atomic for one key; different keys do not contend.
pub struct RateLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_window(RATE_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            window,
        }
    }

    /// Admit and record one request if fewer than `limit` were admitted in the window.
    pub fn is_allowed(&self, id: &str, limit: usize) -> bool {
        self.is_allowed_at(id, limit, Instant::now())
    }

    /// [`is_allowed`](Self::is_allowed) with an explicit clock. A denied call records nothing.
    pub fn is_allowed_at(&self, id: &str, limit: usize, now: Instant) -> bool {
        let mut entry = self.windows.entry(id.to_string()).or_default();
        prune(&mut entry, now, self.window);
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            debug!("Rate limited {} ({} in window)", id, entry.len());
            false
        }
    }

    /// Requests still admissible in the current window.
    pub fn remaining(&self, id: &str, limit: usize) -> usize {
        self.remaining_at(id, limit, Instant::now())
    }

    pub fn remaining_at(&self, id: &str, limit: usize, now: Instant) -> usize {
        match self.windows.get_mut(id) {
            Some(mut entry) => {
                prune(&mut entry, now, self.window);
                limit.saturating_sub(entry.len())
            }
            None => limit,
        }
    }

    /// Time until the oldest recorded request leaves the window.
    pub fn retry_after(&self, id: &str) -> Duration {
        self.retry_after_at(id, Instant::now())
    }

    pub fn retry_after_at(&self, id: &str, now: Instant) -> Duration {
        self.windows
            .get(id)
            .and_then(|entry| entry.front().copied())
            .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or(Duration::ZERO)
    }

    pub fn clear(&self, id: &str) {
        self.windows.remove(id);
    }

    pub fn clear_all(&self) {
        self.windows.clear();
    }

    /// Number of keys with a window.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

fn prune(times: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = times.front() {
        if now.saturating_duration_since(front) >= window {
            times.pop_front();
        } else {
            break;
        }
    }
}
