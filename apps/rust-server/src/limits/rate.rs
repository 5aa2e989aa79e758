// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fixed-window request rate limiting keyed by client.
//!
//! Windows are kept in an LRU so the table stays bounded no matter how many
//! distinct clients are seen; an evicted client simply starts a new window.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

/// Default requests allowed per window.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 120;

/// Default number of client windows tracked.
pub const DEFAULT_CAPACITY: usize = 10_000;

struct Window {
    started_at: Instant,
    count: u32,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// In-process fixed-window limiter.
pub struct RateLimiter {
    windows: Mutex<LruCache<String, Window>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    /// Create a limiter allowing `limit` requests per `window` per client.
    pub fn new(limit: u32, window: Duration, capacity: usize) -> Self {
        Self {
            windows: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            limit,
            window,
        }
    }

    /// `limit` requests per minute with the default table size.
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60), DEFAULT_CAPACITY)
    }

    pub fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        let Ok(mut windows) = self.windows.lock() else {
            // A poisoned table should not take the API down with it.
            return RateDecision::Allowed { remaining: 0 };
        };

        let window = windows.get_or_insert_mut(client.to_string(), || Window {
            started_at: now,
            count: 0,
        });
        let elapsed = now.saturating_duration_since(window.started_at);
        if elapsed >= self.window {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.limit {
            let retry_after = self.window.saturating_sub(elapsed.min(self.window));
            return RateDecision::Limited { retry_after };
        }
        window.count += 1;
        RateDecision::Allowed {
            remaining: self.limit - window.count,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_minute(DEFAULT_REQUESTS_PER_MINUTE)
    }
}
