//! Fixed-window per-identity rate limiting.
//!
//! A window starts on the first request from an identity and is reset, not
//! deleted, once it has elapsed. Requests straddling a window boundary can
//! briefly reach twice the nominal rate.

use crate::core::config::RateLimitConfig;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    /// Denied until the current window resets
    Deny { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow)
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    request_count: u32,
    window_reset_at: Instant,
}

/// Rate limit state keyed by caller identity.
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// Count one request from `identity` against `max_requests` per `window`
    pub fn check(&self, identity: &str, max_requests: u32, window: Duration) -> RateDecision {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(identity.to_string())
            .or_insert_with(|| RateLimitEntry {
                request_count: 0,
                window_reset_at: now + window,
            });

        if now >= entry.window_reset_at {
            entry.request_count = 0;
            entry.window_reset_at = now + window;
        }

        if entry.request_count >= max_requests {
            return RateDecision::Deny {
                retry_after: entry.window_reset_at.saturating_duration_since(now),
            };
        }

        entry.request_count += 1;
        RateDecision::Allow
    }

    /// Check `identity` against the limit of the first rule matching `path`.
    ///
    /// Each rule keeps its own window, so a caller exhausting the `/auth`
    /// budget can still reach other paths.
    pub fn check_path(&self, identity: &str, path: &str) -> RateDecision {
        match self.config.rules.iter().find(|rule| path.contains(&rule.pattern)) {
            Some(rule) => {
                let key = format!("{}|{}", rule.pattern, identity);
                self.check(&key, rule.max_requests, rule.window)
            },
            None => self.check(identity, self.config.max_requests, self.config.window),
        }
    }

    /// Remove identities whose window ended more than `sweep_idle` ago
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let idle = self.config.sweep_idle;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now < entry.window_reset_at + idle);
        before.saturating_sub(self.entries.len())
    }

    /// Number of tracked identities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
