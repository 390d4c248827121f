//! Core fixed-window rate limiter.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::policy::RateLimitPolicy;
use crate::clock::Clock;

/// Per-client request count for the current window.
#[derive(Debug, Clone)]
struct ClientWindow {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Outcome of an admission check.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// The policy's per-window maximum
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// When the current window ends
    pub reset_at: DateTime<Utc>,
    /// Seconds until the window resets, present only on rejection
    pub retry_after: Option<u64>,
}

/// Fixed-window rate limiter, one instance per limiter class.
///
/// This is a gate, not a queue: rejected requests fail immediately and are
/// never buffered or delayed. The struct is thread-safe and shared across
/// request tasks; the per-client read-modify-write runs under the map
/// entry's lock so concurrent admits never lose an increment.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    window: chrono::Duration,
    clients: DashMap<String, ClientWindow>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter for a policy.
    pub fn new(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        let window =
            chrono::Duration::from_std(policy.window).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            policy,
            window,
            clients: DashMap::new(),
            clock,
        }
    }

    /// Check and count one request from a client.
    ///
    /// Exactly `max_requests` requests succeed per window; the request that
    /// pushes the count past the maximum is the first rejected one. The
    /// counter resets once, and only once, when the window has lapsed.
    pub fn admit(&self, client_id: &str) -> Decision {
        let now = self.clock.now();

        let (count, reset_at) = {
            let mut entry = self
                .clients
                .entry(client_id.to_string())
                .or_insert_with(|| ClientWindow {
                    count: 0,
                    reset_at: now + self.window,
                });

            if now > entry.reset_at {
                entry.count = 0;
                entry.reset_at = now + self.window;
            }

            entry.count += 1;
            (entry.count, entry.reset_at)
        };

        let allowed = count <= self.policy.max_requests;
        let remaining = self.policy.max_requests.saturating_sub(count);

        trace!(
            client_id = %client_id,
            count = count,
            remaining = remaining,
            "Checked rate limit"
        );

        let retry_after = if allowed {
            None
        } else {
            debug!(client_id = %client_id, "Rate limit exceeded");
            let until_reset = (reset_at - now).num_milliseconds().max(0) as u64;
            Some(until_reset.div_ceil(1000))
        };

        Decision {
            allowed,
            limit: self.policy.max_requests,
            remaining,
            reset_at,
            retry_after,
        }
    }

    /// The policy this limiter enforces.
    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Number of tracked clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Drop entries whose window has been stale for longer than one full
    /// window duration, to bound memory for inactive clients.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let cutoff = self.clock.now() - self.window;
        let before = self.clients.len();
        self.clients.retain(|_, entry| entry.reset_at > cutoff);
        let removed = before - self.clients.len();

        if removed > 0 {
            debug!(removed = removed, "Dropped stale rate limit entries");
        }
        removed
    }

    /// Forget all clients.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.clients.clear();
    }
}
