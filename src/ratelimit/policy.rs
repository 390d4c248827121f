//! Rate limit policies and route classes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An immutable fixed-window policy: at most `max_requests` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Length of the fixed window
    pub window: Duration,
    /// Requests admitted per window per client
    pub max_requests: u32,
}

impl RateLimitPolicy {
    /// Create a policy.
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
        }
    }
}

/// Named limiter classes, one independent limiter instance each.
///
/// A client is tracked separately under every class it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimiterClass {
    /// General API traffic
    Standard,
    /// Price endpoints, higher throughput
    Price,
    /// Historical data, most expensive to produce
    History,
}

impl LimiterClass {
    /// All classes, for wiring one limiter per class.
    pub const ALL: [LimiterClass; 3] = [
        LimiterClass::Standard,
        LimiterClass::Price,
        LimiterClass::History,
    ];

    /// Built-in policy for this class.
    pub fn default_policy(&self) -> RateLimitPolicy {
        match self {
            // 100 requests per 15 minutes
            LimiterClass::Standard => RateLimitPolicy::new(Duration::from_secs(15 * 60), 100),
            // 120 requests per minute
            LimiterClass::Price => RateLimitPolicy::new(Duration::from_secs(60), 120),
            // 20 requests per minute
            LimiterClass::History => RateLimitPolicy::new(Duration::from_secs(60), 20),
        }
    }

    /// Class name as used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            LimiterClass::Standard => "standard",
            LimiterClass::Price => "price",
            LimiterClass::History => "history",
        }
    }
}

impl std::fmt::Display for LimiterClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
