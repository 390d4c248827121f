//! Per-client fixed-window rate limiting.

pub mod limiter;
pub mod policy;

pub use limiter::{Decision, RateLimiter};
pub use policy::{LimiterClass, RateLimitPolicy};

use crate::clock::Clock;
use std::sync::Arc;

/// One limiter per route class.
///
/// Every class gets its own instance, so a client is tracked independently
/// under each policy it is subject to.
pub struct LimiterSet {
    standard: Arc<RateLimiter>,
    price: Arc<RateLimiter>,
    history: Arc<RateLimiter>,
}

impl LimiterSet {
    /// Build a set from a policy per class.
    pub fn new(policies: impl Fn(LimiterClass) -> RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            standard: Arc::new(RateLimiter::new(
                policies(LimiterClass::Standard),
                clock.clone(),
            )),
            price: Arc::new(RateLimiter::new(policies(LimiterClass::Price), clock.clone())),
            history: Arc::new(RateLimiter::new(policies(LimiterClass::History), clock)),
        }
    }

    /// Build a set with every class on its built-in policy.
    pub fn with_defaults(clock: Arc<dyn Clock>) -> Self {
        Self::new(|class| class.default_policy(), clock)
    }

    /// The limiter for a class.
    pub fn get(&self, class: LimiterClass) -> &Arc<RateLimiter> {
        match class {
            LimiterClass::Standard => &self.standard,
            LimiterClass::Price => &self.price,
            LimiterClass::History => &self.history,
        }
    }

    /// Iterate all (class, limiter) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (LimiterClass, &Arc<RateLimiter>)> {
        LimiterClass::ALL.iter().map(move |class| (*class, self.get(*class)))
    }
}
