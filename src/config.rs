//! Configuration management for Pricegate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::ratelimit::{LimiterClass, RateLimitPolicy};
use crate::tasks::TaskIntervals;

/// Main configuration for the Pricegate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricegateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().expect("valid default address")
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Expired-entry sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Warm the cache with popular endpoints on startup
    #[serde(default = "default_warm_on_startup")]
    pub warm_on_startup: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            warm_on_startup: default_warm_on_startup(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_warm_on_startup() -> bool {
    true
}

/// One fixed-window policy in configuration form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Window length in seconds
    pub window_secs: u64,
    /// Requests admitted per window per client
    pub max_requests: u32,
}

impl From<&PolicyConfig> for RateLimitPolicy {
    fn from(config: &PolicyConfig) -> Self {
        RateLimitPolicy::new(Duration::from_secs(config.window_secs), config.max_requests)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Stale-entry sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Policy for general API traffic
    #[serde(default = "default_standard_policy")]
    pub standard: PolicyConfig,

    /// Policy for price endpoints
    #[serde(default = "default_price_policy")]
    pub price: PolicyConfig,

    /// Policy for historical data endpoints
    #[serde(default = "default_history_policy")]
    pub history: PolicyConfig,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            standard: default_standard_policy(),
            price: default_price_policy(),
            history: default_history_policy(),
        }
    }
}

fn policy_config(class: LimiterClass) -> PolicyConfig {
    let policy = class.default_policy();
    PolicyConfig {
        window_secs: policy.window.as_secs(),
        max_requests: policy.max_requests,
    }
}

fn default_standard_policy() -> PolicyConfig {
    policy_config(LimiterClass::Standard)
}

fn default_price_policy() -> PolicyConfig {
    policy_config(LimiterClass::Price)
}

fn default_history_policy() -> PolicyConfig {
    policy_config(LimiterClass::History)
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Snapshot flush interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub flush_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_sweep_interval(),
        }
    }
}

impl PricegateConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: PricegateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::PricegateError::Config(e.to_string()))?;
        Ok(config)
    }

    /// The configured policy for a limiter class.
    pub fn policy(&self, class: LimiterClass) -> RateLimitPolicy {
        match class {
            LimiterClass::Standard => (&self.rate_limiting.standard).into(),
            LimiterClass::Price => (&self.rate_limiting.price).into(),
            LimiterClass::History => (&self.rate_limiting.history).into(),
        }
    }

    /// The configured background task intervals.
    pub fn task_intervals(&self) -> TaskIntervals {
        TaskIntervals {
            cache_sweep: Duration::from_secs(self.cache.sweep_interval_secs),
            limiter_sweep: Duration::from_secs(self.rate_limiting.sweep_interval_secs),
            metrics_flush: Duration::from_secs(self.metrics.flush_interval_secs),
        }
    }
}
