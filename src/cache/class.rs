//! Cache classes: named TTL profiles.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// TTL profile for a cache operation.
///
/// The class is a property of the call site, not of the data: a route is
/// wired to a class, and every store through that route uses the class's
/// TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheClass {
    /// Full price listing
    Prices,
    /// Single-symbol price lookup
    SinglePrice,
    /// Historical price series
    History,
    /// Market overview data
    Markets,
    /// Trending assets
    Trending,
    /// Fallback profile for anything unclassified
    Default,
}

impl CacheClass {
    /// Time-to-live for entries stored under this class.
    pub fn ttl(&self) -> Duration {
        match self {
            CacheClass::Prices => Duration::from_secs(30),
            CacheClass::SinglePrice => Duration::from_secs(15),
            CacheClass::History => Duration::from_secs(300),
            CacheClass::Markets => Duration::from_secs(120),
            CacheClass::Trending => Duration::from_secs(600),
            CacheClass::Default => Duration::from_secs(60),
        }
    }
}
