//! In-memory TTL cache store.
//!
//! Correctness comes from lazy expiry on lookup; the periodic sweep only
//! bounds idle memory. An optional journal records entries and hits to a
//! secondary store for introspection, strictly best-effort.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::class::CacheClass;
use crate::clock::Clock;

/// Best-effort secondary record of cache activity.
///
/// Failures here must never block or fail a cache operation; the store
/// catches them, logs them, and moves on.
pub trait CacheJournal: Send + Sync {
    /// Record that an entry was stored.
    fn record_entry(&self, key: &str, expires_at: DateTime<Utc>) -> anyhow::Result<()>;

    /// Record a live hit on an entry.
    fn record_hit(&self, key: &str) -> anyhow::Result<()>;
}

/// A cached payload with its absolute expiry and hit count.
#[derive(Debug, Clone)]
struct CacheEntry {
    data: Value,
    expires_at: DateTime<Utc>,
    hits: u64,
}

/// Read-only cache introspection.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    /// Number of live entries
    pub size: usize,
    /// Keys of all entries
    pub keys: Vec<String>,
}

/// TTL key-value store shared across request tasks.
///
/// Entries are never returned once expired: `get` deletes an expired entry
/// on sight, and `sweep` clears the rest on an interval.
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    clock: Arc<dyn Clock>,
    journal: Option<Arc<dyn CacheJournal>>,
}

impl CacheStore {
    /// Create a store without a journal.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            journal: None,
        }
    }

    /// Create a store that records entries and hits to a journal.
    pub fn with_journal(clock: Arc<dyn Clock>, journal: Arc<dyn CacheJournal>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            journal: Some(journal),
        }
    }

    /// Look up a key.
    ///
    /// Returns `None` for missing or expired entries, deleting the latter.
    /// A live hit increments the entry's hit counter.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();

        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.expires_at > now {
                entry.hits += 1;
                let data = entry.data.clone();
                drop(entry);

                if let Some(journal) = &self.journal {
                    if let Err(e) = journal.record_hit(key) {
                        warn!(key = %key, error = %e, "Cache journal hit record failed");
                    }
                }
                return Some(data);
            }
            // Expired entry, remove it
            drop(entry);
            self.entries.remove(key);
        }

        None
    }

    /// Store a value under a key, overwriting any existing entry.
    ///
    /// The TTL comes from the cache class table.
    pub fn set(&self, key: &str, data: Value, class: CacheClass) {
        let expires_at = self.clock.now()
            + chrono::Duration::from_std(class.ttl()).unwrap_or_else(|_| chrono::Duration::zero());

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                expires_at,
                hits: 0,
            },
        );

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.record_entry(key, expires_at) {
                warn!(key = %key, error = %e, "Cache journal entry record failed");
            }
        }
    }

    /// Remove one entry if present. Removing a missing key is not an error.
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Remove all entries whose key matches the pattern.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| pattern.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let removed = matching.len();
        for key in matching {
            self.entries.remove(&key);
        }
        removed
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Current size and keys. Does not mutate state.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            keys: self.entries.iter().map(|e| e.key().clone()).collect(),
        }
    }

    /// Hit count for a key, if the entry exists.
    pub fn hits(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|e| e.hits)
    }

    /// Remove all expired entries, returning the number removed.
    ///
    /// Run by the background task on a fixed interval.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - self.entries.len();

        if removed > 0 {
            debug!(removed = removed, "Cleaned up expired cache entries");
        }
        removed
    }
}
