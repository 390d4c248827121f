//! TTL-keyed cache store with class-based expiry.

pub mod class;
pub mod store;

pub use class::CacheClass;
pub use store::{CacheJournal, CacheStats, CacheStore};
