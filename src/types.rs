use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Point-in-time statistics of a cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits:         u64,
    pub misses:       u64,
    pub sets:         u64,
    pub deletes:      u64,
    /// Number of expiry sweeper passes.
    pub cleanups:     u64,
    pub evictions:    u64,
    pub current_size: usize,
    pub max_size:     usize,
    pub hit_rate:     f64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Bookkeeping of a single cache entry. Taking a snapshot doesn't count as an access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItemMetadata {
    pub key:              String,
    /// `None` if the entry never expires.
    pub expires_at:       Option<Instant>,
    pub created_at:       Instant,
    pub last_accessed_at: Instant,
    pub access_count:     u64,
    /// Sorted.
    pub tags:             Vec<String>,
}

impl CacheItemMetadata {
    /// Time left until expiration; `None` for entries that never expire.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| expires_at.saturating_duration_since(Instant::now()))
    }
}

/// What [`register`](crate::registry::InvalidationRuleRegistry::register) did with the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Added,
    /// A rule with the same id existed and has been overwritten.
    Replaced,
}

impl RegisterOutcome {
    #[inline]
    pub fn is_replaced(&self) -> bool {
        matches!(self, Self::Replaced)
    }
}
