use fieldx::fxstruct;
use garde::Validate;
use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;
use strum::Display;
use strum::EnumString;

/// Which entry gets evicted when a new key is inserted into a full cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvictionStrategy {
    /// Least recently used: the entry whose last read or write is the oldest.
    Lru,
    /// First in, first out: the oldest inserted entry. Overwriting a key doesn't renew it.
    Fifo,
    /// Least frequently used: the entry with the lowest access count, the least recently used among equals.
    Lfu,
}

/// Construction-time settings of a [`MemoryCache`](crate::MemoryCache).
///
/// ```
/// use std::time::Duration;
/// use tagcache::config::{CacheConfig, EvictionStrategy};
///
/// let config = CacheConfig::builder()
///     .max_size(500)
///     .default_ttl(Duration::from_secs(30))
///     .eviction_strategy(EvictionStrategy::Lfu)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_size(), 500);
/// ```
#[derive(Debug, Clone, Validate)]
#[fxstruct(no_new, builder, get(copy))]
pub struct CacheConfig {
    /// Cache name. Only used for logging.
    #[fieldx(get(clone), builder(into), default(String::from("memory-cache")))]
    #[garde(length(min = 1))]
    name: String,

    /// TTL applied when `set` is called without an explicit one. Zero means entries never expire.
    #[fieldx(default(Duration::from_secs(300)))]
    #[garde(skip)]
    default_ttl: Duration,

    /// The maximum number of entries.
    #[fieldx(default(1_000))]
    #[garde(range(min = 1))]
    max_size: usize,

    #[fieldx(default(true))]
    #[garde(skip)]
    enable_stats: bool,

    /// Informational. The event invalidator works with the cache regardless of this flag.
    #[fieldx(default(true))]
    #[garde(skip)]
    enable_event_invalidation: bool,

    /// The delay between two consecutive expiry sweeps.
    #[fieldx(default(Duration::from_secs(60)))]
    #[garde(custom(non_zero_duration))]
    cleanup_interval: Duration,

    #[fieldx(default(EvictionStrategy::Lru))]
    #[garde(skip)]
    eviction_strategy: EvictionStrategy,
}

fn non_zero_duration(value: &Duration, _ctx: &()) -> garde::Result {
    if value.is_zero() {
        Err(garde::Error::new("must be greater than zero"))
    }
    else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::builder().build().unwrap();
        assert_eq!(config.name(), "memory-cache");
        assert_eq!(config.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.max_size(), 1_000);
        assert!(config.enable_stats());
        assert!(config.enable_event_invalidation());
        assert_eq!(config.cleanup_interval(), Duration::from_secs(60));
        assert_eq!(config.eviction_strategy(), EvictionStrategy::Lru);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = CacheConfig::builder().max_size(0).build().unwrap();
        assert!(config.validate().is_err());

        let config = CacheConfig::builder()
            .cleanup_interval(Duration::ZERO)
            .build()
            .unwrap();
        assert!(config.validate().is_err());

        let config = CacheConfig::builder().name("").build().unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(EvictionStrategy::from_str("LRU").unwrap(), EvictionStrategy::Lru);
        assert_eq!(EvictionStrategy::from_str("fifo").unwrap(), EvictionStrategy::Fifo);
        assert_eq!(EvictionStrategy::from_str("Lfu").unwrap(), EvictionStrategy::Lfu);
        assert!(EvictionStrategy::from_str("MRU").is_err());
        assert_eq!(EvictionStrategy::Lfu.to_string(), "LFU");
    }
}
