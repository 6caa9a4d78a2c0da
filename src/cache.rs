use crate::config::CacheConfig;
use crate::config::EvictionStrategy;
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::pattern::PatternCache;
use crate::stats::StatsCollector;
use crate::sweeper::SweepTarget;
use crate::sweeper::Sweeper;
use crate::tag_index::TagIndex;
use crate::traits::CacheInvalidator;
use crate::types::CacheItemMetadata;
use crate::types::CacheStats;
use async_trait::async_trait;
use garde::Validate;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::trace;

const PATTERN_CACHE_CAPACITY: u64 = 256;

// Entries and their tag memberships are always mutated together, under the same lock.
struct Store<V> {
    entries:  HashMap<String, CacheEntry<V>>,
    tags:     TagIndex,
    tick:     u64,
    // Entries with an expiration time. The sweeper has nothing to do when there are none.
    expiring: usize,
}

impl<V> Store<V> {
    fn new() -> Self {
        Self {
            entries:  HashMap::new(),
            tags:     TagIndex::default(),
            tick:     0,
            expiring: 0,
        }
    }

    #[inline]
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn insert(&mut self, key: String, entry: CacheEntry<V>) {
        if entry.expires_at().is_some() {
            self.expiring += 1;
        }
        self.tags.add_all(entry.tags(), &key);
        self.entries.insert(key, entry);
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        if entry.expires_at().is_some() {
            self.expiring -= 1;
        }
        self.tags.remove_all(entry.tags(), key);
        Some(entry)
    }

    // An expired entry is dropped too, but it doesn't count as removed since it is already gone for readers.
    fn remove_live(&mut self, key: &str, now: Instant) -> bool {
        self.remove(key).is_some_and(|entry| !entry.is_expired(now))
    }

    fn victim(&self, strategy: EvictionStrategy) -> Option<String> {
        let entries = self.entries.iter();
        let found = match strategy {
            EvictionStrategy::Lru => entries.min_by_key(|(_, e)| e.access_tick()),
            EvictionStrategy::Fifo => entries.min_by_key(|(_, e)| e.created_tick()),
            EvictionStrategy::Lfu => entries.min_by_key(|(_, e)| (e.access_count(), e.access_tick())),
        };
        found.map(|(key, _)| key.clone())
    }

    fn evict(&mut self, strategy: EvictionStrategy) -> Option<String> {
        let victim = self.victim(strategy)?;
        self.remove(&victim);
        Some(victim)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect::<Vec<_>>();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn live(&self, key: &str, now: Instant) -> Option<&CacheEntry<V>> {
        self.entries.get(key).filter(|e| !e.is_expired(now))
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.tags.clear();
        self.expiring = 0;
    }
}

/// In-memory key/value cache with per-entry TTL, bounded size, tags and glob-pattern invalidation.
///
/// ```ignore
/// let cache = MemoryCache::<User>::new(
///     CacheConfig::builder()
///         .max_size(10_000)
///         .default_ttl(Duration::from_secs(60))
///         .cleanup_interval(Duration::from_secs(10))
///         .build()?,
/// )?;
///
/// cache.set_with("repo:user:42", user, None, ["users", "tenant:acme"]).await;
///
/// if let Some(user) = cache.get("repo:user:42").await {
///     // ...
/// }
///
/// // Drop every entry of the tenant.
/// cache.delete_by_tag("tenant:acme").await;
/// // ... or every cached user.
/// cache.delete_by_pattern("repo:user:*").await?;
/// ```
///
/// Expired entries are dropped lazily on read and by a background sweeper which is started with the first TTL-bound
/// entry, provided there is a tokio runtime around. Call [`close`](Self::close) to stop the sweeper.
pub struct MemoryCache<V> {
    config:   CacheConfig,
    store:    Mutex<Store<V>>,
    stats:    StatsCollector,
    sweeper:  Sweeper,
    patterns: PatternCache,
    myself:   Weak<MemoryCache<V>>,
}

impl<V> MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Result<Arc<Self>, CacheError> {
        config.validate()?;
        Ok(Arc::new_cyclic(|myself| Self {
            store: Mutex::new(Store::new()),
            stats: StatsCollector::new(config.enable_stats()),
            sweeper: Sweeper::new(config.cleanup_interval()),
            patterns: PatternCache::new(PATTERN_CACHE_CAPACITY),
            myself: myself.clone(),
            config,
        }))
    }

    pub fn with_defaults() -> Result<Arc<Self>, CacheError> {
        Self::new(CacheConfig::builder().build()?)
    }

    #[inline]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[inline]
    pub fn name(&self) -> String {
        self.config.name()
    }

    #[inline]
    pub fn event_invalidation_enabled(&self) -> bool {
        self.config.enable_event_invalidation()
    }

    fn expiry_for(&self, ttl: Option<Duration>, now: Instant) -> Option<Instant> {
        let ttl = ttl.unwrap_or(self.config.default_ttl());
        if ttl.is_zero() {
            None
        }
        else {
            Some(now + ttl)
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let outcome = {
            let mut store = self.store.lock();
            match store.entries.get(key).map(|e| e.is_expired(now)) {
                None => None,
                Some(true) => {
                    store.remove(key);
                    Some(None)
                }
                Some(false) => {
                    let tick = store.next_tick();
                    Some(store.entries.get_mut(key).map(|e| e.touch(now, tick).clone()))
                }
            }
        };

        match outcome {
            Some(Some(value)) => {
                trace!(cache = %self.name(), key, "Hit");
                self.stats.record_hit();
                Some(value)
            }
            Some(None) => {
                trace!(cache = %self.name(), key, "Expired on read");
                self.stats.record_miss();
                None
            }
            None => {
                trace!(cache = %self.name(), key, "Miss");
                self.stats.record_miss();
                None
            }
        }
    }

    /// Only hits are returned.
    pub async fn get_many<I, K>(&self, keys: I) -> HashMap<String, V>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut found = HashMap::new();
        for key in keys {
            let key = key.as_ref();
            if let Some(value) = self.get(key).await {
                found.insert(key.to_string(), value);
            }
        }
        found
    }

    /// Insert with the default TTL and no tags.
    #[inline]
    pub async fn set<K: Into<String>>(&self, key: K, value: V) {
        self.set_with(key, value, None, Vec::<String>::new()).await
    }

    /// Insert or overwrite an entry.
    ///
    /// With `ttl` being `None` the configured default TTL is used. A zero TTL, whether explicit or the default one,
    /// means the entry never expires. Overwriting replaces the value, the expiration time, and the tags; the access
    /// count starts over.
    pub async fn set_with<K, I, T>(&self, key: K, value: V, ttl: Option<Duration>, tags: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let key = key.into();
        let tags = tags.into_iter().map(Into::into).collect::<HashSet<String>>();
        let now = Instant::now();
        let expires_at = self.expiry_for(ttl, now);

        let evicted = {
            let mut guard = self.store.lock();
            let store = &mut *guard;
            let tick = store.next_tick();

            if let Some(entry) = store.entries.get_mut(&key) {
                let was_expiring = entry.expires_at().is_some();
                let stale = entry.replace(value, expires_at, tags, now, tick);
                store.tags.remove_all(stale.difference(entry.tags()), &key);
                store.tags.add_all(entry.tags(), &key);
                match (was_expiring, expires_at.is_some()) {
                    (false, true) => store.expiring += 1,
                    (true, false) => store.expiring -= 1,
                    _ => (),
                }
                None
            }
            else {
                let max_size = self.config.max_size();
                // Dead entries make room before any live one is evicted.
                if store.entries.len() >= max_size {
                    let purged = store.purge_expired(now);
                    if purged > 0 {
                        trace!(cache = %self.name(), purged, "Expired entries purged to make room");
                    }
                }
                let evicted = if store.entries.len() >= max_size {
                    store.evict(self.config.eviction_strategy())
                }
                else {
                    None
                };
                store.insert(key.clone(), CacheEntry::new(value, expires_at, tags, now, tick));
                evicted
            }
        };

        trace!(cache = %self.name(), key = %key, ?expires_at, "Set");
        self.stats.record_set();

        if let Some(evicted) = evicted {
            debug!(
                cache = %self.name(),
                key = %evicted,
                strategy = %self.config.eviction_strategy(),
                "Evicted to make room for '{key}'"
            );
            self.stats.record_eviction();
        }

        if expires_at.is_some() {
            self.sweeper.ensure_running(self.myself.clone());
        }
    }

    /// Get the cached value or produce it with `init` and cache it. An error from `init` is passed through and nothing
    /// gets cached.
    ///
    /// Concurrent callers for the same missing key may each run their `init`; the last one to finish wins.
    pub async fn get_or_try_insert_with<F, E, I, T>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        tags: I,
        init: F,
    ) -> Result<V, E>
    where
        F: Future<Output = Result<V, E>>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let value = init.await?;
        self.set_with(key, value.clone(), ttl, tags).await;
        Ok(value)
    }

    /// Returns `true` if there was a live entry for the key. An expired entry is dropped without being counted.
    pub async fn delete(&self, key: &str) -> bool {
        let removed = self.store.lock().remove_live(key, Instant::now());
        if removed {
            trace!(cache = %self.name(), key, "Deleted");
            self.stats.record_delete();
        }
        removed
    }

    /// Returns the number of keys actually removed.
    pub async fn delete_many<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut removed = 0;
        for key in keys {
            if self.delete(key.as_ref()).await {
                removed += 1;
            }
        }
        removed
    }

    /// Remove every entry tagged with `tag`. Returns the number of removed live entries.
    pub async fn delete_by_tag(&self, tag: &str) -> usize {
        let now = Instant::now();
        let removed = {
            let mut store = self.store.lock();
            let keys = store.tags.keys_for(tag);
            keys.iter().filter(|key| store.remove_live(key.as_str(), now)).count()
        };

        debug!(cache = %self.name(), tag, removed, "Invalidated by tag");
        self.stats.record_deletes(removed);
        removed
    }

    pub async fn delete_by_tags<I, T>(&self, tags: I) -> usize
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut removed = 0;
        for tag in tags {
            removed += self.delete_by_tag(tag.as_ref()).await;
        }
        removed
    }

    /// Remove every entry whose key matches the glob `pattern`. See the [`pattern`](crate::pattern) module for the
    /// syntax.
    pub async fn delete_by_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let matcher = self.patterns.get(pattern)?;
        let now = Instant::now();
        let removed = {
            let mut store = self.store.lock();
            let keys = store
                .entries
                .keys()
                .filter(|key| matcher.is_match(key))
                .cloned()
                .collect::<Vec<_>>();
            keys.iter().filter(|key| store.remove_live(key.as_str(), now)).count()
        };

        debug!(cache = %self.name(), pattern, removed, "Invalidated by pattern");
        self.stats.record_deletes(removed);
        Ok(removed)
    }

    /// Drop all entries. Statistics are kept.
    pub async fn clear(&self) {
        let count = {
            let mut store = self.store.lock();
            let count = store.entries.len();
            store.clear();
            count
        };
        info!(cache = %self.name(), count, "Cache cleared");
    }

    /// Whether there is a live entry for the key. Doesn't count as an access.
    pub async fn contains(&self, key: &str) -> bool {
        self.store.lock().live(key, Instant::now()).is_some()
    }

    /// Entry bookkeeping snapshot. Doesn't count as an access. Expired entries are reported as missing.
    pub async fn metadata(&self, key: &str) -> Option<CacheItemMetadata> {
        self.store
            .lock()
            .live(key, Instant::now())
            .map(|entry| entry.metadata(key))
    }

    /// Keys of all live entries, in no particular order.
    pub async fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.store
            .lock()
            .entries
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Keys carrying the tag, sorted.
    pub async fn tagged_keys(&self, tag: &str) -> Vec<String> {
        let mut keys = self.store.lock().tags.keys_for(tag);
        keys.sort();
        keys
    }

    /// The number of tags in use.
    pub fn tag_count(&self) -> usize {
        self.store.lock().tags.tag_count()
    }

    /// The number of stored entries, including expired ones not swept yet.
    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().entries.is_empty()
    }

    /// Run an expiry sweep right away. Returns the number of removed entries.
    pub async fn sweep(&self) -> usize {
        self.sweep_expired()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.len(), self.config.max_size())
    }

    /// Zero the counters. Entries are not affected.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    pub fn sweeper_running(&self) -> bool {
        self.sweeper.is_running()
    }

    /// Stop the expiry sweeper and drop all entries. Safe to call more than once.
    pub async fn close(&self) {
        if self.sweeper.stop() {
            debug!(cache = %self.name(), "Expiry sweeper stopped");
        }
        self.store.lock().clear();
    }
}

impl<V> SweepTarget for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn sweep_expired(&self) -> usize {
        let removed = self.store.lock().purge_expired(Instant::now());
        if removed > 0 {
            debug!(cache = %self.name(), removed, "Expired entries swept");
        }
        self.stats.record_cleanup();
        removed
    }

    fn has_expiring(&self) -> bool {
        self.store.lock().expiring > 0
    }

    fn name(&self) -> String {
        MemoryCache::name(self)
    }
}

#[async_trait]
impl<V> CacheInvalidator for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn invalidate_key(&self, key: &str) -> bool {
        self.delete(key).await
    }

    async fn invalidate_tag(&self, tag: &str) -> usize {
        self.delete_by_tag(tag).await
    }

    async fn invalidate_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        self.delete_by_pattern(pattern).await
    }
}

impl<V> Debug for MemoryCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("name", &self.config.name())
            .field("len", &self.store.lock().entries.len())
            .field("max_size", &self.config.max_size())
            .field("eviction_strategy", &self.config.eviction_strategy())
            .finish()
    }
}
