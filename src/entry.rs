use crate::types::CacheItemMetadata;
use std::collections::HashSet;
use std::fmt::Debug;
use tokio::time::Instant;

pub(crate) struct CacheEntry<V> {
    value:            V,
    expires_at:       Option<Instant>,
    created_at:       Instant,
    last_accessed_at: Instant,
    access_count:     u64,
    tags:             HashSet<String>,
    // Ticks come from the store-wide counter. Unlike instants they never compare equal for two different events.
    created_tick:     u64,
    access_tick:      u64,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(value: V, expires_at: Option<Instant>, tags: HashSet<String>, now: Instant, tick: u64) -> Self {
        Self {
            value,
            expires_at,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            tags,
            created_tick: tick,
            access_tick: tick,
        }
    }

    /// Overwrite with a new value. Returns the tags of the replaced value.
    pub(crate) fn replace(
        &mut self,
        value: V,
        expires_at: Option<Instant>,
        tags: HashSet<String>,
        now: Instant,
        tick: u64,
    ) -> HashSet<String> {
        self.value = value;
        self.expires_at = expires_at;
        self.last_accessed_at = now;
        self.access_count = 0;
        self.access_tick = tick;
        std::mem::replace(&mut self.tags, tags)
    }

    pub(crate) fn touch(&mut self, now: Instant, tick: u64) -> &V {
        self.access_count += 1;
        self.last_accessed_at = now;
        self.access_tick = tick;
        &self.value
    }

    #[inline]
    pub(crate) fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    #[inline]
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    #[cfg(test)]
    pub(crate) fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub(crate) fn tags(&self) -> &HashSet<String> {
        &self.tags
    }

    #[inline]
    pub(crate) fn access_count(&self) -> u64 {
        self.access_count
    }

    #[inline]
    pub(crate) fn created_tick(&self) -> u64 {
        self.created_tick
    }

    #[inline]
    pub(crate) fn access_tick(&self) -> u64 {
        self.access_tick
    }

    pub(crate) fn metadata(&self, key: &str) -> CacheItemMetadata {
        let mut tags = self.tags.iter().cloned().collect::<Vec<_>>();
        tags.sort();
        CacheItemMetadata {
            key: key.to_string(),
            expires_at: self.expires_at,
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
            access_count: self.access_count,
            tags,
        }
    }
}

impl<V> Debug for CacheEntry<V>
where
    V: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("value", &self.value)
            .field("expires_at", &self.expires_at)
            .field("access_count", &self.access_count)
            .field("tags", &self.tags)
            .finish()
    }
}
