use crate::types::CacheStats;
use chrono::DateTime;
use chrono::Utc;
use parking_lot::Mutex;

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    hits:         u64,
    misses:       u64,
    sets:         u64,
    deletes:      u64,
    cleanups:     u64,
    evictions:    u64,
    last_updated: Option<DateTime<Utc>>,
}

/// Cache statistics counters. Recording is a no-op when statistics are disabled, but snapshots are always available.
#[derive(Debug)]
pub(crate) struct StatsCollector {
    enabled:  bool,
    counters: Mutex<Counters>,
}

macro_rules! recorder {
    ($($name:ident => $field:ident),+ $(,)?) => {
        $(
            #[inline]
            pub(crate) fn $name(&self) {
                self.record(|c| c.$field += 1);
            }
        )+
    };
}

impl StatsCollector {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            counters: Mutex::new(Counters::default()),
        }
    }

    #[inline]
    fn record<F: FnOnce(&mut Counters)>(&self, f: F) {
        if self.enabled {
            let mut counters = self.counters.lock();
            f(&mut counters);
            counters.last_updated = Some(Utc::now());
        }
    }

    recorder! {
        record_hit => hits,
        record_miss => misses,
        record_set => sets,
        record_delete => deletes,
        record_cleanup => cleanups,
        record_eviction => evictions,
    }

    pub(crate) fn record_deletes(&self, count: usize) {
        if count > 0 {
            self.record(|c| c.deletes += count as u64);
        }
    }

    pub(crate) fn reset(&self) {
        let mut counters = self.counters.lock();
        *counters = Counters {
            last_updated: Some(Utc::now()),
            ..Counters::default()
        };
    }

    pub(crate) fn snapshot(&self, current_size: usize, max_size: usize) -> CacheStats {
        let c = *self.counters.lock();
        let lookups = c.hits + c.misses;
        CacheStats {
            hits: c.hits,
            misses: c.misses,
            sets: c.sets,
            deletes: c.deletes,
            cleanups: c.cleanups,
            evictions: c.evictions,
            current_size,
            max_size,
            hit_rate: if lookups == 0 {
                0.0
            }
            else {
                c.hits as f64 / lookups as f64
            },
            last_updated: c.last_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = StatsCollector::new(true);
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_set();
        stats.record_deletes(2);
        stats.record_deletes(0);
        stats.record_cleanup();
        stats.record_eviction();

        let snapshot = stats.snapshot(3, 10);
        assert_eq!(snapshot.hits, 3);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.sets, 1);
        assert_eq!(snapshot.deletes, 2);
        assert_eq!(snapshot.cleanups, 1);
        assert_eq!(snapshot.evictions, 1);
        assert_eq!(snapshot.current_size, 3);
        assert_eq!(snapshot.max_size, 10);
        assert_eq!(snapshot.hit_rate, 0.75);
        assert!(snapshot.last_updated.is_some());
    }

    #[test]
    fn test_disabled() {
        let stats = StatsCollector::new(false);
        stats.record_hit();
        stats.record_miss();
        stats.record_set();

        let snapshot = stats.snapshot(1, 5);
        assert_eq!(snapshot.hits, 0);
        assert_eq!(snapshot.misses, 0);
        assert_eq!(snapshot.sets, 0);
        assert_eq!(snapshot.hit_rate, 0.0);
        assert_eq!(snapshot.current_size, 1);
        assert!(snapshot.last_updated.is_none());
    }

    #[test]
    fn test_reset() {
        let stats = StatsCollector::new(true);
        stats.record_hit();
        stats.record_set();
        stats.reset();

        let snapshot = stats.snapshot(0, 5);
        assert_eq!(snapshot.hits, 0);
        assert_eq!(snapshot.sets, 0);
        assert_eq!(snapshot.hit_rate, 0.0);
        assert!(snapshot.last_updated.is_some());
    }
}
