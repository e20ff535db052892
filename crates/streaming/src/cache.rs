use std::collections::BTreeMap;
use std::sync::Arc;

use foundation::ViewBounds;
use runtime::Clock;
use serde::{Deserialize, Serialize};

/// Knobs for [`BoundsCache`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Entries at least this old are stale.
    pub max_age_ms: u64,
    /// Minimum fraction of the requested area the cached bounds must cover.
    pub min_coverage: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10,
            max_age_ms: 5 * 60 * 1000,
            min_coverage: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub timestamp_ms: u64,
    /// Bounds the value was fetched for.
    pub bounds: ViewBounds,
}

/// Why a lookup did not produce a usable entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheMiss {
    Absent,
    /// The entry was too old and has been dropped.
    Stale { age_ms: u64 },
    /// The entry covers too little of the requested area. It is kept.
    InsufficientOverlap { coverage: f64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// Capacity-bounded cache of values fetched for a geographic extent.
///
/// An entry is only served while it is fresh and its bounds cover enough of
/// the requested area. Notes on determinism:
/// - Entries are keyed in a `BTreeMap` for stable traversal order.
/// - Eviction removes the oldest timestamp first, with a tie-break by key
///   ordering.
pub struct BoundsCache<K, V> {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    entries: BTreeMap<K, CacheEntry<V>>,
    stats: CacheStats,
}

impl<K: std::fmt::Debug, V> std::fmt::Debug for BoundsCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundsCache")
            .field("config", &self.config)
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<K, V> BoundsCache<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: BTreeMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Look `key` up for `requested` bounds, reporting why a miss happened.
    pub fn lookup(&mut self, key: &K, requested: &ViewBounds) -> Result<CacheEntry<V>, CacheMiss> {
        let outcome = self.check(key, requested);
        match &outcome {
            Ok(_) => self.stats.hits += 1,
            Err(miss) => {
                self.stats.misses += 1;
                if let CacheMiss::Stale { .. } = miss {
                    self.entries.remove(key);
                }
            }
        }
        outcome
    }

    pub fn get(&mut self, key: &K, requested: &ViewBounds) -> Option<CacheEntry<V>> {
        self.lookup(key, requested).ok()
    }

    fn check(&self, key: &K, requested: &ViewBounds) -> Result<CacheEntry<V>, CacheMiss> {
        let entry = self.entries.get(key).ok_or(CacheMiss::Absent)?;
        let age_ms = self.clock.now_ms().saturating_sub(entry.timestamp_ms);
        if age_ms >= self.config.max_age_ms {
            return Err(CacheMiss::Stale { age_ms });
        }
        let coverage = requested.coverage_by(&entry.bounds);
        if coverage.is_nan() || coverage < self.config.min_coverage || coverage <= 0.0 {
            return Err(CacheMiss::InsufficientOverlap { coverage });
        }
        Ok(entry.clone())
    }

    /// Store `value`, returning the keys evicted to make room.
    pub fn put(&mut self, key: K, value: V, bounds: ViewBounds) -> Vec<K> {
        if self.config.max_entries == 0 {
            return Vec::new();
        }
        let entry = CacheEntry {
            value,
            timestamp_ms: self.clock.now_ms(),
            bounds,
        };
        self.entries.insert(key.clone(), entry);
        let evicted = self.evict_as_needed(&key);
        self.stats.entries = self.entries.len();
        evicted
    }

    fn evict_as_needed(&mut self, protected: &K) -> Vec<K> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.config.max_entries {
            let candidate = self
                .entries
                .iter()
                .filter(|(k, _)| *k != protected)
                .min_by(|(ka, ea), (kb, eb)| {
                    ea.timestamp_ms
                        .cmp(&eb.timestamp_ms)
                        .then_with(|| ka.cmp(kb))
                })
                .map(|(k, _)| k.clone());
            let Some(key) = candidate else {
                break;
            };
            self.entries.remove(&key);
            self.stats.evictions += 1;
            evicted.push(key);
        }
        evicted
    }

    pub fn invalidate(&mut self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        self.stats.entries = self.entries.len();
        removed
    }

    /// Drop every entry that is already stale.
    pub fn prune_stale(&mut self) -> Vec<K> {
        let now = self.clock.now_ms();
        let max_age = self.config.max_age_ms;
        let stale: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, e)| now.saturating_sub(e.timestamp_ms) >= max_age)
            .map(|(k, _)| k.clone())
            .collect();
        for k in &stale {
            self.entries.remove(k);
        }
        self.stats.entries = self.entries.len();
        stale
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats.entries = 0;
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }
}
