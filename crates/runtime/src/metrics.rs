//! Diagnostic counters for the tile loader, overlay cache and sync cycles.
//!
//! Everything is keyed by `'static` names from [`names`] and kept in sorted
//! maps, so two snapshots of the same activity compare equal.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

pub mod names {
    pub const TILES_REQUESTED: &str = "tiles.requested";
    pub const TILES_FROM_CACHE: &str = "tiles.loaded.cache";
    pub const TILES_FROM_REMOTE: &str = "tiles.loaded.remote";
    pub const TILES_REDIRECTED: &str = "tiles.loaded.redirect";
    pub const TILES_FAILED: &str = "tiles.failed";
    pub const TILES_CANCELLED: &str = "tiles.cancelled";
    pub const TILES_RETRIED: &str = "tiles.retried";
    pub const TILE_BATCH_SIZE: &str = "tiles.batch_size";
    pub const OVERLAY_CACHE_HITS: &str = "overlay.cache.hit";
    pub const OVERLAY_CACHE_MISSES: &str = "overlay.cache.miss";
    pub const OVERLAY_CACHE_EVICTIONS: &str = "overlay.cache.evicted";
    pub const OVERLAY_FETCH_FAILED: &str = "overlay.fetch.failed";
    pub const OVERLAY_FEATURES: &str = "overlay.features";
    pub const CYCLES_APPLIED: &str = "sync.cycles.applied";
    pub const CYCLES_SKIPPED: &str = "sync.cycles.skipped";
    pub const CYCLES_SUPERSEDED: &str = "sync.cycles.superseded";
    pub const CACHED_ENTRIES: &str = "overlay.cache.entries";
}

/// Running summary of recorded samples.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Histogram {
    pub count: u64,
    pub sum: i64,
    pub min: i64,
    pub max: i64,
}

impl Histogram {
    pub fn record(&mut self, value: i64) {
        let first = self.count == 0;
        self.min = if first { value } else { self.min.min(value) };
        self.max = if first { value } else { self.max.max(value) };
        self.count += 1;
        self.sum = self.sum.saturating_add(value);
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum as f64 / self.count as f64)
    }
}

/// Point-in-time copy of every metric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<&'static str, u64>,
    pub gauges: BTreeMap<&'static str, i64>,
    pub histograms: BTreeMap<&'static str, Histogram>,
}

impl MetricsSnapshot {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

/// Cloneable handle to one metrics registry.
///
/// The loader and the controller run on different tasks; every call takes the
/// lock for the duration of one update only.
#[derive(Debug, Default, Clone)]
pub struct SharedMetrics {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl SharedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `by` to a counter. Zero increments do not create the counter.
    pub fn inc(&self, name: &'static str, by: u64) {
        if by > 0 {
            *self.inner.lock().counters.entry(name).or_insert(0) += by;
        }
    }

    pub fn set_gauge(&self, name: &'static str, value: i64) {
        self.inner.lock().gauges.insert(name, value);
    }

    pub fn record(&self, name: &'static str, value: i64) {
        self.inner
            .lock()
            .histograms
            .entry(name)
            .or_default()
            .record(value);
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.inner.lock().counter(name)
    }

    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.inner.lock().gauges.get(name).copied()
    }

    pub fn histogram(&self, name: &str) -> Option<Histogram> {
        self.inner.lock().histograms.get(name).copied()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().clone()
    }

    pub fn reset(&self) {
        *self.inner.lock() = MetricsSnapshot::default();
    }
}

#[cfg(test)]
mod tests {
    use super::{Histogram, SharedMetrics, names};

    #[test]
    fn histogram_summarizes_batch_sizes() {
        let mut h = Histogram::default();
        assert_eq!(h.mean(), None);
        for size in [64, 9, 25] {
            h.record(size);
        }
        assert_eq!((h.count, h.sum, h.min, h.max), (3, 98, 9, 64));
        assert!((h.mean().unwrap() - 98.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn handles_share_one_registry() {
        let loader = SharedMetrics::new();
        let controller = loader.clone();
        loader.inc(names::TILES_FROM_CACHE, 2);
        controller.inc(names::TILES_FROM_CACHE, 1);
        controller.inc(names::TILES_FAILED, 0);
        controller.set_gauge(names::CACHED_ENTRIES, 4);
        controller.set_gauge(names::CACHED_ENTRIES, 3);
        loader.record(names::TILE_BATCH_SIZE, 64);

        assert_eq!(loader.counter(names::TILES_FROM_CACHE), 3);
        assert_eq!(loader.gauge(names::CACHED_ENTRIES), Some(3));
        assert_eq!(loader.histogram(names::TILE_BATCH_SIZE).map(|h| h.max), Some(64));

        let snap = controller.snapshot();
        assert_eq!(
            snap.counters.keys().copied().collect::<Vec<_>>(),
            vec![names::TILES_FROM_CACHE]
        );
        assert_eq!(snap.counter(names::TILES_FAILED), 0);
    }

    #[test]
    fn snapshots_are_order_independent() {
        let a = SharedMetrics::new();
        a.inc(names::CYCLES_SKIPPED, 1);
        a.inc(names::CYCLES_APPLIED, 1);
        let b = SharedMetrics::new();
        b.inc(names::CYCLES_APPLIED, 1);
        b.inc(names::CYCLES_SKIPPED, 1);
        assert_eq!(a.snapshot(), b.snapshot());

        a.reset();
        assert_eq!(a.counter(names::CYCLES_APPLIED), 0);
    }
}
