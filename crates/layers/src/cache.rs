//! Cache keys for fetched overlay layers.

use std::sync::Arc;

use foundation::ViewBounds;
use foundation::math::quantize;
use serde::{Deserialize, Serialize};
use streaming::BoundsCache;

use crate::feature::FeatureCollection;
use crate::overlay::{OverlayLayerKind, OverlayMode, SurveyFilter};

/// Decimal places kept when bounds become part of a key.
pub const KEY_DECIMALS: u32 = 3;

/// Bounds rounded to [`KEY_DECIMALS`] and stored as integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuantizedBounds {
    pub min_lat: i64,
    pub max_lat: i64,
    pub min_lon: i64,
    pub max_lon: i64,
}

impl QuantizedBounds {
    pub fn new(b: &ViewBounds) -> Self {
        Self {
            min_lat: quantize(b.min_lat, KEY_DECIMALS),
            max_lat: quantize(b.max_lat, KEY_DECIMALS),
            min_lon: quantize(b.min_lon, KEY_DECIMALS),
            max_lon: quantize(b.max_lon, KEY_DECIMALS),
        }
    }
}

impl From<&ViewBounds> for QuantizedBounds {
    fn from(b: &ViewBounds) -> Self {
        Self::new(b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OverlayCacheKey {
    pub layer: OverlayLayerKind,
    pub mode: OverlayMode,
    pub bounds: QuantizedBounds,
    pub filter: SurveyFilter,
}

impl OverlayCacheKey {
    pub fn new(
        layer: OverlayLayerKind,
        mode: OverlayMode,
        bounds: &ViewBounds,
        filter: &SurveyFilter,
    ) -> Self {
        Self {
            layer,
            mode,
            bounds: QuantizedBounds::new(bounds),
            filter: filter.clone(),
        }
    }
}

pub type OverlayCache = BoundsCache<OverlayCacheKey, Arc<FeatureCollection>>;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use foundation::ViewBounds;
    use runtime::ManualClock;
    use streaming::{CacheConfig, CacheMiss};

    use super::{OverlayCache, OverlayCacheKey};
    use crate::feature::FeatureCollection;
    use crate::overlay::{OverlayLayerKind as K, OverlayMode, SurveyFilter};

    #[test]
    fn nearby_bounds_share_a_key() {
        let f = SurveyFilter::default();
        let a = OverlayCacheKey::new(
            K::Grid,
            OverlayMode::Regional,
            &ViewBounds::new(41.30001, 41.4, -105.6, -105.5),
            &f,
        );
        let b = OverlayCacheKey::new(
            K::Grid,
            OverlayMode::Regional,
            &ViewBounds::new(41.29999, 41.4, -105.6, -105.5),
            &f,
        );
        assert_eq!(a, b);
        assert_eq!(a.bounds.min_lat, 41_300);

        let c = OverlayCacheKey::new(
            K::Grid,
            OverlayMode::Container,
            &ViewBounds::new(41.3, 41.4, -105.6, -105.5),
            &f,
        );
        assert_ne!(a, c);
    }

    #[test]
    fn layers_are_cached_independently() {
        let clock = Arc::new(ManualClock::new(0));
        let mut cache = OverlayCache::new(CacheConfig::default(), clock);
        let view = ViewBounds::new(41.0, 42.0, -106.0, -105.0);
        let f = SurveyFilter::default();
        let grid = OverlayCacheKey::new(K::Grid, OverlayMode::Regional, &view, &f);
        let sections = OverlayCacheKey::new(K::Sections, OverlayMode::Regional, &view, &f);

        cache.put(grid.clone(), Arc::new(FeatureCollection::default()), view);
        assert!(cache.get(&grid, &view).is_some());
        assert_eq!(cache.lookup(&sections, &view), Err(CacheMiss::Absent));
    }
}
