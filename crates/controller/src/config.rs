//! Engine settings and the per-cycle sync configuration.

use std::collections::BTreeSet;
use std::env;
use std::str::FromStr;

use foundation::ViewBounds;
use layers::{OverlayLayerKind, OverlayMode, SurveyFilter, UnloadPolicy};
use serde::{Deserialize, Serialize};
use streaming::{CacheConfig, DEFAULT_PROVIDER, LoaderConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Base URL of the tile and overlay services.
    pub api_base: String,
    /// State whose survey data overlays are drawn from.
    pub plss_state: String,
    pub tile_provider: String,
    pub debounce_ms: u64,
    /// Ceiling for one overlay request.
    pub overlay_timeout_ms: u64,
    pub labels_per_line: usize,
    /// Overrides the mode's default unload behavior.
    pub unload_policy: Option<UnloadPolicy>,
    pub loader: LoaderConfig,
    pub cache: CacheConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/api".to_string(),
            plss_state: "Wyoming".to_string(),
            tile_provider: DEFAULT_PROVIDER.to_string(),
            debounce_ms: 500,
            overlay_timeout_ms: 30_000,
            labels_per_line: 3,
            unload_policy: None,
            loader: LoaderConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from `lookup`; unset or unparsable values keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();

        Self {
            api_base: lookup("PARCEL_API_BASE").unwrap_or(d.api_base),
            plss_state: lookup("PARCEL_PLSS_STATE").unwrap_or(d.plss_state),
            tile_provider: lookup("PARCEL_TILE_PROVIDER").unwrap_or(d.tile_provider),
            debounce_ms: var_or(&lookup, "PARCEL_DEBOUNCE_MS", d.debounce_ms),
            overlay_timeout_ms: d.overlay_timeout_ms,
            labels_per_line: var_or(&lookup, "PARCEL_LABELS_PER_LINE", d.labels_per_line),
            unload_policy: None,
            loader: LoaderConfig {
                concurrency: var_or(&lookup, "PARCEL_TILE_CONCURRENCY", d.loader.concurrency),
                max_batch: var_or(&lookup, "PARCEL_TILE_BATCH_CAP", d.loader.max_batch),
                ..d.loader
            },
            cache: CacheConfig {
                max_entries: var_or(&lookup, "PARCEL_CACHE_ENTRIES", d.cache.max_entries),
                max_age_ms: var_or(&lookup, "PARCEL_CACHE_MAX_AGE_MS", d.cache.max_age_ms),
                ..d.cache
            },
        }
    }

    pub fn unload_policy_for(&self, mode: OverlayMode) -> UnloadPolicy {
        self.unload_policy
            .unwrap_or_else(|| UnloadPolicy::default_for(mode))
    }
}

/// Parse `key` from `lookup`, falling back to `default`.
fn var_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// What one overlay cycle is asked to show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub mode: OverlayMode,
    /// Desired layers, after grid collapse.
    pub layers: BTreeSet<OverlayLayerKind>,
    pub filter: SurveyFilter,
    /// Viewport in regional mode, container bounds in container mode.
    pub bounds: Option<ViewBounds>,
}

impl SyncConfig {
    /// Same request modulo small bound changes: everything but the bounds is
    /// equal and the new bounds are covered by the old ones to at least
    /// `min_overlap`.
    pub fn equivalent_to(&self, previous: &SyncConfig, min_overlap: f64) -> bool {
        if self.mode != previous.mode
            || self.layers != previous.layers
            || self.filter != previous.filter
        {
            return false;
        }
        match (&self.bounds, &previous.bounds) {
            (None, None) => true,
            (Some(now), Some(before)) => {
                now == before || now.coverage_by(before) >= min_overlap
            }
            _ => false,
        }
    }
}
