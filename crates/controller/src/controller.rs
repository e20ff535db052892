//! View-driven overlay and tile synchronization.
//!
//! Events mutate a [`ViewState`]. Each overlay cycle derives a [`SyncConfig`]
//! from it, diffs the desired layers against what is on screen, loads what
//! changed and publishes an [`OverlaySnapshot`], unless a newer cycle started
//! in the meantime. Tile refreshes run the same way on their own generation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use foundation::{TileIndex, ViewBounds};
use futures_util::future::join_all;
use layers::{
    BoundaryLabel, FeatureCollection, HttpOverlayService, LabelOptions, LayerToggles,
    OverlayCache, OverlayCacheKey, OverlayError, OverlayFetcher, OverlayLayerKind, OverlayMode,
    OverlayRequest, SurveyFilter, UnloadPolicy, label_features,
};
use parking_lot::Mutex;
use runtime::metrics::names;
use runtime::{Clock, CycleTracker, Debouncer, Generation, SharedMetrics};
use streaming::{
    BatchStats, CacheStats, HttpTileService, ProviderRegistry, TileDemand, TileFetcher,
    TileLoader, TileRecord,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{EngineSettings, SyncConfig};
use crate::error::SyncError;

/// Everything the user can change about the view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub mode: OverlayMode,
    pub toggles: LayerToggles,
    pub filter: SurveyFilter,
    pub container_bounds: Option<ViewBounds>,
    pub viewport: Option<ViewBounds>,
    pub zoom: u8,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Viewport { bounds: ViewBounds, zoom: u8 },
    Mode(OverlayMode),
    Layer { kind: OverlayLayerKind, on: bool },
    Filter(SurveyFilter),
    /// A parsed legal description; its survey block becomes the filter.
    Schema(serde_json::Value),
    ContainerBounds(Option<ViewBounds>),
    Provider(String),
    /// Drop cached overlays and reload everything on the next cycle.
    Refresh,
}

/// One overlay layer as currently shown (or hidden).
#[derive(Debug, Clone, PartialEq)]
pub struct LayerState {
    pub key: OverlayCacheKey,
    pub features: Arc<FeatureCollection>,
    pub labels: Vec<BoundaryLabel>,
    pub visible: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlaySnapshot {
    pub generation: Generation,
    pub mode: OverlayMode,
    pub layers: BTreeMap<OverlayLayerKind, LayerState>,
    /// Layers whose last load failed, with the reason.
    pub errors: BTreeMap<OverlayLayerKind, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileSnapshot {
    pub generation: Generation,
    pub provider: String,
    pub zoom: u8,
    /// Fetch order, center first.
    pub records: Vec<TileRecord>,
    pub stats: BatchStats,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome<T> {
    /// Nothing relevant changed since the last applied cycle.
    Skipped,
    /// A newer cycle started before this one finished; its results were
    /// discarded.
    Superseded,
    Applied(T),
}

impl<T> CycleOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, CycleOutcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            CycleOutcome::Applied(v) => Some(v),
            _ => None,
        }
    }
}

/// What an applied overlay cycle did, per layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub generation: Generation,
    pub fetched: BTreeSet<OverlayLayerKind>,
    pub from_cache: BTreeSet<OverlayLayerKind>,
    /// Already loaded for the same key.
    pub kept: BTreeSet<OverlayLayerKind>,
    pub hidden: BTreeSet<OverlayLayerKind>,
    pub removed: BTreeSet<OverlayLayerKind>,
    pub failed: BTreeMap<OverlayLayerKind, String>,
}

/// Injected collaborators.
pub struct Collaborators {
    pub overlays: Arc<dyn OverlayFetcher>,
    pub tiles: Arc<dyn TileFetcher>,
    pub registry: ProviderRegistry,
    pub clock: Arc<dyn Clock>,
    pub metrics: SharedMetrics,
}

impl Collaborators {
    /// HTTP clients for the tile and overlay services under
    /// `settings.api_base`, with the provider table fetched from the tile
    /// service (or the built-in table when that fails).
    pub async fn connect(settings: &EngineSettings, clock: Arc<dyn Clock>) -> Self {
        let tiles = Arc::new(HttpTileService::new(settings.api_base.clone()));
        let overlays = Arc::new(HttpOverlayService::new(settings.api_base.clone()));
        let registry = ProviderRegistry::load(&*tiles).await;
        info!(api_base = %settings.api_base, providers = registry.len(), "collaborators ready");
        Self {
            overlays,
            tiles,
            registry,
            clock,
            metrics: SharedMetrics::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Applied {
    baseline: Option<SyncConfig>,
    layers: BTreeMap<OverlayLayerKind, LayerState>,
    errors: BTreeMap<OverlayLayerKind, String>,
    force_reload: bool,
}

struct LayerLoad {
    key: OverlayCacheKey,
    features: Arc<FeatureCollection>,
    from_cache: bool,
}

pub struct OverlaySyncController {
    settings: EngineSettings,
    overlays: Arc<dyn OverlayFetcher>,
    loader: TileLoader,
    registry: ProviderRegistry,
    metrics: SharedMetrics,
    cache: Mutex<OverlayCache>,
    overlay_cycles: CycleTracker,
    tile_cycles: CycleTracker,
    view: Mutex<ViewState>,
    applied: Mutex<Applied>,
    requested_tiles: Mutex<Option<(String, Vec<TileIndex>)>>,
    overlay_tx: watch::Sender<OverlaySnapshot>,
    tile_tx: watch::Sender<TileSnapshot>,
}

impl OverlaySyncController {
    pub fn new(settings: EngineSettings, deps: Collaborators) -> Self {
        let loader =
            TileLoader::with_metrics(deps.tiles, settings.loader.clone(), deps.metrics.clone());
        let cache = OverlayCache::new(settings.cache, deps.clock);
        let view = ViewState {
            mode: OverlayMode::default(),
            toggles: LayerToggles::new(),
            filter: SurveyFilter::default(),
            container_bounds: None,
            viewport: None,
            zoom: 0,
            provider: settings.tile_provider.clone(),
        };
        let (overlay_tx, _) = watch::channel(OverlaySnapshot::default());
        let (tile_tx, _) = watch::channel(TileSnapshot::default());
        Self {
            settings,
            overlays: deps.overlays,
            loader,
            registry: deps.registry,
            metrics: deps.metrics,
            cache: Mutex::new(cache),
            overlay_cycles: CycleTracker::new(),
            tile_cycles: CycleTracker::new(),
            view: Mutex::new(view),
            applied: Mutex::new(Applied::default()),
            requested_tiles: Mutex::new(None),
            overlay_tx,
            tile_tx,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn view(&self) -> ViewState {
        self.view.lock().clone()
    }

    pub fn subscribe_overlays(&self) -> watch::Receiver<OverlaySnapshot> {
        self.overlay_tx.subscribe()
    }

    pub fn subscribe_tiles(&self) -> watch::Receiver<TileSnapshot> {
        self.tile_tx.subscribe()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    /// Fold one event into the view state. Returns whether anything changed.
    pub fn apply_event(&self, event: SyncEvent) -> bool {
        let mut view = self.view.lock();
        let before = view.clone();
        match event {
            SyncEvent::Viewport { bounds, zoom } => {
                view.viewport = Some(bounds);
                view.zoom = zoom;
            }
            SyncEvent::Mode(mode) => view.mode = mode,
            SyncEvent::Layer { kind, on } => view.toggles.set(kind, on),
            SyncEvent::Filter(filter) => view.filter = filter,
            SyncEvent::Schema(schema) => {
                view.filter = SurveyFilter::from_schema(&schema).unwrap_or_default();
            }
            SyncEvent::ContainerBounds(bounds) => view.container_bounds = bounds,
            SyncEvent::Provider(id) => view.provider = id,
            SyncEvent::Refresh => {
                drop(view);
                self.cache.lock().clear();
                {
                    let mut applied = self.applied.lock();
                    applied.baseline = None;
                    applied.force_reload = true;
                }
                *self.requested_tiles.lock() = None;
                debug!("refresh requested");
                return true;
            }
        }
        if view.mode != before.mode {
            debug!(mode = view.mode.as_str(), "overlay mode switched");
        }
        *view != before
    }

    /// The configuration an overlay cycle started now would load.
    pub fn desired_config(&self) -> SyncConfig {
        let view = self.view.lock();
        let bounds = match view.mode {
            OverlayMode::Container => view.container_bounds,
            OverlayMode::Regional => view.viewport,
        };
        SyncConfig {
            mode: view.mode,
            layers: view.toggles.desired(),
            filter: view.filter.clone(),
            bounds,
        }
    }

    /// Bring the overlay layers in line with the current view.
    pub async fn run_cycle(&self) -> CycleOutcome<CycleReport> {
        let config = self.desired_config();
        let viewport = self.view.lock().viewport;

        {
            let applied = self.applied.lock();
            let unchanged = !applied.force_reload
                && applied
                    .baseline
                    .as_ref()
                    .is_some_and(|b| config.equivalent_to(b, self.settings.cache.min_coverage));
            if unchanged {
                // Whatever is still loading was started for a view the user
                // has since left.
                self.overlay_cycles.cancel_current();
                self.metrics.inc(names::CYCLES_SKIPPED, 1);
                trace!("overlay cycle skipped");
                return CycleOutcome::Skipped;
            }
        }

        let cycle = self.overlay_cycles.begin();
        let mut report = CycleReport {
            generation: cycle.generation,
            ..CycleReport::default()
        };

        let policy = self.settings.unload_policy_for(config.mode);
        let mut to_load = Vec::new();
        {
            let applied = self.applied.lock();
            for &kind in &config.layers {
                let key = config
                    .bounds
                    .map(|b| OverlayCacheKey::new(kind, config.mode, &b, &config.filter));
                match (applied.layers.get(&kind), &key) {
                    (Some(active), Some(key)) if !applied.force_reload && active.key == *key => {
                        report.kept.insert(kind);
                    }
                    _ => to_load.push((kind, key)),
                }
            }
            for (kind, layer) in &applied.layers {
                if config.layers.contains(kind) {
                    continue;
                }
                match policy {
                    UnloadPolicy::Teardown => {
                        report.removed.insert(*kind);
                    }
                    UnloadPolicy::HideRetain if layer.visible => {
                        report.hidden.insert(*kind);
                    }
                    UnloadPolicy::HideRetain => {}
                }
            }
        }

        debug!(
            generation = %cycle.generation,
            mode = config.mode.as_str(),
            load = to_load.len(),
            kept = report.kept.len(),
            "overlay cycle started"
        );

        let loads = to_load.into_iter().map(|(kind, key)| {
            let config = &config;
            let token = &cycle.token;
            async move { (kind, self.load_layer(kind, key, config, token).await) }
        });
        let results = join_all(loads).await;

        let snapshot = {
            let mut applied = self.applied.lock();
            if !self.overlay_cycles.is_current(cycle.generation) || cycle.is_cancelled() {
                self.metrics.inc(names::CYCLES_SUPERSEDED, 1);
                debug!(generation = %cycle.generation, "overlay cycle superseded");
                return CycleOutcome::Superseded;
            }

            for kind in &report.removed {
                applied.layers.remove(kind);
            }
            for kind in &report.hidden {
                if let Some(layer) = applied.layers.get_mut(kind) {
                    layer.visible = false;
                }
            }
            for kind in &report.kept {
                if let Some(layer) = applied.layers.get_mut(kind) {
                    layer.visible = true;
                }
            }
            applied.errors.retain(|kind, _| config.layers.contains(kind));
            for kind in &report.kept {
                applied.errors.remove(kind);
            }

            for (kind, result) in results {
                match result {
                    Ok(load) => {
                        if load.from_cache {
                            report.from_cache.insert(kind);
                        } else {
                            report.fetched.insert(kind);
                        }
                        applied.errors.remove(&kind);
                        applied.layers.insert(
                            kind,
                            LayerState {
                                key: load.key,
                                features: load.features,
                                labels: Vec::new(),
                                visible: true,
                            },
                        );
                    }
                    Err(OverlayError::Cancelled) => {}
                    Err(e) => {
                        self.metrics.inc(names::OVERLAY_FETCH_FAILED, 1);
                        warn!(layer = %kind, error = %e, "overlay layer failed to load");
                        report.failed.insert(kind, e.to_string());
                        applied.errors.insert(kind, e.to_string());
                    }
                }
            }

            let options = LabelOptions {
                per_line: self.settings.labels_per_line,
                viewport,
            };
            let mut features = 0usize;
            for (kind, layer) in applied.layers.iter_mut() {
                layer.labels = if layer.visible {
                    features += layer.features.len();
                    label_features(&layer.features, *kind, &options)
                } else {
                    Vec::new()
                };
            }
            self.metrics.record(names::OVERLAY_FEATURES, features as i64);

            // A failed layer must be retried by the next cycle even if the
            // view does not change.
            applied.baseline = report.failed.is_empty().then(|| config.clone());
            applied.force_reload = false;

            OverlaySnapshot {
                generation: cycle.generation,
                mode: config.mode,
                layers: applied.layers.clone(),
                errors: applied.errors.clone(),
            }
        };

        self.overlay_tx.send_replace(snapshot);
        self.metrics.inc(names::CYCLES_APPLIED, 1);
        info!(
            generation = %cycle.generation,
            fetched = report.fetched.len(),
            cached = report.from_cache.len(),
            failed = report.failed.len(),
            "overlay cycle applied"
        );
        CycleOutcome::Applied(report)
    }

    async fn load_layer(
        &self,
        kind: OverlayLayerKind,
        key: Option<OverlayCacheKey>,
        config: &SyncConfig,
        cancel: &CancellationToken,
    ) -> Result<LayerLoad, OverlayError> {
        let (Some(key), Some(bounds)) = (key, config.bounds) else {
            return Err(OverlayError::MissingBounds);
        };

        let cached = self.cache.lock().lookup(&key, &bounds);
        match cached {
            Ok(entry) => {
                self.metrics.inc(names::OVERLAY_CACHE_HITS, 1);
                return Ok(LayerLoad {
                    key,
                    features: entry.value,
                    from_cache: true,
                });
            }
            Err(miss) => {
                self.metrics.inc(names::OVERLAY_CACHE_MISSES, 1);
                trace!(layer = %kind, ?miss, "overlay cache miss");
            }
        }

        let request = OverlayRequest {
            layer: kind,
            mode: config.mode,
            state: self.settings.plss_state.clone(),
            bounds,
            filter: config.filter.clone(),
        };
        let features = self.fetch_overlay(&request, cancel).await?;

        let (evicted, entries) = {
            let mut cache = self.cache.lock();
            let evicted = cache.put(key.clone(), features.clone(), bounds);
            (evicted.len(), cache.len())
        };
        self.metrics.inc(names::OVERLAY_CACHE_EVICTIONS, evicted as u64);
        self.metrics.set_gauge(names::CACHED_ENTRIES, entries as i64);

        Ok(LayerLoad {
            key,
            features,
            from_cache: false,
        })
    }

    async fn fetch_overlay(
        &self,
        request: &OverlayRequest,
        cancel: &CancellationToken,
    ) -> Result<Arc<FeatureCollection>, OverlayError> {
        let ms = self.settings.overlay_timeout_ms;
        tokio::select! {
            _ = cancel.cancelled() => Err(OverlayError::Cancelled),
            r = tokio::time::timeout(Duration::from_millis(ms), self.overlays.fetch_overlay(request)) => {
                match r {
                    Ok(result) => result.map(Arc::new),
                    Err(_) => Err(OverlayError::Timeout { ms }),
                }
            }
        }
    }

    /// Load the tiles the current viewport needs, center first.
    ///
    /// Skipped when there is no viewport or the same tile set was already
    /// requested from the same provider.
    pub async fn refresh_tiles(&self) -> CycleOutcome<BatchStats> {
        let (viewport, zoom, provider_id) = {
            let view = self.view.lock();
            (view.viewport, view.zoom, view.provider.clone())
        };
        let Some(bounds) = viewport else {
            return CycleOutcome::Skipped;
        };
        let provider = self.registry.resolve(&provider_id);
        let demand = TileDemand::compute(&bounds, zoom, provider);

        let key = (provider.id.clone(), demand.tiles.clone());
        {
            let mut requested = self.requested_tiles.lock();
            if requested.as_ref() == Some(&key) {
                trace!(tiles = demand.len(), "tile set unchanged");
                return CycleOutcome::Skipped;
            }
            *requested = Some(key.clone());
        }

        let cycle = self.tile_cycles.begin();
        let batch = self
            .loader
            .load_batch(&demand.prioritized(), provider, &cycle.token)
            .await;
        if !self.tile_cycles.is_current(cycle.generation) {
            debug!(generation = %cycle.generation, "tile refresh superseded");
            return CycleOutcome::Superseded;
        }

        let stats = batch.stats;
        if stats.failed > 0 {
            let mut requested = self.requested_tiles.lock();
            if requested.as_ref() == Some(&key) {
                *requested = None;
            }
        }
        self.tile_tx.send_replace(TileSnapshot {
            generation: cycle.generation,
            provider: provider.id.clone(),
            zoom: demand.zoom,
            records: batch.records,
            stats,
        });
        CycleOutcome::Applied(stats)
    }

    /// Run the controller as a task: events are debounced, folded into the
    /// view state, and each quiet period starts an overlay cycle and a tile
    /// refresh. A cycle still running when the next one starts is cancelled.
    pub fn spawn(self: Arc<Self>) -> (SyncHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SyncHandle {
            tx,
            overlays: self.subscribe_overlays(),
            tiles: self.subscribe_tiles(),
        };
        let window = Duration::from_millis(self.settings.debounce_ms);

        let task = tokio::spawn(async move {
            let mut debouncer = Debouncer::new(rx, window);
            while let Some(batch) = debouncer.next_batch().await {
                let events = batch.len();
                let mut changed = false;
                for event in batch {
                    changed |= self.apply_event(event);
                }
                if !changed {
                    trace!(events, "events left the view unchanged");
                    continue;
                }
                debug!(events, "view events coalesced");
                let controller = self.clone();
                tokio::spawn(async move {
                    tokio::join!(controller.run_cycle(), controller.refresh_tiles());
                });
            }
            debug!("sync event channel closed");
        });
        (handle, task)
    }
}

/// Sending side of a spawned controller plus its snapshot feeds.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncEvent>,
    overlays: watch::Receiver<OverlaySnapshot>,
    tiles: watch::Receiver<TileSnapshot>,
}

impl SyncHandle {
    pub fn send(&self, event: SyncEvent) -> Result<(), SyncError> {
        self.tx.send(event).map_err(|_| SyncError::ChannelClosed)
    }

    pub fn overlays(&self) -> watch::Receiver<OverlaySnapshot> {
        self.overlays.clone()
    }

    pub fn tiles(&self) -> watch::Receiver<TileSnapshot> {
        self.tiles.clone()
    }
}
