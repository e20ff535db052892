//! Bounded-concurrency tile loading with retry, timeout and cancellation.

use std::sync::Arc;
use std::time::Duration;

use foundation::TileIndex;
use futures_util::future::join_all;
use runtime::SharedMetrics;
use runtime::metrics::names;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::TileError;
use crate::provider::TileProvider;
use crate::source::{TileFetcher, TilePayload};
use crate::tile::{TileRecord, TileSourceKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Tiles past this position in one call are not requested.
    pub max_batch: usize,
    /// Tiles fetched together per chunk.
    pub concurrency: usize,
    /// Wait before each retry; its length is the retry count.
    pub retry_backoff_ms: Vec<u64>,
    /// Ceiling for one request attempt.
    pub request_timeout_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_batch: 64,
            concurrency: 8,
            retry_backoff_ms: vec![250, 500],
            request_timeout_ms: 10_000,
        }
    }
}

/// Outcome counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub requested: usize,
    pub from_cache: usize,
    pub from_remote: usize,
    pub redirected: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub retries: usize,
}

impl BatchStats {
    fn tally(records: &[TileRecord]) -> Self {
        let mut s = BatchStats {
            requested: records.len(),
            ..Default::default()
        };
        for r in records {
            s.retries += r.attempts.saturating_sub(1) as usize;
            match (&r.error, r.source) {
                (Some(TileError::Cancelled), _) => s.cancelled += 1,
                (Some(_), _) => s.failed += 1,
                (None, Some(TileSourceKind::Cache)) => s.from_cache += 1,
                (None, Some(TileSourceKind::Remote)) => s.from_remote += 1,
                (None, Some(TileSourceKind::DirectRedirect)) => s.redirected += 1,
                (None, None) => {}
            }
        }
        s
    }

    pub fn loaded(&self) -> usize {
        self.from_cache + self.from_remote + self.redirected
    }

    fn record(&self, metrics: &SharedMetrics) {
        metrics.inc(names::TILES_REQUESTED, self.requested as u64);
        metrics.inc(names::TILES_FROM_CACHE, self.from_cache as u64);
        metrics.inc(names::TILES_FROM_REMOTE, self.from_remote as u64);
        metrics.inc(names::TILES_REDIRECTED, self.redirected as u64);
        metrics.inc(names::TILES_FAILED, self.failed as u64);
        metrics.inc(names::TILES_CANCELLED, self.cancelled as u64);
        metrics.inc(names::TILES_RETRIED, self.retries as u64);
        metrics.record(names::TILE_BATCH_SIZE, self.requested as i64);
    }
}

/// Records in input order plus their tally.
#[derive(Debug, Clone, PartialEq)]
pub struct TileBatch {
    pub records: Vec<TileRecord>,
    pub stats: BatchStats,
}

pub struct TileLoader {
    fetcher: Arc<dyn TileFetcher>,
    config: LoaderConfig,
    metrics: SharedMetrics,
}

impl TileLoader {
    pub fn new(fetcher: Arc<dyn TileFetcher>, config: LoaderConfig) -> Self {
        Self::with_metrics(fetcher, config, SharedMetrics::new())
    }

    pub fn with_metrics(
        fetcher: Arc<dyn TileFetcher>,
        config: LoaderConfig,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            fetcher,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// One record per input index, same order.
    pub async fn load_tiles(
        &self,
        indices: &[TileIndex],
        provider: &TileProvider,
        cancel: &CancellationToken,
    ) -> Vec<TileRecord> {
        self.load_batch(indices, provider, cancel).await.records
    }

    pub async fn load_batch(
        &self,
        indices: &[TileIndex],
        provider: &TileProvider,
        cancel: &CancellationToken,
    ) -> TileBatch {
        let mut records: Vec<TileRecord> = indices
            .iter()
            .map(|&i| TileRecord::loading(i, provider.id.clone()))
            .collect();

        let cap = self.config.max_batch;
        let mut pending = Vec::new();
        for (pos, record) in records.iter_mut().enumerate() {
            let index = record.index;
            if pos >= cap {
                *record = record.clone().failed(TileError::BatchOverflow { cap }, 0);
            } else if !provider.supports_zoom(index.z) {
                let err = TileError::InvalidZoom {
                    z: index.z,
                    min: provider.min_zoom,
                    max: provider.max_zoom,
                };
                *record = record.clone().failed(err, 0);
            } else if !index.is_valid() {
                *record = record.clone().failed(TileError::InvalidIndex { index }, 0);
            } else {
                pending.push(pos);
            }
        }
        if indices.len() > cap {
            debug!(requested = indices.len(), cap, "tile batch truncated");
        }

        for chunk in pending.chunks(self.config.concurrency.max(1)) {
            if cancel.is_cancelled() {
                break;
            }
            let jobs: Vec<(usize, TileIndex)> =
                chunk.iter().map(|&pos| (pos, records[pos].index)).collect();
            let fetches = jobs.into_iter().map(|(pos, index)| async move {
                (pos, self.fetch_with_retry(index, &provider.id, cancel).await)
            });
            let outcomes = join_all(fetches).await;
            for (pos, outcome) in outcomes {
                let record = records[pos].clone();
                records[pos] = match outcome {
                    Ok((payload, attempts)) => {
                        record.loaded(payload.content, payload.source, attempts)
                    }
                    Err((error, attempts)) => record.failed(error, attempts),
                };
            }
        }

        for record in records.iter_mut().filter(|r| r.loading) {
            *record = record.clone().failed(TileError::Cancelled, 0);
        }

        let stats = BatchStats::tally(&records);
        stats.record(&self.metrics);
        debug!(
            provider = %provider.id,
            requested = stats.requested,
            loaded = stats.loaded(),
            failed = stats.failed,
            cancelled = stats.cancelled,
            "tile batch finished"
        );
        TileBatch { records, stats }
    }

    async fn fetch_with_retry(
        &self,
        index: TileIndex,
        provider: &str,
        cancel: &CancellationToken,
    ) -> Result<(TilePayload, u32), (TileError, u32)> {
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        let max_attempts = self.config.retry_backoff_ms.len() as u32 + 1;
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err((TileError::Cancelled, attempt));
            }
            attempt += 1;

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err((TileError::Cancelled, attempt)),
                r = tokio::time::timeout(timeout, self.fetcher.fetch_tile(provider, index)) => r,
            };
            let error = match result {
                Ok(Ok(payload)) => return Ok((payload, attempt)),
                Ok(Err(e)) => e,
                Err(_) => TileError::Timeout {
                    ms: self.config.request_timeout_ms,
                },
            };

            if !error.is_retryable() || attempt >= max_attempts {
                return Err((error, attempt));
            }
            let backoff = self.config.retry_backoff_ms[(attempt - 1) as usize];
            trace!(tile = %index, attempt, backoff_ms = backoff, error = %error, "retrying tile");
            tokio::select! {
                _ = cancel.cancelled() => return Err((TileError::Cancelled, attempt)),
                _ = tokio::time::sleep(Duration::from_millis(backoff)) => {}
            }
        }
    }
}
