//! Collaborator seams for tile bytes and the provider directory.
//!
//! Both traits return boxed futures so they stay dyn-compatible; the loader
//! holds them as `Arc<dyn …>` and tests swap in scripted fakes.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use foundation::TileIndex;
use http::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::TileError;
use crate::protocol::{
    PROVIDERS_PATH, ProvidersResponse, RedirectPayload, TILE_SOURCE_HEADER, TileProviderInfo,
    tile_path,
};
use crate::tile::{TileContent, TileSourceKind};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A successfully fetched tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePayload {
    pub content: TileContent,
    pub source: TileSourceKind,
}

pub trait TileFetcher: Send + Sync {
    /// Fetch one tile. Implementations do not retry; the loader does.
    fn fetch_tile<'a>(
        &'a self,
        provider: &'a str,
        index: TileIndex,
    ) -> BoxFuture<'a, Result<TilePayload, TileError>>;
}

pub trait ProviderDirectory: Send + Sync {
    fn list_providers(&self) -> BoxFuture<'_, Result<BTreeMap<String, TileProviderInfo>, TileError>>;
}

/// Client for the tile service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpTileService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTileService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl TileFetcher for HttpTileService {
    fn fetch_tile<'a>(
        &'a self,
        provider: &'a str,
        index: TileIndex,
    ) -> BoxFuture<'a, Result<TilePayload, TileError>> {
        let url = self.url(&tile_path(provider, index));
        Box::pin(async move {
            let resp = self.client.get(&url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(TileError::Http {
                    status: status.as_u16(),
                });
            }

            let is_json = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("application/json"));
            let source = TileSourceKind::from_header(
                resp.headers()
                    .get(TILE_SOURCE_HEADER)
                    .and_then(|v| v.to_str().ok()),
            );
            let body = resp.bytes().await?;

            if is_json {
                let redirect: RedirectPayload = serde_json::from_slice(&body)
                    .map_err(|e| TileError::Decode(e.to_string()))?;
                debug!(tile = %index, provider, target = %redirect.redirect, "tile redirected");
                return Ok(TilePayload {
                    content: TileContent::Url(redirect.redirect),
                    source: TileSourceKind::DirectRedirect,
                });
            }

            if body.is_empty() {
                return Err(TileError::Decode("empty tile body".to_string()));
            }
            Ok(TilePayload {
                content: TileContent::Blob(body),
                source,
            })
        })
    }
}

impl ProviderDirectory for HttpTileService {
    fn list_providers(&self) -> BoxFuture<'_, Result<BTreeMap<String, TileProviderInfo>, TileError>> {
        let url = self.url(PROVIDERS_PATH);
        Box::pin(async move {
            let resp = self.client.get(&url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(TileError::Http {
                    status: status.as_u16(),
                });
            }
            let body = resp.bytes().await?;
            let parsed: ProvidersResponse =
                serde_json::from_slice(&body).map_err(|e| TileError::Decode(e.to_string()))?;
            if !parsed.success {
                return Err(TileError::Decode("provider listing reported failure".to_string()));
            }
            Ok(parsed.providers)
        })
    }
}
