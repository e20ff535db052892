use bytes::Bytes;
use foundation::TileIndex;

use crate::error::TileError;

/// How a tile's bytes reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TileSourceKind {
    /// Served from the tile service's own cache.
    Cache,
    /// Fetched upstream by the tile service.
    Remote,
    /// The service pointed us at the provider URL instead of proxying.
    DirectRedirect,
}

impl TileSourceKind {
    /// Parse an `X-Tile-Source` header value. Anything unknown counts as
    /// remote.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("cache") => TileSourceKind::Cache,
            _ => TileSourceKind::Remote,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TileSourceKind::Cache => "cache",
            TileSourceKind::Remote => "remote",
            TileSourceKind::DirectRedirect => "direct-redirect",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileContent {
    /// Image URL the renderer loads itself.
    Url(String),
    /// Image bytes.
    Blob(Bytes),
}

/// State of one tile within a load cycle.
///
/// Starts out loading and moves to exactly one terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRecord {
    pub index: TileIndex,
    pub provider: String,
    pub content: Option<TileContent>,
    pub loading: bool,
    pub error: Option<TileError>,
    pub source: Option<TileSourceKind>,
    pub attempts: u32,
}

impl TileRecord {
    pub fn loading(index: TileIndex, provider: impl Into<String>) -> Self {
        Self {
            index,
            provider: provider.into(),
            content: None,
            loading: true,
            error: None,
            source: None,
            attempts: 0,
        }
    }

    pub fn loaded(mut self, content: TileContent, source: TileSourceKind, attempts: u32) -> Self {
        self.content = Some(content);
        self.source = Some(source);
        self.loading = false;
        self.error = None;
        self.attempts = attempts;
        self
    }

    pub fn failed(mut self, error: TileError, attempts: u32) -> Self {
        self.content = None;
        self.loading = false;
        self.error = Some(error);
        self.attempts = attempts;
        self
    }

    pub fn is_loaded(&self) -> bool {
        !self.loading && self.content.is_some()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}
