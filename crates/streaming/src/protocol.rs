//! Wire payloads of the tile service.
//!
//! - `GET /tile/{provider}/{z}/{x}/{y}`: image bytes with an `X-Tile-Source`
//!   header, or a JSON [`RedirectPayload`] when the service does not proxy.
//! - `GET /tile-providers`: a [`ProvidersResponse`].

use std::collections::BTreeMap;

use foundation::TileIndex;
use serde::{Deserialize, Serialize};

/// Response header naming where the service found the tile.
pub const TILE_SOURCE_HEADER: &str = "x-tile-source";

/// Path of one tile below the service base URL.
pub fn tile_path(provider: &str, index: TileIndex) -> String {
    format!("/tile/{provider}/{}/{}/{}", index.z, index.x, index.y)
}

pub const PROVIDERS_PATH: &str = "/tile-providers";

/// Body returned instead of image bytes when proxying is disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectPayload {
    pub redirect: String,
    #[serde(default)]
    pub cors_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvidersResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub providers: BTreeMap<String, TileProviderInfo>,
}

fn default_true() -> bool {
    true
}

/// One provider as advertised by the tile service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileProviderInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attribution: Option<String>,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    pub min_zoom: u8,
    pub max_zoom: u8,
    #[serde(default)]
    pub format: TileFormat,
}

fn default_tile_size() -> u32 {
    256
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
    Webp,
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use foundation::TileIndex;
    use pretty_assertions::assert_eq;

    use super::{ProvidersResponse, RedirectPayload, TileFormat, tile_path};

    #[test]
    fn tile_path_is_zxy() {
        assert_eq!(
            tile_path("usgs_topo", TileIndex::new(12, 34, 7)),
            "/tile/usgs_topo/7/12/34"
        );
    }

    #[test]
    fn providers_response_tolerates_sparse_entries() {
        let json = r#"{
            "success": true,
            "providers": {
                "osm_standard": {"name": "OpenStreetMap", "min_zoom": 1, "max_zoom": 19},
                "usgs_imagery": {
                    "name": "USGS Imagery", "attribution": "USGS",
                    "tile_size": 512, "min_zoom": 1, "max_zoom": 18, "format": "jpeg"
                }
            }
        }"#;
        let resp: ProvidersResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.providers.len(), 2);
        let osm = &resp.providers["osm_standard"];
        assert_eq!(osm.tile_size, 256);
        assert_eq!(osm.format, TileFormat::Png);
        assert_eq!(resp.providers["usgs_imagery"].format, TileFormat::Jpeg);
    }

    #[test]
    fn redirect_payload_defaults_cors() {
        let r: RedirectPayload =
            serde_json::from_str(r#"{"redirect": "https://example.test/1/2/3.png"}"#).unwrap();
        assert!(!r.cors_enabled);

        let formats: Vec<TileFormat> = serde_json::from_str(r#"["jpg", "webp", "tiff"]"#).unwrap();
        assert_eq!(formats, vec![TileFormat::Jpeg, TileFormat::Webp, TileFormat::Unknown]);
    }
}
