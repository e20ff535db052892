use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::protocol::{TileFormat, TileProviderInfo};
use crate::source::ProviderDirectory;

pub const DEFAULT_PROVIDER: &str = "usgs_topo";

/// A raster tile provider and its zoom range.
#[derive(Debug, Clone, PartialEq)]
pub struct TileProvider {
    pub id: String,
    pub name: String,
    pub attribution: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_size: u32,
    pub format: TileFormat,
}

impl TileProvider {
    fn builtin(id: &str, name: &str, attribution: &str, min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            attribution: attribution.to_string(),
            min_zoom,
            max_zoom,
            tile_size: 256,
            format: TileFormat::Png,
        }
    }

    fn from_info(id: String, info: TileProviderInfo) -> Self {
        let (min_zoom, max_zoom) = if info.min_zoom <= info.max_zoom {
            (info.min_zoom, info.max_zoom)
        } else {
            (info.max_zoom, info.min_zoom)
        };
        Self {
            id,
            name: info.name,
            attribution: info.attribution.unwrap_or_default(),
            min_zoom,
            max_zoom,
            tile_size: info.tile_size,
            format: info.format,
        }
    }

    pub fn supports_zoom(&self, z: u8) -> bool {
        (self.min_zoom..=self.max_zoom).contains(&z)
    }

    pub fn clamp_zoom(&self, z: u8) -> u8 {
        z.clamp(self.min_zoom, self.max_zoom)
    }
}

/// Providers known to the client, with a built-in table for when the tile
/// service cannot be asked.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, TileProvider>,
    default: TileProvider,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProviderRegistry {
    pub fn builtin() -> Self {
        let table = [
            TileProvider::builtin("usgs_topo", "USGS Topographic", "USGS", 1, 16),
            TileProvider::builtin("usgs_imagery", "USGS Imagery", "USGS", 1, 18),
            TileProvider::builtin(
                "osm_standard",
                "OpenStreetMap Standard",
                "© OpenStreetMap contributors",
                1,
                19,
            ),
            TileProvider::builtin("esri_world_topo", "Esri World Topographic", "Esri", 1, 19),
            TileProvider::builtin("esri_world_imagery", "Esri World Imagery", "Esri", 1, 19),
        ];
        let default = table[0].clone();
        Self {
            providers: table.into_iter().map(|p| (p.id.clone(), p)).collect(),
            default,
        }
    }

    /// Build a registry from an explicit list. An empty list yields the
    /// built-in table.
    pub fn from_providers(providers: impl IntoIterator<Item = TileProvider>) -> Self {
        let providers: BTreeMap<String, TileProvider> =
            providers.into_iter().map(|p| (p.id.clone(), p)).collect();
        let default = providers
            .get(DEFAULT_PROVIDER)
            .or_else(|| providers.values().next())
            .cloned();
        match default {
            Some(default) => Self { providers, default },
            None => Self::builtin(),
        }
    }

    /// Ask the tile service for its providers, falling back to the built-in
    /// table on any failure.
    pub async fn load(directory: &dyn ProviderDirectory) -> Self {
        match directory.list_providers().await {
            Ok(listing) if !listing.is_empty() => {
                let registry = Self::from_providers(
                    listing
                        .into_iter()
                        .map(|(id, info)| TileProvider::from_info(id, info)),
                );
                info!(count = registry.len(), "loaded tile providers");
                registry
            }
            Ok(_) => {
                warn!("tile service listed no providers; using built-in table");
                Self::builtin()
            }
            Err(e) => {
                warn!(error = %e, "failed to load tile providers; using built-in table");
                Self::builtin()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TileProvider> {
        self.providers.get(id)
    }

    pub fn default_provider(&self) -> &TileProvider {
        &self.default
    }

    /// Provider `id`, or the default when `id` is unknown.
    pub fn resolve(&self, id: &str) -> &TileProvider {
        self.get(id).unwrap_or_else(|| self.default_provider())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TileProvider> {
        self.providers.values()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{DEFAULT_PROVIDER, ProviderRegistry};
    use crate::error::TileError;
    use crate::protocol::{TileFormat, TileProviderInfo};
    use crate::source::{BoxFuture, ProviderDirectory};

    struct FailingDirectory;

    impl ProviderDirectory for FailingDirectory {
        fn list_providers(
            &self,
        ) -> BoxFuture<'_, Result<BTreeMap<String, TileProviderInfo>, TileError>> {
            Box::pin(async { Err(TileError::Transport("connection refused".into())) })
        }
    }

    struct StaticDirectory(BTreeMap<String, TileProviderInfo>);

    impl ProviderDirectory for StaticDirectory {
        fn list_providers(
            &self,
        ) -> BoxFuture<'_, Result<BTreeMap<String, TileProviderInfo>, TileError>> {
            let listing = self.0.clone();
            Box::pin(async move { Ok(listing) })
        }
    }

    #[test]
    fn builtin_table_matches_service_defaults() {
        let r = ProviderRegistry::builtin();
        assert_eq!(r.len(), 5);
        assert_eq!(r.default_provider().id, DEFAULT_PROVIDER);
        let topo = r.get("usgs_topo").unwrap();
        assert_eq!((topo.min_zoom, topo.max_zoom), (1, 16));
        assert_eq!(r.get("usgs_imagery").unwrap().max_zoom, 18);
        assert_eq!(r.resolve("nope").id, "usgs_topo");
    }

    #[test]
    fn zoom_clamps_into_provider_range() {
        let r = ProviderRegistry::builtin();
        let topo = r.get("usgs_topo").unwrap();
        assert_eq!(topo.clamp_zoom(10), 10);
        assert_eq!(topo.clamp_zoom(20), 16);
        assert_eq!(topo.clamp_zoom(0), 1);
        assert!(!topo.supports_zoom(17));
    }

    #[tokio::test]
    async fn load_falls_back_when_service_fails() {
        let r = ProviderRegistry::load(&FailingDirectory).await;
        assert_eq!(r.len(), 5);

        let r = ProviderRegistry::load(&StaticDirectory(BTreeMap::new())).await;
        assert_eq!(r.default_provider().id, DEFAULT_PROVIDER);
    }

    #[tokio::test]
    async fn load_uses_listing_and_picks_a_default() {
        let mut listing = BTreeMap::new();
        listing.insert(
            "osm_standard".to_string(),
            TileProviderInfo {
                name: "OSM".into(),
                description: None,
                attribution: None,
                tile_size: 256,
                min_zoom: 19,
                max_zoom: 1,
                format: TileFormat::Png,
            },
        );
        let r = ProviderRegistry::load(&StaticDirectory(listing)).await;
        assert_eq!(r.len(), 1);
        let osm = r.default_provider();
        assert_eq!(osm.id, "osm_standard");
        assert_eq!((osm.min_zoom, osm.max_zoom), (1, 19));
    }
}
