use serde::{Deserialize, Serialize};

use crate::bounds::{GeoPoint, ViewBounds};
use crate::math::projection::{tile_x_to_lon, tile_y_to_lat};

/// Deepest zoom the tile math supports (2^30 tiles per side still fits `u32`).
pub const MAX_TILE_ZOOM: u8 = 30;

/// Tile pyramid index in the ZXY scheme, `y = 0` at the north edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileIndex {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileIndex {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Number of tiles along one axis at zoom `z`.
    pub fn tiles_per_side(z: u8) -> u32 {
        1u32 << z.min(MAX_TILE_ZOOM)
    }

    pub fn is_valid(&self) -> bool {
        let n = Self::tiles_per_side(self.z);
        self.z <= MAX_TILE_ZOOM && self.x < n && self.y < n
    }

    /// North-west corner of the tile.
    pub fn north_west(&self) -> GeoPoint {
        GeoPoint::new(
            tile_y_to_lat(self.y as f64, self.z),
            tile_x_to_lon(self.x as f64, self.z),
        )
    }

    /// Geographic footprint used for screen placement.
    pub fn bounds(&self) -> ViewBounds {
        let x = self.x as f64;
        let y = self.y as f64;
        ViewBounds::new(
            tile_y_to_lat(y + 1.0, self.z),
            tile_y_to_lat(y, self.z),
            tile_x_to_lon(x, self.z),
            tile_x_to_lon(x + 1.0, self.z),
        )
    }
}

impl std::fmt::Display for TileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::TileIndex;

    #[test]
    fn root_tile_spans_the_mercator_world() {
        let b = TileIndex::new(0, 0, 0).bounds();
        assert!((b.min_lon + 180.0).abs() < 1e-9);
        assert!((b.max_lon - 180.0).abs() < 1e-9);
        assert!((b.max_lat - 85.051_128_779_806_59).abs() < 1e-9);
        assert!((b.min_lat + 85.051_128_779_806_59).abs() < 1e-9);
    }

    #[test]
    fn validity_follows_zoom() {
        assert!(TileIndex::new(3, 3, 2).is_valid());
        assert!(!TileIndex::new(4, 0, 2).is_valid());
        assert_eq!(TileIndex::new(1, 2, 3).to_string(), "3/1/2");
    }
}
