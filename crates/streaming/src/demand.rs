//! Which tiles a viewport needs, and in what order to fetch them.

use foundation::math::{MAX_MERCATOR_LAT, degrees_to_tile_index};
use foundation::{MAX_TILE_ZOOM, TileIndex, ViewBounds};

use tracing::warn;

use crate::provider::TileProvider;

/// Largest covering set [`tiles_for_bounds`] will build (a 256×256 block).
pub const MAX_DEMAND_TILES: u64 = 1 << 16;

/// Tiles covering `bounds` at `zoom`, grown by one tile on every side and
/// clamped to the world. Row-major (`y`, then `x`).
///
/// Non-finite bounds, a zoom past [`MAX_TILE_ZOOM`] or a covering set larger
/// than [`MAX_DEMAND_TILES`] yield nothing.
pub fn tiles_for_bounds(bounds: &ViewBounds, zoom: u8) -> Vec<TileIndex> {
    if zoom > MAX_TILE_ZOOM || !bounds.is_finite() {
        return Vec::new();
    }

    let clamp_lat = |v: f64| v.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let clamp_lon = |v: f64| v.clamp(-180.0, 180.0);
    let north = clamp_lat(bounds.min_lat.max(bounds.max_lat));
    let south = clamp_lat(bounds.min_lat.min(bounds.max_lat));
    let west = clamp_lon(bounds.min_lon.min(bounds.max_lon));
    let east = clamp_lon(bounds.min_lon.max(bounds.max_lon));

    let nw = degrees_to_tile_index(west, north, zoom);
    let se = degrees_to_tile_index(east, south, zoom);
    let last = TileIndex::tiles_per_side(zoom) - 1;

    let x0 = nw.x.saturating_sub(1);
    let x1 = (se.x + 1).min(last);
    let y0 = nw.y.saturating_sub(1);
    let y1 = (se.y + 1).min(last);

    let count = (u64::from(x1 - x0) + 1).checked_mul(u64::from(y1 - y0) + 1);
    let count = match count {
        Some(n) if n <= MAX_DEMAND_TILES => n as usize,
        _ => {
            warn!(zoom, cols = x1 - x0 + 1, rows = y1 - y0 + 1, "view needs too many tiles");
            return Vec::new();
        }
    };

    let mut out = Vec::with_capacity(count);
    for y in y0..=y1 {
        for x in x0..=x1 {
            out.push(TileIndex::new(x, y, zoom));
        }
    }
    out
}

/// Order tiles so the middle of the view loads first.
///
/// The center is the middle tile of the set's bounding box. Tiles sort by
/// ring (Chebyshev distance), then Manhattan distance, then `(z, y, x)`.
pub fn prioritize_center_out(mut tiles: Vec<TileIndex>) -> Vec<TileIndex> {
    let Some(first) = tiles.first() else {
        return tiles;
    };
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for t in &tiles {
        min_x = min_x.min(t.x);
        max_x = max_x.max(t.x);
        min_y = min_y.min(t.y);
        max_y = max_y.max(t.y);
    }
    let cx = min_x + (max_x - min_x) / 2;
    let cy = min_y + (max_y - min_y) / 2;

    tiles.sort_by_key(|t| {
        let dx = t.x.abs_diff(cx);
        let dy = t.y.abs_diff(cy);
        (dx.max(dy), dx + dy, t.z, t.y, t.x)
    });
    tiles
}

/// The tile set one view needs from one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct TileDemand {
    pub provider: String,
    pub requested_zoom: u8,
    /// `requested_zoom` clamped into the provider's range.
    pub zoom: u8,
    /// Row-major.
    pub tiles: Vec<TileIndex>,
}

impl TileDemand {
    pub fn compute(bounds: &ViewBounds, requested_zoom: u8, provider: &TileProvider) -> Self {
        let zoom = provider.clamp_zoom(requested_zoom);
        Self {
            provider: provider.id.clone(),
            requested_zoom,
            zoom,
            tiles: tiles_for_bounds(bounds, zoom),
        }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tiles in fetch order.
    pub fn prioritized(&self) -> Vec<TileIndex> {
        prioritize_center_out(self.tiles.clone())
    }
}
