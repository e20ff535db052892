//! Spherical Web Mercator conversions.
//!
//! Pixel space follows the tile pyramid convention: `(0, 0)` is the north-west
//! corner of the world map and each tile is [`TILE_SIZE`] pixels wide.
//!
//! Precondition: latitudes near the poles are clamped by the caller (see
//! [`MAX_MERCATOR_LAT`]); these functions only do the math.

use std::f64::consts::PI;

use super::Vec2;
use crate::bounds::GeoPoint;
use crate::tile::{MAX_TILE_ZOOM, TileIndex};

/// Edge length of one tile in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// Latitude at which the square Web Mercator world ends.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Sphere radius used by Web Mercator (meters).
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

fn world_tiles(zoom: u8) -> f64 {
    2f64.powi(zoom as i32)
}

/// Geographic degrees to world pixel coordinates at `zoom`.
pub fn lon_lat_to_tile_pixel(lon: f64, lat: f64, zoom: u8) -> Vec2 {
    let size = world_tiles(zoom) * TILE_SIZE;
    let x = (lon + 180.0) / 360.0 * size;
    let lat_rad = lat.to_radians();
    let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * size;
    Vec2::new(x, y)
}

/// Longitude of the western edge of fractional tile column `x`.
pub fn tile_x_to_lon(x: f64, zoom: u8) -> f64 {
    x / world_tiles(zoom) * 360.0 - 180.0
}

/// Latitude of the northern edge of fractional tile row `y`.
pub fn tile_y_to_lat(y: f64, zoom: u8) -> f64 {
    let n = PI * (1.0 - 2.0 * y / world_tiles(zoom));
    n.sinh().atan().to_degrees()
}

/// North-west corner of a tile.
pub fn tile_index_to_lon_lat(index: TileIndex) -> GeoPoint {
    index.north_west()
}

/// Tile containing `(lon, lat)`.
///
/// Points on the east or south edge of the world map land in the last tile
/// rather than one past it.
pub fn degrees_to_tile_index(lon: f64, lat: f64, zoom: u8) -> TileIndex {
    let zoom = zoom.min(MAX_TILE_ZOOM);
    let px = lon_lat_to_tile_pixel(lon, lat, zoom);
    let last = (TileIndex::tiles_per_side(zoom) - 1) as f64;
    let x = (px.x / TILE_SIZE).floor().clamp(0.0, last);
    let y = (px.y / TILE_SIZE).floor().clamp(0.0, last);
    TileIndex::new(x as u32, y as u32, zoom)
}

/// Degrees to Web Mercator meters (EPSG:3857).
pub fn lon_lat_to_meters(lon: f64, lat: f64) -> Vec2 {
    let x = EARTH_RADIUS_M * lon.to_radians();
    let y = EARTH_RADIUS_M * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    Vec2::new(x, y)
}

/// Web Mercator meters back to degrees.
pub fn meters_to_lon_lat(meters: Vec2) -> GeoPoint {
    let lon = (meters.x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (meters.y / EARTH_RADIUS_M).exp().atan() - PI / 2.0).to_degrees();
    GeoPoint::new(lat, lon)
}

/// Ground resolution at `lat` for `zoom`.
pub fn meters_per_pixel(lat: f64, zoom: u8) -> f64 {
    let circumference = 2.0 * PI * EARTH_RADIUS_M * lat.to_radians().cos();
    circumference / (world_tiles(zoom) * TILE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn origin_maps_to_world_center() {
        let px = lon_lat_to_tile_pixel(0.0, 0.0, 1);
        assert_close(px.x, 256.0, 1e-9);
        assert_close(px.y, 256.0, 1e-9);
    }

    #[test]
    fn known_tile_for_new_york() {
        let t = degrees_to_tile_index(-74.0060, 40.7128, 16);
        assert_eq!(t, TileIndex::new(19295, 24640, 16));
    }

    #[test]
    fn round_trip_stays_within_one_tile() {
        let samples = [
            (-105.59, 41.31, 10u8),
            (0.0, 0.0, 0),
            (151.2, -33.86, 12),
            (-179.9, 84.9, 5),
            (179.9, -84.9, 18),
        ];
        for (lon, lat, zoom) in samples {
            let t = degrees_to_tile_index(lon, lat, zoom);
            let p = tile_index_to_lon_lat(t);
            let b = t.bounds();
            let tile_w = b.max_lon - b.min_lon;
            let tile_h = b.max_lat - b.min_lat;
            assert!((p.lon - lon).abs() <= tile_w, "lon {lon} zoom {zoom}");
            assert!((p.lat - lat).abs() <= tile_h, "lat {lat} zoom {zoom}");
            assert!(b.contains(GeoPoint::new(lat, lon)));
        }
    }

    #[test]
    fn world_edges_land_in_last_tile() {
        let t = degrees_to_tile_index(180.0, -MAX_MERCATOR_LAT, 3);
        assert_eq!(t, TileIndex::new(7, 7, 3));
        let t = degrees_to_tile_index(-180.0, MAX_MERCATOR_LAT, 3);
        assert_eq!(t, TileIndex::new(0, 0, 3));
    }

    #[test]
    fn inverse_latitude_matches_edges() {
        assert_close(tile_y_to_lat(0.0, 0), MAX_MERCATOR_LAT, 1e-9);
        assert_close(tile_y_to_lat(1.0, 1), 0.0, 1e-9);
        assert_close(tile_x_to_lon(2.0, 2), 0.0, 1e-9);
    }

    #[test]
    fn meters_round_trip() {
        let m = lon_lat_to_meters(-105.5, 41.25);
        let p = meters_to_lon_lat(m);
        assert_close(p.lon, -105.5, 1e-9);
        assert_close(p.lat, 41.25, 1e-9);
        assert_close(meters_per_pixel(0.0, 0), 156_543.033_928, 1e-3);
    }
}
