//! Geographic points and axis-aligned bounds in degrees.
//!
//! Two collaborators describe the same box differently: regional overlay
//! queries use `min_lat/max_lat/min_lon/max_lon`, container requests use
//! `west/south/east/north`. [`ViewBounds`] and [`Wsen`] convert into each other
//! by moving fields, so no precision is lost either way.

use serde::{Deserialize, Serialize};

/// A geographic position in degrees.
///
/// Ranges are not enforced; out-of-range values are a rendering concern.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Bounds in `min/max` ordering.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Bounds in `west/south/east/north` ordering.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wsen {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl ViewBounds {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    pub fn from_wsen(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self::new(south, north, west, east)
    }

    /// Smallest bounds containing every point, or `None` for an empty or
    /// entirely non-finite input.
    pub fn enclosing(points: impl IntoIterator<Item = GeoPoint>) -> Option<Self> {
        let mut out: Option<Self> = None;
        for p in points.into_iter().filter(GeoPoint::is_finite) {
            out = Some(match out {
                None => Self::new(p.lat, p.lat, p.lon, p.lon),
                Some(b) => Self::new(
                    b.min_lat.min(p.lat),
                    b.max_lat.max(p.lat),
                    b.min_lon.min(p.lon),
                    b.max_lon.max(p.lon),
                ),
            });
        }
        out
    }

    pub fn west(&self) -> f64 {
        self.min_lon
    }

    pub fn south(&self) -> f64 {
        self.min_lat
    }

    pub fn east(&self) -> f64 {
        self.max_lon
    }

    pub fn north(&self) -> f64 {
        self.max_lat
    }

    pub fn to_wsen(&self) -> Wsen {
        Wsen {
            west: self.min_lon,
            south: self.min_lat,
            east: self.max_lon,
            north: self.max_lat,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.min_lat.is_finite()
            && self.max_lat.is_finite()
            && self.min_lon.is_finite()
            && self.max_lon.is_finite()
    }

    pub fn width(&self) -> f64 {
        (self.max_lon - self.min_lon).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.max_lat - self.min_lat).max(0.0)
    }

    /// Planar area in square degrees.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) * 0.5,
            (self.min_lon + self.max_lon) * 0.5,
        )
    }

    pub fn contains(&self, p: GeoPoint) -> bool {
        p.lat >= self.min_lat
            && p.lat <= self.max_lat
            && p.lon >= self.min_lon
            && p.lon <= self.max_lon
    }

    pub fn clamp_point(&self, p: GeoPoint) -> GeoPoint {
        GeoPoint::new(
            p.lat.clamp(self.min_lat, self.max_lat.max(self.min_lat)),
            p.lon.clamp(self.min_lon, self.max_lon.max(self.min_lon)),
        )
    }

    /// Intersection box; `None` when the boxes do not share positive area.
    pub fn intersection(&self, other: &ViewBounds) -> Option<ViewBounds> {
        let out = ViewBounds::new(
            self.min_lat.max(other.min_lat),
            self.max_lat.min(other.max_lat),
            self.min_lon.max(other.min_lon),
            self.max_lon.min(other.max_lon),
        );
        if out.max_lat > out.min_lat && out.max_lon > out.min_lon {
            Some(out)
        } else {
            None
        }
    }

    /// Fraction of `self` covered by `cover`, in `[0, 1]`.
    ///
    /// Disjoint, touching or zero-area requests always report `0.0`.
    pub fn coverage_by(&self, cover: &ViewBounds) -> f64 {
        let area = self.area();
        if area.is_nan() || area <= 0.0 {
            return 0.0;
        }
        match self.intersection(cover) {
            Some(i) => (i.area() / area).clamp(0.0, 1.0),
            None => 0.0,
        }
    }
}

impl From<Wsen> for ViewBounds {
    fn from(b: Wsen) -> Self {
        ViewBounds::from_wsen(b.west, b.south, b.east, b.north)
    }
}

impl From<ViewBounds> for Wsen {
    fn from(b: ViewBounds) -> Self {
        b.to_wsen()
    }
}
