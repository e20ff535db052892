//! GeoJSON-like feature collections returned by the overlay service.
//!
//! Positions are `[lon, lat]`; any extra ordinates (elevation) are dropped on
//! decode.

use foundation::{GeoPoint, ViewBounds};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 2]")]
pub struct Position {
    pub lon: f64,
    pub lat: f64,
}

impl Position {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn to_geo(self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

impl TryFrom<Vec<f64>> for Position {
    type Error = String;

    fn try_from(v: Vec<f64>) -> Result<Self, Self::Error> {
        match v.as_slice() {
            [lon, lat, ..] => Ok(Position::new(*lon, *lat)),
            _ => Err(format!("position needs at least 2 ordinates, got {}", v.len())),
        }
    }
}

impl From<Position> for [f64; 2] {
    fn from(p: Position) -> Self {
        [p.lon, p.lat]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    /// Every vertex, in document order.
    pub fn positions(&self) -> Vec<Position> {
        match self {
            Geometry::Point(p) => vec![*p],
            Geometry::LineString(line) => line.clone(),
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                lines.iter().flatten().copied().collect()
            }
            Geometry::MultiPolygon(polys) => polys.iter().flatten().flatten().copied().collect(),
        }
    }

    pub fn bounds(&self) -> Option<ViewBounds> {
        ViewBounds::enclosing(self.positions().into_iter().map(Position::to_geo))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// A property rendered as text: strings trimmed, integers without a
    /// fractional part, numeric strings without leading zeros.
    pub fn property_text(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    None
                } else if let Ok(n) = s.parse::<u64>() {
                    Some(n.to_string())
                } else {
                    Some(s.to_string())
                }
            }
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 => Some(format!("{}", f as i64)),
                _ => Some(n.to_string()),
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn bounds(&self) -> Option<ViewBounds> {
        ViewBounds::enclosing(
            self.features
                .iter()
                .filter_map(|f| f.geometry.as_ref())
                .flat_map(|g| g.positions())
                .map(Position::to_geo),
        )
    }
}

/// Envelope of an overlay response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub feature_count: Option<usize>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub features: Vec<Feature>,
}

fn default_success() -> bool {
    true
}

impl OverlayResponse {
    pub fn into_collection(self) -> FeatureCollection {
        FeatureCollection::new(self.features)
    }
}

#[cfg(test)]
mod tests {
    use foundation::ViewBounds;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{Feature, Geometry, OverlayResponse, Position};

    #[test]
    fn decodes_service_envelope() {
        let body = json!({
            "success": true,
            "layer": "townships",
            "mode": "container",
            "state": "Wyoming",
            "feature_count": 2,
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {"type": "LineString", "coordinates": [[-105.6, 41.3, 0.0], [-105.5, 41.3]]},
                    "properties": {"township_number": 15, "township_direction": "N", "label": "T15N"}
                },
                {
                    "type": "Feature",
                    "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]},
                    "properties": {}
                }
            ]
        });
        let resp: OverlayResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.feature_count, Some(2));
        let fc = resp.into_collection();
        assert_eq!(fc.len(), 2);
        assert_eq!(
            fc.features[0].geometry,
            Some(Geometry::LineString(vec![
                Position::new(-105.6, 41.3),
                Position::new(-105.5, 41.3)
            ]))
        );
        assert_eq!(fc.bounds(), Some(ViewBounds::new(0.0, 41.3, -105.6, 1.0)));
    }

    #[test]
    fn short_positions_are_rejected() {
        let bad = json!({"type": "Point", "coordinates": [1.0]});
        assert!(serde_json::from_value::<Geometry>(bad).is_err());
    }

    #[test]
    fn property_text_normalizes_numbers() {
        let f: Feature = serde_json::from_value(json!({
            "geometry": null,
            "properties": {"a": "004", "b": 68.0, "c": "  ", "d": "Sec 12", "e": null}
        }))
        .unwrap();
        assert_eq!(f.property_text("a").as_deref(), Some("4"));
        assert_eq!(f.property_text("b").as_deref(), Some("68"));
        assert_eq!(f.property_text("c"), None);
        assert_eq!(f.property_str("d"), Some("Sec 12"));
        assert_eq!(f.property_text("e"), None);
        assert_eq!(f.property_text("missing"), None);
    }
}
