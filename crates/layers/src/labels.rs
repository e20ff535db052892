//! Label anchors for survey boundaries.
//!
//! Lines are sampled at evenly spaced arc-length offsets and each sample
//! carries the local segment angle so text can follow the boundary. Areas get
//! a single anchor at the outer ring's centroid. All math is planar in
//! degrees with `x = lon`, `y = lat`.

use foundation::math::Vec2;
use foundation::{GeoPoint, ViewBounds};
use serde::{Deserialize, Serialize};

use crate::feature::{Feature, FeatureCollection, Geometry, Position};
use crate::overlay::OverlayLayerKind;

/// Direction text should read along a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineOrientation {
    /// West to east.
    Horizontal,
    /// South to north.
    Vertical,
}

impl LineOrientation {
    /// Orientation of the chord from the first to the last point.
    pub fn dominant(points: &[GeoPoint]) -> Self {
        match (points.first(), points.last()) {
            (Some(a), Some(b)) if (b.lat - a.lat).abs() > (b.lon - a.lon).abs() => {
                LineOrientation::Vertical
            }
            _ => LineOrientation::Horizontal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelPoint {
    pub position: GeoPoint,
    /// Counter-clockwise from east, in degrees.
    pub angle_deg: f64,
}

fn to_vec(p: GeoPoint) -> Vec2 {
    Vec2::new(p.lon, p.lat)
}

fn to_geo(v: Vec2) -> GeoPoint {
    GeoPoint::new(v.y, v.x)
}

fn angle_deg(a: Vec2, b: Vec2) -> f64 {
    (b.y - a.y).atan2(b.x - a.x).to_degrees()
}

/// Finite vertices, reversed when needed so the line runs in `orientation`.
fn oriented(points: &[GeoPoint], orientation: LineOrientation) -> Vec<Vec2> {
    let mut out: Vec<Vec2> = points
        .iter()
        .filter(|p| p.is_finite())
        .map(|p| to_vec(*p))
        .collect();
    let reverse = match (out.first(), out.last()) {
        (Some(a), Some(b)) => match orientation {
            LineOrientation::Horizontal => a.x > b.x,
            LineOrientation::Vertical => a.y > b.y,
        },
        _ => false,
    };
    if reverse {
        out.reverse();
    }
    out
}

/// Non-degenerate segments with their arc-length start.
struct Walk {
    segments: Vec<(Vec2, Vec2, f64, f64)>,
    total: f64,
}

impl Walk {
    fn new(points: &[Vec2]) -> Self {
        let mut segments = Vec::with_capacity(points.len().saturating_sub(1));
        let mut total = 0.0;
        for pair in points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let len = (b - a).length();
            if !len.is_finite() || len <= 0.0 {
                continue;
            }
            segments.push((a, b, total, len));
            total += len;
        }
        Self { segments, total }
    }

    /// Point and segment angle at arc length `offset`.
    fn at(&self, offset: f64) -> Option<LabelPoint> {
        let last = self.segments.last()?;
        let (a, b, start, len) = self
            .segments
            .iter()
            .find(|(_, _, start, len)| start + len >= offset)
            .unwrap_or(last);
        let t = ((offset - start) / len).clamp(0.0, 1.0);
        Some(LabelPoint {
            position: to_geo(a.lerp(*b, t)),
            angle_deg: angle_deg(*a, *b),
        })
    }
}

/// `n` labels at `L·i/(n+1)` along the line, `i = 1..=n`.
///
/// A single point (or a line with no length) yields one label at angle 0.
pub fn sample_polyline(
    points: &[GeoPoint],
    n: usize,
    orientation: LineOrientation,
) -> Vec<LabelPoint> {
    let pts = oriented(points, orientation);
    if n == 0 || pts.is_empty() {
        return Vec::new();
    }
    let walk = Walk::new(&pts);
    if walk.total <= 0.0 {
        return vec![LabelPoint {
            position: to_geo(pts[0]),
            angle_deg: 0.0,
        }];
    }
    (1..=n)
        .filter_map(|i| walk.at(walk.total * i as f64 / (n + 1) as f64))
        .collect()
}

/// Liang–Barsky: parameter range of `a→b` inside `view`.
fn clip_segment(a: Vec2, b: Vec2, view: &ViewBounds) -> Option<(f64, f64)> {
    let d = b - a;
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    let edges = [
        (-d.x, a.x - view.min_lon),
        (d.x, view.max_lon - a.x),
        (-d.y, a.y - view.min_lat),
        (d.y, view.max_lat - a.y),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((t0, t1))
}

/// Like [`sample_polyline`], but only over the stretch of line inside
/// `view`. When nothing lands in view, one label is placed at the vertex
/// centroid clamped to `view`, angled along the line's chord.
pub fn sample_polyline_in_view(
    points: &[GeoPoint],
    n: usize,
    orientation: LineOrientation,
    view: &ViewBounds,
) -> Vec<LabelPoint> {
    let pts = oriented(points, orientation);
    if n == 0 || pts.is_empty() {
        return Vec::new();
    }
    let walk = Walk::new(&pts);

    let mut visible: Option<(f64, f64)> = None;
    for (a, b, start, len) in &walk.segments {
        if let Some((t0, t1)) = clip_segment(*a, *b, view) {
            let (lo, hi) = (start + t0 * len, start + t1 * len);
            visible = Some(match visible {
                None => (lo, hi),
                Some((vlo, vhi)) => (vlo.min(lo), vhi.max(hi)),
            });
        }
    }

    let mut out = Vec::new();
    if let Some((lo, hi)) = visible {
        out = (1..=n)
            .filter_map(|i| walk.at(lo + (hi - lo) * i as f64 / (n + 1) as f64))
            .filter(|l| view.contains(l.position))
            .collect();
    }
    if !out.is_empty() {
        return out;
    }

    let count = pts.len() as f64;
    let sum = pts.iter().fold(Vec2::default(), |acc, p| acc + *p);
    let centroid = to_geo(sum.scale(1.0 / count));
    let chord = match (pts.first(), pts.last()) {
        (Some(a), Some(b)) if a != b => angle_deg(*a, *b),
        _ => 0.0,
    };
    vec![LabelPoint {
        position: view.clamp_point(centroid),
        angle_deg: chord,
    }]
}

/// Signed shoelace area of a ring in square degrees.
fn ring_area(ring: &[GeoPoint]) -> f64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            a.lon * b.lat - b.lon * a.lat
        })
        .sum::<f64>()
        * 0.5
}

/// Area-weighted centroid of a ring; degenerate rings fall back to the
/// bounding-box center.
pub fn polygon_label(ring: &[GeoPoint]) -> Option<GeoPoint> {
    let ring: Vec<GeoPoint> = ring.iter().copied().filter(GeoPoint::is_finite).collect();
    let bbox = ViewBounds::enclosing(ring.iter().copied())?;
    let area = ring_area(&ring);
    if area.abs() < 1e-12 {
        return Some(bbox.center());
    }
    let n = ring.len();
    let (mut cx, mut cy) = (0.0, 0.0);
    for i in 0..n {
        let (a, b) = (ring[i], ring[(i + 1) % n]);
        let cross = a.lon * b.lat - b.lon * a.lat;
        cx += (a.lon + b.lon) * cross;
        cy += (a.lat + b.lat) * cross;
    }
    let k = 1.0 / (6.0 * area);
    Some(GeoPoint::new(cy * k, cx * k))
}

/// Text for a feature's label.
///
/// Prefers the service-provided `display_label` or `label`, then composes one
/// from survey numbers for the layer, then falls back to `cell_identifier`.
pub fn label_text(feature: &Feature, kind: OverlayLayerKind) -> Option<String> {
    if let Some(s) = feature
        .property_str("display_label")
        .or_else(|| feature.property_str("label"))
    {
        return Some(s.to_string());
    }

    let township = || {
        let n = feature.property_text("township_number")?;
        let d = feature.property_text("township_direction").unwrap_or_default();
        Some(format!("T{n}{}", d.to_ascii_uppercase()))
    };
    let range = || {
        let n = feature.property_text("range_number")?;
        let d = feature.property_text("range_direction").unwrap_or_default();
        Some(format!("R{n}{}", d.to_ascii_uppercase()))
    };
    let composed = match kind {
        OverlayLayerKind::Township => township(),
        OverlayLayerKind::Range => range(),
        OverlayLayerKind::Sections => feature
            .property_text("section_number")
            .map(|n| format!("Sec {n}")),
        OverlayLayerKind::Grid => township().zip(range()).map(|(t, r)| format!("{t} {r}")),
        OverlayLayerKind::QuarterSections | OverlayLayerKind::Subdivisions => None,
    };
    composed.or_else(|| feature.property_str("cell_identifier").map(str::to_string))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryLabel {
    pub text: String,
    pub position: GeoPoint,
    pub angle_deg: f64,
    pub layer: OverlayLayerKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelOptions {
    /// Labels per boundary line.
    pub per_line: usize,
    /// When set, line labels are kept inside this box.
    pub viewport: Option<ViewBounds>,
}

impl Default for LabelOptions {
    fn default() -> Self {
        Self {
            per_line: 3,
            viewport: None,
        }
    }
}

fn geo_points(line: &[Position]) -> Vec<GeoPoint> {
    line.iter().map(|p| p.to_geo()).collect()
}

fn line_labels(
    line: &[Position],
    kind: OverlayLayerKind,
    options: &LabelOptions,
) -> Vec<LabelPoint> {
    let points = geo_points(line);
    let orientation = kind
        .line_orientation()
        .unwrap_or_else(|| LineOrientation::dominant(&points));
    match &options.viewport {
        Some(view) => sample_polyline_in_view(&points, options.per_line, orientation, view),
        None => sample_polyline(&points, options.per_line, orientation),
    }
}

fn area_label(polygons: &[Vec<Vec<Position>>]) -> Option<LabelPoint> {
    let outer = polygons
        .iter()
        .filter_map(|rings| rings.first())
        .map(|ring| geo_points(ring))
        .max_by(|a, b| ring_area(a).abs().total_cmp(&ring_area(b).abs()))?;
    Some(LabelPoint {
        position: polygon_label(&outer)?,
        angle_deg: 0.0,
    })
}

/// Labels for every feature of one layer that has geometry and text.
pub fn label_features(
    collection: &FeatureCollection,
    kind: OverlayLayerKind,
    options: &LabelOptions,
) -> Vec<BoundaryLabel> {
    let mut out = Vec::new();
    for feature in &collection.features {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        let Some(text) = label_text(feature, kind) else {
            continue;
        };
        let points = match geometry {
            Geometry::Point(p) => {
                let position = p.to_geo();
                let visible = options.viewport.is_none_or(|v| v.contains(position));
                if visible {
                    vec![LabelPoint {
                        position,
                        angle_deg: 0.0,
                    }]
                } else {
                    Vec::new()
                }
            }
            Geometry::LineString(line) => line_labels(line, kind, options),
            Geometry::MultiLineString(lines) => lines
                .iter()
                .flat_map(|line| line_labels(line, kind, options))
                .collect(),
            Geometry::Polygon(rings) => area_label(std::slice::from_ref(rings))
                .into_iter()
                .collect(),
            Geometry::MultiPolygon(polygons) => area_label(polygons).into_iter().collect(),
        };
        out.extend(points.into_iter().map(|p| BoundaryLabel {
            text: text.clone(),
            position: p.position,
            angle_deg: p.angle_deg,
            layer: kind,
        }));
    }
    out
}

#[cfg(test)]
mod tests {
    use foundation::{GeoPoint, ViewBounds};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{
        LabelOptions, LineOrientation, label_features, label_text, polygon_label, sample_polyline,
        sample_polyline_in_view,
    };
    use crate::feature::{Feature, FeatureCollection};
    use crate::overlay::OverlayLayerKind;

    fn xy(x: f64, y: f64) -> GeoPoint {
        GeoPoint::new(y, x)
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "expected {a} ~= {b}");
    }

    #[test]
    fn samples_quarter_points_with_segment_angles() {
        let line = [xy(0.0, 0.0), xy(2.0, 0.0), xy(2.0, 2.0)];
        let labels = sample_polyline(&line, 3, LineOrientation::Horizontal);
        assert_eq!(labels.len(), 3);

        let expected = [(1.0, 0.0, 0.0), (2.0, 0.0, 0.0), (2.0, 1.0, 90.0)];
        for (l, (x, y, angle)) in labels.iter().zip(expected) {
            assert_close(l.position.lon, x);
            assert_close(l.position.lat, y);
            assert_close(l.angle_deg, angle);
        }
    }

    #[test]
    fn orientation_reverses_lines_to_read_forward() {
        let westward = [xy(4.0, 1.0), xy(0.0, 1.0)];
        let labels = sample_polyline(&westward, 1, LineOrientation::Horizontal);
        assert_close(labels[0].angle_deg, 0.0);
        assert_close(labels[0].position.lon, 2.0);

        let southward = [xy(0.0, 4.0), xy(0.0, 0.0)];
        let labels = sample_polyline(&southward, 1, LineOrientation::Vertical);
        assert_close(labels[0].angle_deg, 90.0);
    }

    #[test]
    fn degenerate_lines() {
        assert!(sample_polyline(&[], 3, LineOrientation::Horizontal).is_empty());
        let one = sample_polyline(&[xy(1.0, 2.0)], 3, LineOrientation::Horizontal);
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].angle_deg, 0.0);
        assert!(sample_polyline(&[xy(0.0, 0.0), xy(1.0, 0.0)], 0, LineOrientation::Horizontal)
            .is_empty());
    }

    #[test]
    fn in_view_sampling_stays_on_screen() {
        let line = [xy(0.0, 0.5), xy(10.0, 0.5)];
        let view = ViewBounds::new(0.0, 1.0, 8.0, 10.0);
        let labels = sample_polyline_in_view(&line, 3, LineOrientation::Horizontal, &view);
        assert_eq!(labels.len(), 3);
        assert!(labels.iter().all(|l| view.contains(l.position)));
        assert_close(labels[0].position.lon, 8.5);
        assert_close(labels[2].position.lon, 9.5);
    }

    #[test]
    fn off_screen_line_falls_back_to_clamped_centroid() {
        let line = [xy(0.0, 5.0), xy(10.0, 5.0)];
        let view = ViewBounds::new(0.0, 1.0, 2.0, 3.0);
        let labels = sample_polyline_in_view(&line, 3, LineOrientation::Horizontal, &view);
        assert_eq!(labels.len(), 1);
        assert_close(labels[0].position.lon, 3.0);
        assert_close(labels[0].position.lat, 1.0);
        assert_close(labels[0].angle_deg, 0.0);
    }

    #[test]
    fn polygon_centroid_is_area_weighted() {
        // L-shape: 2x1 bar plus a 1x1 block on top of its left half.
        let ring = [
            xy(0.0, 0.0),
            xy(2.0, 0.0),
            xy(2.0, 1.0),
            xy(1.0, 1.0),
            xy(1.0, 2.0),
            xy(0.0, 2.0),
            xy(0.0, 0.0),
        ];
        let c = polygon_label(&ring).unwrap();
        assert_close(c.lon, 5.0 / 6.0);
        assert_close(c.lat, 5.0 / 6.0);

        let flat = [xy(0.0, 0.0), xy(4.0, 0.0), xy(2.0, 0.0)];
        assert_eq!(polygon_label(&flat), Some(xy(2.0, 0.0)));
        assert_eq!(polygon_label(&[]), None);
    }

    fn feature(props: serde_json::Value, geometry: serde_json::Value) -> Feature {
        serde_json::from_value(json!({"geometry": geometry, "properties": props})).unwrap()
    }

    #[test]
    fn label_text_prefers_service_labels() {
        let line = json!(null);
        let f = feature(json!({"display_label": "T4N", "label": "x"}), line.clone());
        assert_eq!(label_text(&f, OverlayLayerKind::Township).as_deref(), Some("T4N"));

        let f = feature(json!({"township_number": "004", "township_direction": "n"}), line.clone());
        assert_eq!(label_text(&f, OverlayLayerKind::Township).as_deref(), Some("T4N"));

        let f = feature(json!({"range_number": 68, "range_direction": "W"}), line.clone());
        assert_eq!(label_text(&f, OverlayLayerKind::Range).as_deref(), Some("R68W"));

        let f = feature(json!({"section_number": 12}), line.clone());
        assert_eq!(label_text(&f, OverlayLayerKind::Sections).as_deref(), Some("Sec 12"));

        let f = feature(
            json!({"township_number": 4, "township_direction": "N",
                   "range_number": 68, "range_direction": "W"}),
            line.clone(),
        );
        assert_eq!(label_text(&f, OverlayLayerKind::Grid).as_deref(), Some("T4N R68W"));

        let f = feature(json!({"cell_identifier": "WY060040N0680W0"}), line.clone());
        assert_eq!(
            label_text(&f, OverlayLayerKind::QuarterSections).as_deref(),
            Some("WY060040N0680W0")
        );
        assert_eq!(label_text(&feature(json!({}), line), OverlayLayerKind::Grid), None);
    }

    #[test]
    fn labels_follow_geometry_type() {
        let collection = FeatureCollection::new(vec![
            feature(
                json!({"label": "T15N"}),
                json!({"type": "LineString", "coordinates": [[2.0, 0.0], [0.0, 0.0]]}),
            ),
            feature(
                json!({"label": "Sec 1"}),
                json!({"type": "MultiPolygon", "coordinates": [
                    [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]],
                    [[[10, 10], [14, 10], [14, 14], [10, 14], [10, 10]]]
                ]}),
            ),
            feature(json!({}), json!({"type": "Point", "coordinates": [0.0, 0.0]})),
            feature(json!({"label": "no geometry"}), json!(null)),
        ]);
        let options = LabelOptions {
            per_line: 1,
            viewport: None,
        };
        let labels = label_features(&collection, OverlayLayerKind::Township, &options);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].text, "T15N");
        assert_close(labels[0].position.lon, 1.0);
        assert_close(labels[0].angle_deg, 0.0);
        assert_close(labels[1].position.lon, 12.0);
        assert_close(labels[1].position.lat, 12.0);
        assert!(labels.iter().all(|l| l.layer == OverlayLayerKind::Township));
    }
}
