//! Overlay layer kinds, modes, toggles and the survey-grid filter.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::labels::LineOrientation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayLayerKind {
    /// Township/range intersection cells.
    Grid,
    Township,
    Range,
    Sections,
    QuarterSections,
    Subdivisions,
}

impl OverlayLayerKind {
    pub const ALL: [OverlayLayerKind; 6] = [
        OverlayLayerKind::Grid,
        OverlayLayerKind::Township,
        OverlayLayerKind::Range,
        OverlayLayerKind::Sections,
        OverlayLayerKind::QuarterSections,
        OverlayLayerKind::Subdivisions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayLayerKind::Grid => "grid",
            OverlayLayerKind::Township => "township",
            OverlayLayerKind::Range => "range",
            OverlayLayerKind::Sections => "sections",
            OverlayLayerKind::QuarterSections => "quarter-sections",
            OverlayLayerKind::Subdivisions => "subdivisions",
        }
    }

    /// Layer name in overlay service URLs.
    pub fn path_segment(&self) -> &'static str {
        match self {
            OverlayLayerKind::Grid => "grid",
            OverlayLayerKind::Township => "townships",
            OverlayLayerKind::Range => "ranges",
            OverlayLayerKind::Sections => "sections",
            OverlayLayerKind::QuarterSections => "quarter_sections",
            OverlayLayerKind::Subdivisions => "subdivisions",
        }
    }

    /// Reading direction for labels placed along this layer's lines.
    pub fn line_orientation(&self) -> Option<LineOrientation> {
        match self {
            OverlayLayerKind::Township => Some(LineOrientation::Horizontal),
            OverlayLayerKind::Range => Some(LineOrientation::Vertical),
            _ => None,
        }
    }
}

impl fmt::Display for OverlayLayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLayer(pub String);

impl fmt::Display for UnknownLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown overlay layer: {}", self.0)
    }
}

impl std::error::Error for UnknownLayer {}

impl FromStr for OverlayLayerKind {
    type Err = UnknownLayer;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('_', "-");
        OverlayLayerKind::ALL
            .into_iter()
            .find(|k| k.as_str() == norm || k.path_segment().replace('_', "-") == norm)
            .ok_or_else(|| UnknownLayer(s.to_string()))
    }
}

/// Where overlay bounds come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayMode {
    /// Anchored to the parcel's container bounds.
    Container,
    /// Follows the live viewport.
    #[default]
    Regional,
}

impl OverlayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayMode::Container => "container",
            OverlayMode::Regional => "regional",
        }
    }
}

/// What happens to a layer that is no longer desired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnloadPolicy {
    /// Drop its geometry.
    Teardown,
    /// Keep geometry but mark it hidden.
    HideRetain,
}

impl UnloadPolicy {
    pub fn default_for(mode: OverlayMode) -> Self {
        match mode {
            OverlayMode::Regional => UnloadPolicy::Teardown,
            OverlayMode::Container => UnloadPolicy::HideRetain,
        }
    }
}

/// Layers the user asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerToggles {
    requested: BTreeSet<OverlayLayerKind>,
}

impl LayerToggles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(kinds: impl IntoIterator<Item = OverlayLayerKind>) -> Self {
        Self {
            requested: kinds.into_iter().collect(),
        }
    }

    pub fn set(&mut self, kind: OverlayLayerKind, on: bool) {
        if on {
            self.requested.insert(kind);
        } else {
            self.requested.remove(&kind);
        }
    }

    pub fn is_on(&self, kind: OverlayLayerKind) -> bool {
        self.requested.contains(&kind)
    }

    pub fn requested(&self) -> &BTreeSet<OverlayLayerKind> {
        &self.requested
    }

    /// Layers to actually load: township and range together become grid.
    pub fn desired(&self) -> BTreeSet<OverlayLayerKind> {
        let mut out = self.requested.clone();
        if out.contains(&OverlayLayerKind::Township) && out.contains(&OverlayLayerKind::Range) {
            out.remove(&OverlayLayerKind::Township);
            out.remove(&OverlayLayerKind::Range);
            out.insert(OverlayLayerKind::Grid);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TownshipDirection {
    N,
    S,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RangeDirection {
    E,
    W,
}

/// Township/range/section selection for container-mode overlays.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SurveyFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub township_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub township_direction: Option<TownshipDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_direction: Option<RangeDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_number: Option<u8>,
}

const SURVEY_KEYS: [&str; 3] = ["township_number", "range_number", "section_number"];

impl SurveyFilter {
    pub fn is_empty(&self) -> bool {
        *self == SurveyFilter::default()
    }

    /// Normalize loosely-typed survey fields. Numbers may arrive as strings,
    /// directions in any case; out-of-range values are dropped.
    pub fn normalize(raw: &Value) -> Self {
        let number = |key: &str| -> Option<u32> {
            match raw.get(key)? {
                Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }
        };
        let letter = |key: &str| -> Option<String> {
            raw.get(key)?
                .as_str()
                .map(|s| s.trim().to_ascii_uppercase())
        };

        SurveyFilter {
            township_number: number("township_number"),
            township_direction: match letter("township_direction").as_deref() {
                Some("N") => Some(TownshipDirection::N),
                Some("S") => Some(TownshipDirection::S),
                _ => None,
            },
            range_number: number("range_number"),
            range_direction: match letter("range_direction").as_deref() {
                Some("E") => Some(RangeDirection::E),
                Some("W") => Some(RangeDirection::W),
                _ => None,
            },
            section_number: number("section_number")
                .filter(|s| (1..=36).contains(s))
                .map(|s| s as u8),
        }
    }

    /// Find the survey block in a parsed legal description and normalize it.
    ///
    /// Looks at `plss`, then the first description carrying `plss`, then the
    /// root object, then any nested object with survey fields.
    pub fn from_schema(schema: &Value) -> Option<Self> {
        let obj = schema.as_object()?;
        let has_fields = |v: &Value| SURVEY_KEYS.iter().any(|k| v.get(*k).is_some());

        let block = if let Some(plss) = obj.get("plss") {
            Some(plss)
        } else if let Some(descriptions) = obj.get("descriptions").and_then(Value::as_array) {
            descriptions.iter().find_map(|d| d.get("plss").filter(|p| !p.is_null()))
        } else if has_fields(schema) {
            Some(schema)
        } else {
            obj.values().find(|v| v.is_object() && has_fields(v))
        }?;

        let filter = SurveyFilter::normalize(block);
        (!filter.is_empty()).then_some(filter)
    }

    /// `T4N`, if the township is known.
    pub fn township_label(&self) -> Option<String> {
        let n = self.township_number?;
        let d = self.township_direction.map(|d| format!("{d:?}")).unwrap_or_default();
        Some(format!("T{n}{d}"))
    }

    /// `R68W`, if the range is known.
    pub fn range_label(&self) -> Option<String> {
        let n = self.range_number?;
        let d = self.range_direction.map(|d| format!("{d:?}")).unwrap_or_default();
        Some(format!("R{n}{d}"))
    }

    /// `T4N R68W`, if both are known.
    pub fn cell_identifier(&self) -> Option<String> {
        Some(format!("{} {}", self.township_label()?, self.range_label()?))
    }
}
