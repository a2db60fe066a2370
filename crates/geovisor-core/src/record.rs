//! Feature records shared between sources, analysis, and export.
//!
//! A [`Record`] is one geographic entity: its attribute bag in source order
//! plus an optional geometry. The attribute bag stays open, but the keys the
//! aggregator and exporter depend on are named in [`fields`] and can be
//! remapped per layer through a [`FieldMap`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Geometry as handed out by the feature sources. Opaque to the analysis
/// code except through the geometry engine.
pub type Geometry = geo::Geometry<f64>;

/// Attribute bag. Insertion order is the source's field order.
pub type Attributes = Map<String, Value>;

/// Well-known attribute keys of the agricultural monitoring layers.
pub mod fields {
    /// Participant identifier (national ID of the producer).
    pub const IDENTIFIER: &str = "dni";
    /// Free-text crop / cultivation type.
    pub const CATEGORY: &str = "tipo_cultivo";
    /// Attended area in hectares.
    pub const AREA: &str = "area_atendida";
    /// Regional administrative office.
    pub const ZONAL_OFFICE: &str = "oficina_zonal";
}

/// Maps the well-known roles onto the attribute names a layer actually uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMap {
    pub identifier: String,
    pub category: String,
    pub area: String,
    pub group: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            identifier: fields::IDENTIFIER.to_string(),
            category: fields::CATEGORY.to_string(),
            area: fields::AREA.to_string(),
            group: fields::ZONAL_OFFICE.to_string(),
        }
    }
}

/// One feature read from a source. Immutable once read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub attributes: Attributes,
    pub geometry: Option<Geometry>,
}

impl Record {
    pub fn new(attributes: Attributes) -> Self {
        Self {
            attributes,
            geometry: None,
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Raw attribute value, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    /// Attribute coerced to text. `null` and missing keys yield `None`.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.attributes.get(field)? {
            Value::Null => None,
            v => Some(value_to_string(v)),
        }
    }

    /// Attribute coerced to a number. Numeric strings are parsed.
    pub fn number(&self, field: &str) -> Option<f64> {
        match self.attributes.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Trimmed, non-empty participant identifier.
    ///
    /// Records without one cannot be deduplicated and never enter an
    /// identifier set.
    pub fn identifier(&self, field: &str) -> Option<String> {
        let id = self.text(field)?;
        let id = id.trim();
        (!id.is_empty()).then(|| id.to_string())
    }

    /// Whether the geometry is a polygon or multipolygon.
    pub fn is_polygonal(&self) -> bool {
        matches!(
            self.geometry,
            Some(Geometry::Polygon(_)) | Some(Geometry::MultiPolygon(_))
        )
    }
}

/// Render a JSON attribute value as plain text (strings unquoted, `null` empty).
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
