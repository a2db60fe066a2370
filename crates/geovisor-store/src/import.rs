//! GeoJSON import for user-uploaded layers.

use geojson::{GeoJson, JsonObject};
use geovisor_core::{Geometry, Record};
use tracing::{debug, info};

use crate::StoreError;

/// Parse a GeoJSON document into records.
///
/// Accepts a FeatureCollection, a single Feature, or a bare Geometry.
/// Feature properties become the attribute bag in document order;
/// features without geometry are kept with `geometry: None`.
pub fn records_from_geojson(text: &str) -> Result<Vec<Record>, StoreError> {
    let geojson: GeoJson = text.parse()?;

    let records = match geojson {
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .enumerate()
            .map(|(index, f)| to_record(index, f.geometry, f.properties))
            .collect::<Result<Vec<_>, _>>()?,
        GeoJson::Feature(f) => vec![to_record(0, f.geometry, f.properties)?],
        GeoJson::Geometry(g) => vec![to_record(0, Some(g), None)?],
    };

    let with_geometry = records.iter().filter(|r| r.geometry.is_some()).count();
    info!(
        count = records.len(),
        with_geometry, "parsed GeoJSON features"
    );
    Ok(records)
}

fn to_record(
    index: usize,
    geometry: Option<geojson::Geometry>,
    properties: Option<JsonObject>,
) -> Result<Record, StoreError> {
    let record = Record::new(properties.unwrap_or_default());
    let Some(geometry) = geometry else {
        debug!(index, "feature without geometry");
        return Ok(record);
    };
    let geometry = Geometry::try_from(geometry).map_err(|e| StoreError::Geometry {
        index,
        detail: e.to_string(),
    })?;
    Ok(record.with_geometry(geometry))
}
