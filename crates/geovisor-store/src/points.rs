//! CSV import of point layers.
//!
//! Each row is one point, located by latitude/longitude columns or by UTM
//! easting/northing plus a zone column. Every other column is kept as text
//! in header order, so identifiers keep their leading zeros; numeric
//! attributes are still usable through [`Record::number`].
//!
//! Spreadsheet exports with `;` separators and decimal commas are accepted.

use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{Array, StringArray};
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use geovisor_core::{
    Attributes, CoordError, GeoPoint, Geometry, Record, UtmPoint, UtmZone, normalize_category,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::StoreError;

const LATITUDE: &[&str] = &["lat", "latitud", "latitude"];
const LONGITUDE: &[&str] = &["lon", "lng", "long", "longitud", "longitude"];
const EASTING: &[&str] = &["este", "easting", "utm_este", "utm_x", "x_utm"];
const NORTHING: &[&str] = &["norte", "northing", "utm_norte", "utm_y", "y_utm"];
const ZONE: &[&str] = &["zona", "zone", "zona_utm", "utm_zone"];

/// Columns that locate each row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointColumns {
    Geographic {
        lat: String,
        lon: String,
    },
    Utm {
        easting: String,
        northing: String,
        zone: String,
    },
}

impl PointColumns {
    /// Pick coordinate columns by name (case and accents ignored).
    /// Latitude/longitude wins when both kinds are present.
    pub fn detect<S: AsRef<str>>(header: &[S]) -> Option<Self> {
        let find = |names: &[&str]| {
            header
                .iter()
                .map(AsRef::as_ref)
                .find(|h| names.contains(&normalize_category(h).as_str()))
                .map(str::to_string)
        };
        if let (Some(lat), Some(lon)) = (find(LATITUDE), find(LONGITUDE)) {
            return Some(Self::Geographic { lat, lon });
        }
        match (find(EASTING), find(NORTHING), find(ZONE)) {
            (Some(easting), Some(northing), Some(zone)) => Some(Self::Utm {
                easting,
                northing,
                zone,
            }),
            _ => None,
        }
    }
}

/// Parse a point CSV into records with `Point` geometries.
///
/// Rows with blank coordinates are kept without geometry. A coordinate
/// that does not parse or falls outside the region bounds fails the
/// whole import, naming the line.
pub fn records_from_csv(text: &str) -> Result<Vec<Record>, StoreError> {
    let text = text.trim_start_matches('\u{feff}');
    let Some(first_line) = text.lines().find(|l| !l.trim().is_empty()) else {
        return Ok(Vec::new());
    };
    let delimiter = if first_line.contains(';') && !first_line.contains(',') {
        b';'
    } else {
        b','
    };

    let (inferred, _) = Format::default()
        .with_header(true)
        .with_delimiter(delimiter)
        .infer_schema(Cursor::new(text.as_bytes()), Some(0))?;
    let header: Vec<String> = inferred.fields().iter().map(|f| f.name().clone()).collect();
    let columns = PointColumns::detect(&header).ok_or(StoreError::NoCoordinateColumns)?;
    debug!(?columns, delimiter = %char::from(delimiter), "reading point CSV");

    // Everything is read as text; inference would drop leading zeros.
    let schema = Schema::new(
        header
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    );
    let reader = ReaderBuilder::new(Arc::new(schema))
        .with_header(true)
        .with_delimiter(delimiter)
        .build(Cursor::new(text.as_bytes()))?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch?;
        let values = batch
            .columns()
            .iter()
            .map(|col| {
                col.as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or_else(|| ArrowError::SchemaError("expected a text column".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        for row in 0..batch.num_rows() {
            let mut attributes = Attributes::new();
            for (name, column) in header.iter().zip(&values) {
                let value = if column.is_null(row) {
                    Value::Null
                } else {
                    Value::String(column.value(row).to_string())
                };
                attributes.insert(name.clone(), value);
            }
            let record = Record::new(attributes);
            // Header is line 1.
            let line = records.len() + 2;
            let geometry = locate(&record, &columns, delimiter == b';')
                .map_err(|source| StoreError::Coordinate { line, source })?;
            records.push(match geometry {
                Some(point) => record.with_geometry(point),
                None => record,
            });
        }
    }

    let located = records.iter().filter(|r| r.geometry.is_some()).count();
    info!(count = records.len(), located, "parsed point CSV");
    Ok(records)
}

fn locate(
    record: &Record,
    columns: &PointColumns,
    decimal_comma: bool,
) -> Result<Option<Geometry>, CoordError> {
    let read = |axis: &'static str, field: &str| -> Result<Option<f64>, CoordError> {
        let Some(raw) = record.text(field) else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let raw = if decimal_comma {
            raw.replace(',', ".")
        } else {
            raw.to_string()
        };
        raw.parse().map(Some).map_err(|_| CoordError::NotFinite(axis))
    };

    let point = match columns {
        PointColumns::Geographic { lat, lon } => {
            match (read("latitude", lat)?, read("longitude", lon)?) {
                (Some(lat), Some(lon)) => GeoPoint::new(lat, lon)?,
                _ => return Ok(None),
            }
        }
        PointColumns::Utm {
            easting,
            northing,
            zone,
        } => {
            let (Some(e), Some(n)) = (read("easting", easting)?, read("northing", northing)?)
            else {
                return Ok(None);
            };
            let zone: UtmZone = record.text(zone).unwrap_or_default().parse()?;
            UtmPoint::new(zone, e, n)?.to_geographic()?
        }
    };
    Ok(Some(point.to_point().into()))
}
