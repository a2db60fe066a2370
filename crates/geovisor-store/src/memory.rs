//! In-memory feature layer.

use std::path::Path;

use async_trait::async_trait;
use geo::{Intersects, Relate};
use geovisor_core::{
    FeatureSource, Filter, Geometry, Query, Record, SourceError, SpatialRelationship,
};
use tracing::{debug, info};

use crate::{StoreError, records_from_csv, records_from_geojson};

/// A feature layer held entirely in memory.
///
/// Backs user-uploaded layers and tests. Implements [`FeatureSource`] with
/// the same paging semantics as a remote service: filter, stable sort,
/// offset, limit, field projection.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    name: String,
    records: Vec<Record>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }

    /// Build a layer from GeoJSON text.
    pub fn from_geojson_str(name: impl Into<String>, text: &str) -> Result<Self, StoreError> {
        Ok(Self::new(name, records_from_geojson(text)?))
    }

    /// Load a GeoJSON file. The layer is named after the file stem.
    pub async fn open_geojson(path: &Path) -> Result<Self, StoreError> {
        let (name, text) = read_layer_file(path).await?;
        let store = Self::from_geojson_str(name, &text)?;
        info!(layer = %store.name, count = store.len(), "loaded GeoJSON layer");
        Ok(store)
    }

    /// Load a point CSV file. The layer is named after the file stem.
    pub async fn open_csv(path: &Path) -> Result<Self, StoreError> {
        let (name, text) = read_layer_file(path).await?;
        let store = Self::new(name, records_from_csv(&text)?);
        info!(layer = %store.name, count = store.len(), "loaded CSV layer");
        Ok(store)
    }

    /// Load a layer file, choosing the format by extension (`.csv` or GeoJSON).
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            Self::open_csv(path).await
        } else {
            Self::open_geojson(path).await
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn filtered(&self, filter: &Filter) -> Result<Vec<&Record>, SourceError> {
        let mut out = Vec::new();
        for record in &self.records {
            match filter.matches(record) {
                Some(true) => out.push(record),
                Some(false) => {}
                None => return Err(SourceError::UnsupportedFilter(filter.to_where_clause())),
            }
        }
        Ok(out)
    }
}

/// Copy a record keeping only the requested fields (all when empty).
fn project(record: &Record, fields: &[String], with_geometry: bool) -> Record {
    let attributes = if fields.is_empty() || fields.iter().any(|f| f == "*") {
        record.attributes.clone()
    } else {
        record
            .attributes
            .iter()
            .filter(|(k, _)| fields.iter().any(|f| f == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    };
    Record {
        attributes,
        geometry: if with_geometry {
            record.geometry.clone()
        } else {
            None
        },
    }
}

fn satisfies(candidate: &Geometry, other: &Geometry, relationship: SpatialRelationship) -> bool {
    match relationship {
        SpatialRelationship::Intersects => candidate.intersects(other),
        SpatialRelationship::Contains => candidate.relate(other).is_contains(),
        SpatialRelationship::Within => candidate.relate(other).is_within(),
    }
}

async fn read_layer_file(path: &Path) -> Result<(String, String), StoreError> {
    if !path.exists() {
        return Err(StoreError::NotFound(path.to_path_buf()));
    }
    let text = tokio::fs::read_to_string(path).await?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "layer".to_string());
    Ok((name, text))
}

#[async_trait]
impl FeatureSource for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn count(&self, filter: &Filter) -> Result<usize, SourceError> {
        Ok(self.filtered(filter)?.len())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Record>, SourceError> {
        let mut matching = self.filtered(&query.filter)?;
        if let Some(key) = &query.order_by {
            matching.sort_by_key(|r| r.text(key));
        }
        let page: Vec<Record> = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|r| project(r, &query.fields, query.return_geometry))
            .collect();
        debug!(
            layer = %self.name,
            offset = query.offset,
            returned = page.len(),
            "memory query"
        );
        Ok(page)
    }

    async fn query_spatial(
        &self,
        geometry: &Geometry,
        relationship: SpatialRelationship,
        fields: &[String],
    ) -> Result<Vec<Record>, SourceError> {
        Ok(self
            .records
            .iter()
            .filter(|r| {
                r.geometry
                    .as_ref()
                    .is_some_and(|g| satisfies(g, geometry, relationship))
            })
            .map(|r| project(r, fields, true))
            .collect())
    }
}
