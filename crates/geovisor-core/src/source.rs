//! The feature-source interface consumed by the fetcher and the overlay detector.
//!
//! Sources are queryable collections of [`Record`]s: an in-memory layer built
//! from an uploaded GeoJSON or CSV file, or a remote feature service.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::normalize::normalize_category;
use crate::record::{Geometry, Record, value_to_string};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("filter not supported by this source: {0}")]
    UnsupportedFilter(String),

    #[error("{0} is not supported by this source")]
    Unsupported(&'static str),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl SourceError {
    /// Wrap a backend-specific error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Structured record filter.
///
/// In-memory sources evaluate it directly; remote sources render it as a
/// where-clause with [`to_where_clause`](Self::to_where_clause).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    #[default]
    All,
    /// Attribute equals the value (compared as text).
    Equals { field: String, value: Value },
    /// Normalised attribute text contains the normalised needle.
    Contains { field: String, text: String },
    And(Vec<Filter>),
    /// Raw where-clause, only understood by remote services.
    Where(String),
}

impl Filter {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn contains(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Contains {
            field: field.into(),
            text: text.into(),
        }
    }

    /// Evaluate against a record. `None` when the filter can't be evaluated
    /// locally (raw where-clauses).
    pub fn matches(&self, record: &Record) -> Option<bool> {
        match self {
            Filter::All => Some(true),
            Filter::Equals { field, value } => {
                let expected = value_to_string(value);
                Some(record.text(field).is_some_and(|v| v == expected))
            }
            Filter::Contains { field, text } => {
                let needle = normalize_category(text);
                Some(
                    record
                        .text(field)
                        .is_some_and(|v| normalize_category(&v).contains(&needle)),
                )
            }
            Filter::And(filters) => {
                for f in filters {
                    if !f.matches(record)? {
                        return Some(false);
                    }
                }
                Some(true)
            }
            Filter::Where(_) => None,
        }
    }

    /// SQL-92 style where-clause as accepted by feature services.
    ///
    /// `Contains` sends the folded needle ("Café" becomes `'%CAFE%'`). The
    /// service compares it against the stored text as is, so values stored
    /// with accents only match locally.
    pub fn to_where_clause(&self) -> String {
        match self {
            Filter::All => "1=1".to_string(),
            Filter::Equals { field, value } => match value {
                Value::Number(n) => format!("{field} = {n}"),
                Value::Bool(b) => format!("{field} = {}", u8::from(*b)),
                other => format!("{field} = '{}'", escape_sql(&value_to_string(other))),
            },
            Filter::Contains { field, text } => format!(
                "UPPER({field}) LIKE '%{}%'",
                escape_sql(&normalize_category(text).to_uppercase())
            ),
            Filter::And(filters) if filters.is_empty() => "1=1".to_string(),
            Filter::And(filters) => filters
                .iter()
                .map(|f| format!("({})", f.to_where_clause()))
                .collect::<Vec<_>>()
                .join(" AND "),
            Filter::Where(clause) => clause.clone(),
        }
    }
}

fn escape_sql(s: &str) -> String {
    s.replace('\'', "''")
}

/// Spatial predicate for [`FeatureSource::query_spatial`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpatialRelationship {
    #[default]
    Intersects,
    Contains,
    Within,
}

/// One page request against a source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub filter: Filter,
    /// Attribute names to return; empty means all.
    pub fields: Vec<String>,
    pub return_geometry: bool,
    pub offset: usize,
    pub limit: Option<usize>,
    /// Stable sort key so consecutive pages neither overlap nor skip rows.
    pub order_by: Option<String>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            return_geometry: true,
            ..Default::default()
        }
    }

    pub fn fields(mut self, fields: &[String]) -> Self {
        self.fields = fields.to_vec();
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub fn order_by(mut self, field: Option<String>) -> Self {
        self.order_by = field;
        self
    }
}

/// A queryable collection of features.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    /// Layer name, used in logs and export file names.
    fn name(&self) -> &str;

    /// Number of records matching the filter.
    async fn count(&self, filter: &Filter) -> Result<usize, SourceError>;

    /// One page of records.
    async fn query(&self, query: &Query) -> Result<Vec<Record>, SourceError>;

    /// Records whose geometry stands in `relationship` to `geometry`.
    async fn query_spatial(
        &self,
        _geometry: &Geometry,
        _relationship: SpatialRelationship,
        _fields: &[String],
    ) -> Result<Vec<Record>, SourceError> {
        Err(SourceError::Unsupported("spatial query"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::new(value.as_object().cloned().unwrap())
    }

    #[test]
    fn contains_ignores_accents_and_case() {
        let r = record(json!({"tipo_cultivo": "  CAFÉ orgánico "}));
        assert_eq!(Filter::contains("tipo_cultivo", "cafe").matches(&r), Some(true));
        assert_eq!(Filter::contains("tipo_cultivo", "Orgánico").matches(&r), Some(true));
        assert_eq!(Filter::contains("tipo_cultivo", "cacao").matches(&r), Some(false));
    }

    #[test]
    fn equals_compares_as_text() {
        let r = record(json!({"oficina_zonal": "Tarapoto", "anio": 2024}));
        assert_eq!(Filter::equals("oficina_zonal", "Tarapoto").matches(&r), Some(true));
        assert_eq!(Filter::equals("anio", 2024).matches(&r), Some(true));
        assert_eq!(Filter::equals("anio", "2023").matches(&r), Some(false));
    }

    #[test]
    fn and_short_circuits_and_where_is_opaque() {
        let r = record(json!({"a": "x", "b": "y"}));
        let both = Filter::And(vec![Filter::equals("a", "x"), Filter::equals("b", "y")]);
        assert_eq!(both.matches(&r), Some(true));
        let raw = Filter::And(vec![Filter::equals("a", "x"), Filter::Where("b = 'y'".into())]);
        assert_eq!(raw.matches(&r), None);
    }

    #[test]
    fn where_clause_rendering() {
        assert_eq!(Filter::All.to_where_clause(), "1=1");
        assert_eq!(
            Filter::equals("oficina_zonal", "O'Higgins").to_where_clause(),
            "oficina_zonal = 'O''Higgins'"
        );
        assert_eq!(Filter::equals("anio", 2024).to_where_clause(), "anio = 2024");
        assert_eq!(
            Filter::And(vec![
                Filter::contains("tipo_cultivo", "cacao"),
                Filter::Where("area_atendida > 1".into()),
            ])
            .to_where_clause(),
            "(UPPER(tipo_cultivo) LIKE '%CACAO%') AND (area_atendida > 1)"
        );
    }

    #[test]
    fn contains_clause_folds_the_needle() {
        assert_eq!(
            Filter::contains("tipo_cultivo", " Café ").to_where_clause(),
            "UPPER(tipo_cultivo) LIKE '%CAFE%'"
        );
        assert_eq!(
            Filter::contains("productor", "Muñoz d'Ávila").to_where_clause(),
            "UPPER(productor) LIKE '%MUNOZ D''AVILA%'"
        );
    }

    #[test]
    fn query_builder_defaults_to_geometry() {
        let q = Query::new(Filter::All).page(4000, 2000);
        assert!(q.return_geometry);
        assert_eq!(q.offset, 4000);
        assert_eq!(q.limit, Some(2000));
        assert!(q.fields.is_empty());
    }
}
