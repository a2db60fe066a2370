//! Participant statistics per crop category.
//!
//! Two counting rules run side by side and must not be mixed up:
//!
//! - participants are distinct identifiers, so a producer with five cacao
//!   parcels counts once for cacao;
//! - areas and record counts run over every matching record, so those five
//!   parcels all add their hectares.
//!
//! Records without an identifier can't be deduplicated. They never enter an
//! identifier set but still add to areas and record counts.

use std::collections::{BTreeMap, HashSet};

use geovisor_core::{AnalysisConfig, CategoryMatcher, Record};
use tracing::debug;

use crate::AnalysisError;

/// Label for records whose group field is missing or blank.
pub const UNASSIGNED_GROUP: &str = "(unassigned)";

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRequest {
    pub category_field: String,
    pub identifier_field: String,
    /// Numeric field summed per category; `None` skips area sums.
    pub area_field: Option<String>,
    /// Category terms, substring-matched on normalised text.
    pub categories: Vec<String>,
    /// Category pairs whose shared participants are counted.
    pub pairs: Vec<(String, String)>,
}

impl AggregationRequest {
    pub fn new<S: AsRef<str>>(
        category_field: impl Into<String>,
        identifier_field: impl Into<String>,
        categories: &[S],
    ) -> Self {
        Self {
            category_field: category_field.into(),
            identifier_field: identifier_field.into(),
            area_field: None,
            categories: categories.iter().map(|c| c.as_ref().to_string()).collect(),
            pairs: Vec::new(),
        }
    }

    pub fn with_area(mut self, field: impl Into<String>) -> Self {
        self.area_field = Some(field.into());
        self
    }

    pub fn with_pair(mut self, first: impl Into<String>, second: impl Into<String>) -> Self {
        self.pairs.push((first.into(), second.into()));
        self
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            category_field: config.fields.category.clone(),
            identifier_field: config.fields.identifier.clone(),
            area_field: Some(config.fields.area.clone()),
            categories: config.categories.clone(),
            pairs: config.pairs.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryCount {
    pub term: String,
    /// Distinct identifiers.
    pub participants: usize,
    /// Matching records, with or without identifier.
    pub records: usize,
    /// Sum of the area field over matching records.
    pub area: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairIntersection {
    pub first: String,
    pub second: String,
    pub shared: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregationResult {
    /// One entry per requested term, in request order.
    pub per_category: Vec<CategoryCount>,
    /// One entry per requested pair, in request order.
    pub intersections: Vec<PairIntersection>,
    /// Distinct identifiers across all categories.
    pub total: usize,
    /// Matching records that had no usable identifier.
    pub without_identifier: usize,
}

impl AggregationResult {
    pub fn participants(&self, term: &str) -> Option<usize> {
        self.per_category
            .iter()
            .find(|c| c.term == term)
            .map(|c| c.participants)
    }

    pub fn area(&self, term: &str) -> Option<f64> {
        self.per_category
            .iter()
            .find(|c| c.term == term)
            .and_then(|c| c.area)
    }

    /// Shared participants of a requested pair, in either order.
    pub fn intersection_count(&self, a: &str, b: &str) -> Option<usize> {
        self.intersections
            .iter()
            .find(|p| (p.first == a && p.second == b) || (p.first == b && p.second == a))
            .map(|p| p.shared)
    }

    /// No record matched any category.
    pub fn is_empty(&self) -> bool {
        self.per_category.iter().all(|c| c.records == 0)
    }
}

/// Count participants per category over `records`.
pub fn aggregate(
    records: &[Record],
    request: &AggregationRequest,
) -> Result<AggregationResult, AnalysisError> {
    aggregate_iter(records.iter(), request)
}

/// [`aggregate`] once per value of `group_field` (e.g. the zonal office).
///
/// Groups come back sorted by key; records without a group value fall under
/// [`UNASSIGNED_GROUP`].
pub fn aggregate_by_group(
    records: &[Record],
    group_field: &str,
    request: &AggregationRequest,
) -> Result<BTreeMap<String, AggregationResult>, AnalysisError> {
    let mut groups: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
    for record in records {
        let key = record
            .text(group_field)
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| UNASSIGNED_GROUP.to_string());
        groups.entry(key).or_default().push(record);
    }

    groups
        .into_iter()
        .map(|(key, members)| Ok((key, aggregate_iter(members.into_iter(), request)?)))
        .collect()
}

fn aggregate_iter<'a>(
    records: impl Iterator<Item = &'a Record>,
    request: &AggregationRequest,
) -> Result<AggregationResult, AnalysisError> {
    let matcher = CategoryMatcher::new(&request.categories);
    let pairs = resolve_pairs(&matcher, &request.pairs)?;

    let n = request.categories.len();
    let mut sets: Vec<HashSet<String>> = vec![HashSet::new(); n];
    let mut record_counts = vec![0usize; n];
    let mut areas = vec![0.0f64; n];
    let mut without_identifier = 0;

    for record in records {
        let Some(text) = record.text(&request.category_field) else {
            continue;
        };
        let hits = matcher.matches(&text);
        if hits.is_empty() {
            continue;
        }

        let id = record.identifier(&request.identifier_field);
        if id.is_none() {
            without_identifier += 1;
        }
        let area = request
            .area_field
            .as_deref()
            .and_then(|f| record.number(f))
            .unwrap_or(0.0);

        for i in hits {
            record_counts[i] += 1;
            areas[i] += area;
            if let Some(id) = &id {
                sets[i].insert(id.clone());
            }
        }
    }

    let total = sets.iter().flatten().collect::<HashSet<_>>().len();
    let intersections = pairs
        .into_iter()
        .map(|(a, b)| PairIntersection {
            first: request.categories[a].clone(),
            second: request.categories[b].clone(),
            shared: sets[a].intersection(&sets[b]).count(),
        })
        .collect();
    let per_category = request
        .categories
        .iter()
        .enumerate()
        .map(|(i, term)| CategoryCount {
            term: term.clone(),
            participants: sets[i].len(),
            records: record_counts[i],
            area: request.area_field.as_ref().map(|_| areas[i]),
        })
        .collect();

    debug!(total, without_identifier, "aggregated participants");
    Ok(AggregationResult {
        per_category,
        intersections,
        total,
        without_identifier,
    })
}

fn resolve_pairs(
    matcher: &CategoryMatcher,
    pairs: &[(String, String)],
) -> Result<Vec<(usize, usize)>, AnalysisError> {
    pairs
        .iter()
        .map(|(a, b)| {
            let lookup = |term: &str| {
                matcher.position(term).ok_or_else(|| {
                    AnalysisError::InvalidRequest(format!(
                        "pair term {term:?} is not one of the requested categories"
                    ))
                })
            };
            Ok((lookup(a)?, lookup(b)?))
        })
        .collect()
}
