//! Arrow record batches of analysis results, for tabular display.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray, UInt64Array};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use geovisor_core::{FieldMap, tables};

use crate::aggregate::AggregationResult;
use crate::overlay::OverlayMatch;

/// One row per (group, category). Pass `None` as the group for an
/// ungrouped result.
pub fn category_stats_batch<'a>(
    results: impl IntoIterator<Item = (Option<&'a str>, &'a AggregationResult)>,
) -> Result<RecordBatch, ArrowError> {
    let mut groups: Vec<Option<String>> = Vec::new();
    let mut categories = Vec::new();
    let mut participants = Vec::new();
    let mut records = Vec::new();
    let mut areas = Vec::new();

    for (group, result) in results {
        for count in &result.per_category {
            groups.push(group.map(str::to_string));
            categories.push(count.term.clone());
            participants.push(count.participants as u64);
            records.push(count.records as u64);
            areas.push(count.area);
        }
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(groups)),
        Arc::new(StringArray::from(categories)),
        Arc::new(UInt64Array::from(participants)),
        Arc::new(UInt64Array::from(records)),
        Arc::new(Float64Array::from(areas)),
    ];
    RecordBatch::try_new(Arc::new(tables::category_stats_schema()), columns)
}

/// One row per (group, requested pair).
pub fn pair_intersection_batch<'a>(
    results: impl IntoIterator<Item = (Option<&'a str>, &'a AggregationResult)>,
) -> Result<RecordBatch, ArrowError> {
    let mut groups: Vec<Option<String>> = Vec::new();
    let mut firsts = Vec::new();
    let mut seconds = Vec::new();
    let mut shared = Vec::new();

    for (group, result) in results {
        for pair in &result.intersections {
            groups.push(group.map(str::to_string));
            firsts.push(pair.first.clone());
            seconds.push(pair.second.clone());
            shared.push(pair.shared as u64);
        }
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(groups)),
        Arc::new(StringArray::from(firsts)),
        Arc::new(StringArray::from(seconds)),
        Arc::new(UInt64Array::from(shared)),
    ];
    RecordBatch::try_new(Arc::new(tables::pair_intersection_schema()), columns)
}

/// Matches projected onto identifier, category and area.
pub fn overlay_match_batch(
    matches: &[OverlayMatch],
    fields: &FieldMap,
) -> Result<RecordBatch, ArrowError> {
    let identifiers: Vec<Option<String>> = matches
        .iter()
        .map(|m| m.candidate.identifier(&fields.identifier))
        .collect();
    let categories: Vec<Option<String>> = matches
        .iter()
        .map(|m| m.candidate.text(&fields.category))
        .collect();
    let areas: Vec<Option<f64>> = matches
        .iter()
        .map(|m| m.candidate.number(&fields.area))
        .collect();
    let against: Vec<&str> = matches.iter().map(|m| m.matched_against.as_str()).collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(identifiers)),
        Arc::new(StringArray::from(categories)),
        Arc::new(Float64Array::from(areas)),
        Arc::new(StringArray::from(against)),
    ];
    RecordBatch::try_new(Arc::new(tables::overlay_match_schema()), columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregationRequest, aggregate, aggregate_by_group};
    use arrow::array::Array;
    use geo::Rect;
    use geovisor_core::Record;
    use serde_json::json;

    fn record(dni: &str, cultivo: &str, area: f64, office: &str) -> Record {
        Record::new(
            json!({"dni": dni, "tipo_cultivo": cultivo, "area_atendida": area, "oficina_zonal": office})
                .as_object()
                .cloned()
                .unwrap(),
        )
    }

    fn records() -> Vec<Record> {
        vec![
            record("1", "Café", 1.5, "Jaén"),
            record("2", "Cacao", 2.0, "Jaén"),
            record("2", "café", 1.0, "Satipo"),
        ]
    }

    fn request() -> AggregationRequest {
        AggregationRequest::new("tipo_cultivo", "dni", &["cafe", "cacao"])
            .with_area("area_atendida")
            .with_pair("cafe", "cacao")
    }

    #[test]
    fn stats_rows() {
        let result = aggregate(&records(), &request()).unwrap();
        let batch = category_stats_batch([(None, &result)]).unwrap();
        assert_eq!(batch.num_rows(), 2);

        let participants = batch
            .column(2)
            .as_any()
            .downcast_ref::<UInt64Array>()
            .unwrap();
        assert_eq!(participants.value(0), 2);
        assert_eq!(participants.value(1), 1);

        let areas = batch
            .column(4)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert!((areas.value(0) - 2.5).abs() < 1e-9);
        assert!(batch.column(0).is_null(0));
    }

    #[test]
    fn grouped_rows() {
        let groups = aggregate_by_group(&records(), "oficina_zonal", &request()).unwrap();
        let batch =
            category_stats_batch(groups.iter().map(|(k, v)| (Some(k.as_str()), v))).unwrap();
        assert_eq!(batch.num_rows(), 4);

        let pairs =
            pair_intersection_batch(groups.iter().map(|(k, v)| (Some(k.as_str()), v))).unwrap();
        assert_eq!(pairs.num_rows(), 2);
        let group = pairs
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(group.value(0), "Jaén");
    }

    #[test]
    fn match_rows() {
        let candidate = record("7", "Cacao", 3.25, "Jaén")
            .with_geometry(Rect::new((0.0, 0.0), (1.0, 1.0)).to_polygon().into());
        let matches = vec![OverlayMatch {
            geometry: candidate.geometry.clone().unwrap(),
            candidate,
            matched_against: "ugc".into(),
        }];
        let batch = overlay_match_batch(&matches, &FieldMap::default()).unwrap();
        assert_eq!(batch.num_rows(), 1);
        let ids = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(ids.value(0), "7");
    }

    #[test]
    fn empty_results() {
        let batch = category_stats_batch(std::iter::empty()).unwrap();
        assert_eq!(batch.num_rows(), 0);
        let batch = overlay_match_batch(&[], &FieldMap::default()).unwrap();
        assert_eq!(batch.num_rows(), 0);
    }
}
