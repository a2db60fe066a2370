/// Arrow schemas for tabular analysis output.
pub mod tables {
    use arrow::datatypes::{DataType, Field, Schema};

    /// One row per category term.
    pub fn category_stats_schema() -> Schema {
        Schema::new(vec![
            Field::new("group", DataType::Utf8, true),
            Field::new("category", DataType::Utf8, false),
            Field::new("participants", DataType::UInt64, false),
            Field::new("records", DataType::UInt64, false),
            Field::new("area_ha", DataType::Float64, true),
        ])
    }

    /// One row per requested category pair.
    pub fn pair_intersection_schema() -> Schema {
        Schema::new(vec![
            Field::new("group", DataType::Utf8, true),
            Field::new("first", DataType::Utf8, false),
            Field::new("second", DataType::Utf8, false),
            Field::new("shared_participants", DataType::UInt64, false),
        ])
    }

    /// One row per overlay match.
    pub fn overlay_match_schema() -> Schema {
        Schema::new(vec![
            Field::new("identifier", DataType::Utf8, true),
            Field::new("category", DataType::Utf8, true),
            Field::new("area_ha", DataType::Float64, true),
            Field::new("matched_against", DataType::Utf8, false),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::tables;

    #[test]
    fn category_stats_schema_has_expected_fields() {
        let schema = tables::category_stats_schema();
        assert_eq!(schema.fields().len(), 5);
        assert!(schema.field_with_name("participants").is_ok());
        assert!(schema.field_with_name("area_ha").unwrap().is_nullable());
    }

    #[test]
    fn overlay_match_schema_has_expected_fields() {
        let schema = tables::overlay_match_schema();
        assert_eq!(schema.fields().len(), 4);
        assert!(!schema.field_with_name("matched_against").unwrap().is_nullable());
    }
}
