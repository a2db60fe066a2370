//! CSV export of records for download.
//!
//! Minimal RFC 4180 output: every field is double-quoted and embedded quotes
//! are doubled. The header is the first record's attribute keys in source
//! order; later records missing a key get an empty quoted field.

use crate::record::{Record, value_to_string};

/// Serialise records to CSV text. Empty input yields an empty string.
pub fn to_csv(records: &[Record]) -> String {
    let Some(first) = records.first() else {
        return String::new();
    };
    let header: Vec<&str> = first.attributes.keys().map(|k| k.as_str()).collect();

    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(csv_row(header.iter().map(|k| k.to_string())));
    for record in records {
        lines.push(csv_row(header.iter().map(|key| {
            record
                .attributes
                .get(*key)
                .map(value_to_string)
                .unwrap_or_default()
        })));
    }
    lines.join("\n")
}

/// File name for an overlay export against the named reference layer.
pub fn export_file_name(reference_name: &str) -> String {
    let safe: String = reference_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("overlaps_{safe}.csv")
}

/// MIME type handed to the download boundary.
pub const CSV_MIME_TYPE: &str = "text/csv;charset=utf-8";

fn csv_row(values: impl Iterator<Item = String>) -> String {
    values
        .map(|v| format!("\"{}\"", v.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    use arrow::array::{Array, StringArray};
    use arrow::csv::ReaderBuilder;
    use arrow::datatypes::{DataType, Field, Schema};
    use serde_json::{Value, json};

    fn record(value: Value) -> Record {
        Record::new(value.as_object().cloned().unwrap())
    }

    #[test]
    fn quotes_every_field() {
        let csv = to_csv(&[record(json!({"a": "1", "b": "x,y"}))]);
        assert_eq!(csv, "\"a\",\"b\"\n\"1\",\"x,y\"");
    }

    #[test]
    fn roundtrip_through_csv_reader() {
        let csv = to_csv(&[record(json!({"a": "1", "b": "x,y"}))]);

        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Utf8, true),
            Field::new("b", DataType::Utf8, true),
        ]));
        let mut reader = ReaderBuilder::new(schema)
            .with_header(true)
            .build(Cursor::new(csv.into_bytes()))
            .unwrap();
        let batch = reader.next().unwrap().unwrap();
        assert_eq!(batch.num_rows(), 1);

        let a = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        let b = batch.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(a.value(0), "1");
        assert_eq!(b.value(0), "x,y");
    }

    #[test]
    fn doubles_embedded_quotes() {
        let csv = to_csv(&[record(json!({"name": "Fundo \"El Sol\""}))]);
        assert_eq!(csv, "\"name\"\n\"Fundo \"\"El Sol\"\"\"");
    }

    #[test]
    fn missing_keys_render_empty() {
        let csv = to_csv(&[
            record(json!({"dni": "1", "area": 2.5})),
            record(json!({"dni": "2"})),
            record(json!({"area": null, "extra": "ignored"})),
        ]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "\"dni\",\"area\"");
        assert_eq!(lines[1], "\"1\",\"2.5\"");
        assert_eq!(lines[2], "\"2\",\"\"");
        assert_eq!(lines[3], "\"\",\"\"");
    }

    #[test]
    fn header_follows_first_record_order() {
        let csv = to_csv(&[record(json!({"zeta": 1, "alpha": 2}))]);
        assert!(csv.starts_with("\"zeta\",\"alpha\"\n"));
    }

    #[test]
    fn empty_input() {
        assert_eq!(to_csv(&[]), "");
    }

    #[test]
    fn file_name() {
        assert_eq!(export_file_name("anp"), "overlaps_anp.csv");
        assert_eq!(
            export_file_name("Zonas de Amortiguamiento"),
            "overlaps_Zonas_de_Amortiguamiento.csv"
        );
    }
}
