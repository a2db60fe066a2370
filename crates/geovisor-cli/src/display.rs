//! Terminal output for analysis results.
//!
//! Tables go to stdout through Arrow's pretty printer; progress and warnings
//! go to stderr so stdout stays pipeable.

use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use geovisor_analysis::{AggregationResult, OverlayOutcome, Progress};
use geovisor_core::{GeoPoint, UtmPoint};

// ── Tables ──

/// Print a titled table; an empty batch prints a placeholder.
pub fn print_table(title: &str, batch: &RecordBatch) -> anyhow::Result<()> {
    println!("=== {title} ===");
    if batch.num_rows() == 0 {
        println!("  (none)");
    } else {
        println!("{}", pretty_format_batches(std::slice::from_ref(batch))?);
    }
    println!();
    Ok(())
}

pub fn print_totals(result: &AggregationResult) {
    println!("  {:<26} {}", "unique participants", result.total);
    if result.without_identifier > 0 {
        println!(
            "  {:<26} {}",
            "records without identifier", result.without_identifier
        );
    }
    println!();
}

// ── Overlay ──

/// Single-line progress, rewritten in place after each batch.
pub fn progress_line(progress: Progress) {
    eprint!(
        "\r  Tested {}/{} ({:.1}%), {} overlaps",
        progress.processed,
        progress.total,
        progress.fraction() * 100.0,
        progress.matches_so_far
    );
}

pub fn print_overlay_summary(outcome: &OverlayOutcome) {
    println!("=== Overlay against {} ===", outcome.reference);
    println!("  {:<26} {}", "strategy", outcome.strategy);
    println!("  {:<26} {}", "candidates tested", outcome.progress.processed);
    println!("  {:<26} {}", "overlaps", outcome.matches.len());
    if outcome.skipped > 0 {
        println!("  {:<26} {}", "skipped (not polygons)", outcome.skipped);
    }
    if outcome.failed_tests > 0 {
        println!("  {:<26} {}", "failed tests", outcome.failed_tests);
    }
    if outcome.cancelled {
        println!("  {:<26} yes", "cancelled");
    }
    println!(
        "  {:<26} {:.1}s",
        "elapsed",
        outcome.elapsed().num_milliseconds() as f64 / 1000.0
    );
    println!();
}

// ── Coordinates ──

pub fn print_geographic(point: &GeoPoint) {
    println!("  {:<26} {:.6}", "latitude", point.lat);
    println!("  {:<26} {:.6}", "longitude", point.lon);
}

pub fn print_utm(point: &UtmPoint) {
    println!("  {:<26} {} (EPSG:{})", "zone", point.zone, point.zone.epsg());
    println!("  {:<26} {:.2}", "easting", point.easting);
    println!("  {:<26} {:.2}", "northing", point.northing);
}
