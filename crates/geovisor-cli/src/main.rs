//! geovisor: participant statistics, overlay analysis, coordinate conversion
//! and CSV export over GeoJSON or point CSV files, or remote feature services.
//!
//! Usage:
//!   geovisor stats <layer> [--category <term>]... [--pair <a:b>]... [--by-group]
//!   geovisor overlay <candidates> <reference> [--strategy <name>] [--output <dir>]
//!   geovisor convert geo --zone 18S --easting <m> --northing <m>
//!   geovisor convert utm --lat <deg> --lon <deg> [--zone <zone>]
//!   geovisor export <layer> [--output <file>]

mod display;
mod layer;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use geovisor_analysis::{
    AggregationResult, CancellationFlag, MapContext, Missing, Outcome, Strategy, table,
};
use geovisor_core::{
    AnalysisConfig, Filter, GeoPoint, UtmPoint, UtmZone, export_file_name, to_csv,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "geovisor", version)]
#[command(about = "Agricultural monitoring analysis over feature layers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Analysis config file (JSON)
    #[arg(long, global = true, env = "GEOVISOR_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL that relative layer paths resolve against
    #[arg(long, global = true, env = "GEOVISOR_SERVICE_URL")]
    service_url: Option<String>,

    /// Records per page when paging through a layer
    #[arg(long, global = true)]
    page_size: Option<usize>,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Count unique participants per crop category
    Stats {
        /// GeoJSON or CSV file, layer URL, or layer path under the service URL
        layer: String,

        /// Category term (repeatable); replaces the configured categories
        #[arg(short, long = "category")]
        categories: Vec<String>,

        /// Category pair as FIRST:SECOND (repeatable)
        #[arg(short, long = "pair", value_parser = parse_pair)]
        pairs: Vec<(String, String)>,

        /// Only records whose FIELD contains TEXT, given as FIELD=TEXT
        #[arg(long, value_parser = parse_contains)]
        contains: Option<Filter>,

        /// Split the statistics by zonal office
        #[arg(long)]
        by_group: bool,
    },

    /// Find candidate polygons that intersect a reference layer
    Overlay {
        /// Layer with the polygons to test
        candidates: String,

        /// Layer the candidates are tested against
        reference: String,

        /// unioned-geometry or live-spatial-query
        #[arg(long, default_value = "unioned-geometry")]
        strategy: Strategy,

        /// Candidates tested concurrently per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Directory the CSV of overlaps is written to
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Convert between UTM and geographic coordinates
    Convert {
        #[command(subcommand)]
        to: Convert,
    },

    /// Export every record of a layer to CSV
    Export {
        layer: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum Convert {
    /// UTM to latitude/longitude
    Geo {
        /// 17S, 18S or 19S
        #[arg(long)]
        zone: UtmZone,

        #[arg(long)]
        easting: f64,

        #[arg(long)]
        northing: f64,
    },

    /// Latitude/longitude to UTM
    Utm {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Force a zone instead of deriving it from the longitude
        #[arg(long)]
        zone: Option<UtmZone>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    info!("geovisor v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(page_size) = cli.page_size {
        config.page_size = page_size;
    }
    let service_url = cli.service_url.as_deref();

    match cli.command {
        Commands::Stats {
            layer,
            categories,
            pairs,
            contains,
            by_group,
        } => {
            if !categories.is_empty() {
                config.categories = categories;
                config.pairs = pairs;
            } else if !pairs.is_empty() {
                config.pairs = pairs;
            }
            let filter = contains.unwrap_or_default();
            run_stats(config, &layer, service_url, &filter, by_group).await
        }
        Commands::Overlay {
            candidates,
            reference,
            strategy,
            batch_size,
            output,
        } => {
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            run_overlay(config, &candidates, &reference, service_url, strategy, &output).await
        }
        Commands::Convert { to } => run_convert(to),
        Commands::Export { layer, output } => {
            run_export(config, &layer, service_url, output.as_deref()).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

async fn context_with(
    config: AnalysisConfig,
    layers: &[&str],
    service_url: Option<&str>,
) -> anyhow::Result<(MapContext, Vec<String>)> {
    config.validate().context("invalid configuration")?;
    let mut ctx = MapContext::new(config);
    let mut names = Vec::with_capacity(layers.len());
    for arg in layers {
        let source = layer::open(arg, service_url).await?;
        let name = source.name().to_string();
        if names.contains(&name) {
            bail!("layers share the name {name}; rename one of the files");
        }
        ctx.register(source);
        names.push(name);
    }
    Ok((ctx, names))
}

// ── stats ──

async fn run_stats(
    config: AnalysisConfig,
    layer: &str,
    service_url: Option<&str>,
    filter: &Filter,
    by_group: bool,
) -> anyhow::Result<()> {
    let (ctx, names) = context_with(config, &[layer], service_url).await?;
    let name = &names[0];

    if by_group {
        let groups = match ctx.statistics_by_group(name, filter).await? {
            Outcome::Completed(groups) => groups,
            Outcome::NoSelection(missing) => return warn_no_selection(missing),
        };
        let rows = || groups.iter().map(|(k, v)| (Some(k.as_str()), v));
        display::print_table("Participants by zonal office", &table::category_stats_batch(rows())?)?;
        display::print_table("Shared participants", &table::pair_intersection_batch(rows())?)?;
    } else {
        let result = match ctx.statistics(name, filter).await? {
            Outcome::Completed(result) => result,
            Outcome::NoSelection(missing) => return warn_no_selection(missing),
        };
        print_stats(name, &result)?;
    }
    Ok(())
}

fn print_stats(layer: &str, result: &AggregationResult) -> anyhow::Result<()> {
    display::print_table(
        &format!("Participants in {layer}"),
        &table::category_stats_batch([(None, result)])?,
    )?;
    if !result.intersections.is_empty() {
        display::print_table(
            "Shared participants",
            &table::pair_intersection_batch([(None, result)])?,
        )?;
    }
    display::print_totals(result);
    Ok(())
}

// ── overlay ──

async fn run_overlay(
    config: AnalysisConfig,
    candidates: &str,
    reference: &str,
    service_url: Option<&str>,
    strategy: Strategy,
    output: &Path,
) -> anyhow::Result<()> {
    let fields = config.fields.clone();
    let (ctx, names) = context_with(config, &[candidates, reference], service_url).await?;
    let (candidate_layer, reference_layer) = (&names[0], &names[1]);

    let records = ctx
        .fetch_layer(candidate_layer, &Filter::All)
        .await
        .with_context(|| format!("reading candidates from {candidate_layer}"))?;

    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = ctx
        .overlay(
            &records,
            reference_layer,
            strategy,
            &display::progress_line,
            Some(&cancel),
        )
        .await;
    eprintln!();

    let outcome = match outcome? {
        Outcome::Completed(outcome) => outcome,
        Outcome::NoSelection(missing) => return warn_no_selection(missing),
    };
    display::print_overlay_summary(&outcome);

    if !outcome.is_complete() {
        warn!(
            reference = %reference_layer,
            failed_tests = outcome.failed_tests,
            cancelled = outcome.cancelled,
            "overlay run incomplete"
        );
        eprintln!(
            "warning: incomplete run ({} of {} tests failed{}); results are partial",
            outcome.failed_tests,
            outcome.progress.total,
            if outcome.cancelled { ", cancelled" } else { "" }
        );
    }
    if outcome.is_empty() {
        if outcome.is_complete() {
            warn!(reference = %reference_layer, "no overlaps found");
            eprintln!("warning: no candidate overlaps {reference_layer}");
        }
        return Ok(());
    }
    display::print_table(
        "Overlaps",
        &table::overlay_match_batch(&outcome.matches, &fields)?,
    )?;

    let path = output.join(export_file_name(reference_layer));
    std::fs::write(&path, outcome.to_csv())
        .with_context(|| format!("writing {}", path.display()))?;
    eprintln!("  Wrote {} overlaps to {}", outcome.matches.len(), path.display());
    Ok(())
}

// ── convert ──

fn run_convert(to: Convert) -> anyhow::Result<()> {
    match to {
        Convert::Geo {
            zone,
            easting,
            northing,
        } => {
            let utm = UtmPoint::new(zone, easting, northing)?;
            display::print_geographic(&utm.to_geographic()?);
        }
        Convert::Utm { lat, lon, zone } => {
            let point = GeoPoint::new(lat, lon)?;
            let utm = match zone {
                Some(zone) => point.to_utm_in(zone)?,
                None => point.to_utm()?,
            };
            display::print_utm(&utm);
        }
    }
    Ok(())
}

// ── export ──

async fn run_export(
    config: AnalysisConfig,
    layer: &str,
    service_url: Option<&str>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let (ctx, names) = context_with(config, &[layer], service_url).await?;
    let records = ctx.fetch_layer(&names[0], &Filter::All).await?;
    if records.is_empty() {
        return warn_no_selection(Missing::Records);
    }

    let csv = to_csv(&records);
    match output {
        Some(path) => {
            std::fs::write(path, csv).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("  Wrote {} records to {}", records.len(), path.display());
        }
        None => println!("{csv}"),
    }
    Ok(())
}

/// Nothing to analyse is reported, not treated as a failure.
fn warn_no_selection(missing: Missing) -> anyhow::Result<()> {
    let message = match missing {
        Missing::Candidates => "the candidate layer has no features",
        Missing::Reference => "the reference layer has no features",
        Missing::Records => "no records matched the selection",
    };
    warn!("{message}");
    eprintln!("warning: {message}");
    Ok(())
}

// ── argument parsing ──

fn parse_pair(s: &str) -> Result<(String, String), String> {
    let (a, b) = s
        .split_once(':')
        .ok_or_else(|| format!("expected FIRST:SECOND, got {s:?}"))?;
    let (a, b) = (a.trim(), b.trim());
    if a.is_empty() || b.is_empty() {
        return Err(format!("expected FIRST:SECOND, got {s:?}"));
    }
    Ok((a.to_string(), b.to_string()))
}

fn parse_contains(s: &str) -> Result<Filter, String> {
    let (field, text) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=TEXT, got {s:?}"))?;
    if field.trim().is_empty() {
        return Err(format!("expected FIELD=TEXT, got {s:?}"));
    }
    Ok(Filter::contains(field.trim(), text.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn pairs() {
        assert_eq!(
            parse_pair("cafe:cacao"),
            Ok(("cafe".to_string(), "cacao".to_string()))
        );
        assert!(parse_pair("cafe").is_err());
        assert!(parse_pair("cafe:").is_err());
    }

    #[test]
    fn contains_filter() {
        assert_eq!(
            parse_contains("tipo_cultivo=café").unwrap(),
            Filter::contains("tipo_cultivo", "café")
        );
        assert!(parse_contains("=cafe").is_err());
    }

    #[test]
    fn stats_arguments() {
        let cli = Cli::try_parse_from([
            "geovisor", "stats", "padron.geojson", "-c", "cafe", "-c", "cacao", "-c", "platano",
            "-p", "cacao:platano", "--by-group",
        ])
        .unwrap();
        match cli.command {
            Commands::Stats {
                categories,
                pairs,
                by_group,
                ..
            } => {
                assert_eq!(categories.len(), 3);
                assert_eq!(pairs, vec![("cacao".to_string(), "platano".to_string())]);
                assert!(by_group);
            }
            _ => panic!("expected stats"),
        }
    }

    #[test]
    fn overlay_strategy_argument() {
        let cli = Cli::try_parse_from([
            "geovisor", "overlay", "mine.geojson", "ugc.geojson", "--strategy", "live-spatial-query",
        ])
        .unwrap();
        match cli.command {
            Commands::Overlay { strategy, .. } => {
                assert_eq!(strategy, Strategy::LiveSpatialQuery)
            }
            _ => panic!("expected overlay"),
        }
        assert!(
            Cli::try_parse_from(["geovisor", "overlay", "a", "b", "--strategy", "nearest"]).is_err()
        );
    }

    #[test]
    fn negative_coordinates() {
        let cli = Cli::try_parse_from([
            "geovisor", "convert", "utm", "--lat", "-12.05", "--lon", "-77.04",
        ])
        .unwrap();
        match cli.command {
            Commands::Convert {
                to: Convert::Utm { lat, lon, zone },
            } => {
                assert_eq!(lat, -12.05);
                assert_eq!(lon, -77.04);
                assert!(zone.is_none());
            }
            _ => panic!("expected convert utm"),
        }
    }
}
