mod units;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use futures::{stream, StreamExt};
use grid_anomaly::ScanPipeline;
use grid_config::ConfigManager;
use grid_core::ingest::EdnaLineParser;
use grid_core::sink::open_sink;
use grid_core::{OutputFormat, ScanConfig};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use units::RunTotals;

#[derive(Parser, Debug)]
#[command(author, version, about = "Scan eDNA grid telemetry exports for anomalies", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of eDNA exports
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file for detected anomalies
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// First unit to scan
    #[arg(long)]
    start: Option<usize>,

    /// Last unit to scan (inclusive)
    #[arg(long)]
    end: Option<usize>,

    /// Units scanned in parallel
    #[arg(short, long)]
    jobs: Option<usize>,

    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Walk nested input directories
    #[arg(long)]
    recursive: bool,

    /// Omit the epoch column from CSV output
    #[arg(long)]
    no_epoch: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    dump_config: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    JsonLines,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Csv => OutputFormat::Csv,
            FormatArg::JsonLines => OutputFormat::JsonLines,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.debug, args.json_logs);

    let mut manager = ConfigManager::load(args.config.as_deref())?;
    apply_overrides(manager.get_config_mut(), &args);
    manager.validate()?;
    let config = manager.into_config();

    if args.dump_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    info!("Starting grid anomaly scan");
    run(config).await
}

fn init_logging(debug: bool, json: bool) {
    let env_filter = if debug { "debug" } else { "info" };

    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| env_filter.into()),
    );

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn apply_overrides(config: &mut ScanConfig, args: &Args) {
    if let Some(input) = &args.input {
        config.input.dir = input.clone();
    }
    if let Some(output) = &args.output {
        config.output.path = output.clone();
    }
    if let Some(start) = args.start {
        config.input.start_unit = start;
    }
    if args.end.is_some() {
        config.input.end_unit = args.end;
    }
    if let Some(jobs) = args.jobs {
        config.input.jobs = jobs;
    }
    if let Some(format) = args.format {
        config.output.format = format.into();
    }
    if args.recursive {
        config.input.recursive = true;
    }
    if args.no_epoch {
        config.output.epoch_column = false;
    }
}

async fn run(config: ScanConfig) -> Result<()> {
    let started = Instant::now();
    let all_units = units::enumerate_units(&config.input)?;
    let total_units = all_units.len();
    let selected = units::select_units(all_units, config.input.start_unit, config.input.end_unit);

    if selected.is_empty() {
        warn!(
            "No units selected from {} ({} files found)",
            config.input.dir.display(),
            total_units
        );
    }
    info!(
        "Scanning {} of {} units from {} with {} jobs",
        selected.len(),
        total_units,
        config.input.dir.display(),
        config.input.jobs
    );

    let pipeline = ScanPipeline::new(config.detection.clone());
    let parser = EdnaLineParser::new(config.input.timestamp_format.clone());
    let mut sink = open_sink(&config.output)?;
    let mut totals = RunTotals::default();

    // Units run on blocking workers; `buffered` yields them back in unit order.
    let mut outcomes = stream::iter(selected.into_iter().map(|unit| {
        let pipeline = pipeline.clone();
        let parser = parser.clone();
        tokio::task::spawn_blocking(move || units::scan_unit(&pipeline, &parser, unit))
    }))
    .buffered(config.input.jobs);

    while let Some(joined) = outcomes.next().await {
        let outcome = joined??;
        sink.write_events(&outcome.report.events)?;
        debug!(
            "Wrote {} events for unit {}",
            outcome.report.events.len(),
            outcome.unit.index
        );
        totals.record(&outcome);
    }
    sink.flush()?;

    info!(
        units = totals.units,
        readings = totals.readings,
        skipped = totals.skipped,
        emitted = totals.emitted,
        elapsed_ms = started.elapsed().as_millis() as u64,
        scan_ms = totals.scan_time.as_millis() as u64,
        "Run complete: {}",
        totals.summary(&config.detection)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::try_parse_from([
            "grid-scan",
            "--input",
            "/data/edna",
            "--start",
            "2",
            "--end",
            "4",
            "--jobs",
            "3",
            "--format",
            "json-lines",
            "--no-epoch",
        ])
        .unwrap();

        let mut config = ScanConfig::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.input.dir, PathBuf::from("/data/edna"));
        assert_eq!(config.input.start_unit, 2);
        assert_eq!(config.input.end_unit, Some(4));
        assert_eq!(config.input.jobs, 3);
        assert_eq!(config.output.format, OutputFormat::JsonLines);
        assert!(!config.output.epoch_column);
        assert!(!config.input.recursive);
    }

    #[test]
    fn test_no_flags_keep_config() {
        let args = Args::try_parse_from(["grid-scan"]).unwrap();
        let mut config = ScanConfig::default();
        config.input.end_unit = Some(9);
        apply_overrides(&mut config, &args);

        assert_eq!(config.input.end_unit, Some(9));
        assert_eq!(config.input.jobs, 1);
        assert!(config.output.epoch_column);
    }
}
