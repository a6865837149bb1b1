//! fibrelink-bench: CLI tool for reconnection parameter experimentation.
//!
//! Builds a synthetic graph of broken filaments, runs the reconnection
//! engine on it with configurable parameters, and prints per-phase
//! diagnostics. Useful for:
//!
//! - Comparing the thorough and fast variants on the same input
//! - Tuning length windows and connection limits
//! - Measuring how mask enforcement and graph size affect run time
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin fibrelink-bench -- [OPTIONS]
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use fibrelink_engine::constraint::{EndpointGap, ShortestGap};
use fibrelink_engine::diagnostics::{Clock, ConnectDiagnostics};
use fibrelink_engine::synthetic::BrokenFilaments;
use fibrelink_engine::{
    CancellationToken, ConnectConfig, ConstraintPolicy, FastConstraints, LengthSortOrder,
    MaskVolume, Reconnector, ThoroughConstraints, ValueRange,
};

/// Reconnection parameter experimentation and diagnostics for fibrelink.
///
/// Runs the engine on a synthetic broken-filament graph and prints
/// per-phase timing and rejection statistics.
#[derive(Parser)]
#[command(name = "fibrelink-bench", version)]
struct Cli {
    /// Engine variant.
    #[arg(long, value_enum, default_value_t = Variant::Fast)]
    variant: Variant,

    /// Number of synthetic filaments.
    #[arg(long, default_value_t = BrokenFilaments::default().filaments)]
    filaments: usize,

    /// Vertices per filament piece.
    #[arg(long, default_value_t = BrokenFilaments::default().points_per_piece)]
    points_per_piece: usize,

    /// Distance between consecutive vertices of a piece.
    #[arg(long, default_value_t = BrokenFilaments::default().spacing)]
    spacing: f64,

    /// Length of the break in each filament.
    #[arg(long, default_value_t = BrokenFilaments::default().gap)]
    gap: f64,

    /// Distance between neighbouring filaments.
    #[arg(long, default_value_t = BrokenFilaments::default().row_spacing)]
    row_spacing: f64,

    /// Number of z planes the filaments cycle through.
    #[arg(long, default_value_t = BrokenFilaments::default().slices)]
    slices: usize,

    /// Maximum new edges per vertex (unlimited when omitted).
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    limit: Option<u32>,

    /// Minimum candidate length (fast variant).
    #[arg(long, default_value_t = FastConstraints::DEFAULT_LENGTH_RANGE.min)]
    min_length: f64,

    /// Maximum candidate length (fast variant).
    #[arg(long, default_value_t = FastConstraints::DEFAULT_LENGTH_RANGE.max)]
    max_length: f64,

    /// Length preference of the fast variant.
    #[arg(long, value_enum, default_value_t = Order::Ascending)]
    order: Order,

    /// Maximum gap bridged by the thorough variant's endpoint predicate.
    #[arg(long, default_value_t = EndpointGap::DEFAULT_MAX_LENGTH)]
    max_gap: f64,

    /// Compare positions in 2D only.
    #[arg(long)]
    no_3d: bool,

    /// Mask slices (PNG or TIFF), in z order. Zero pixels are background.
    #[arg(long, num_args = 1..)]
    mask: Vec<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full connect config as a JSON string.
    ///
    /// When provided, `--limit` and `--no-3d` are ignored. The JSON must
    /// be a valid `ConnectConfig` serialization; missing fields take their
    /// defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Engine variant selection.
#[derive(Clone, Copy, ValueEnum)]
enum Variant {
    /// Predicate-driven, direction and path aware, marches the mask.
    Thorough,
    /// Numeric range filters, samples the mask at the source only.
    Fast,
}

/// Length preference selection.
#[derive(Clone, Copy, ValueEnum)]
enum Order {
    /// Shortest candidates first.
    Ascending,
    /// Longest candidates first.
    Descending,
}

/// Build a [`ConnectConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<ConnectConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(ConnectConfig {
        limit_connections: cli.limit,
        enable_3d: !cli.no_3d,
        ..ConnectConfig::default()
    })
}

/// Build the variant parameters from CLI arguments.
fn policy_from_cli(cli: &Cli) -> ConstraintPolicy {
    match cli.variant {
        Variant::Thorough => ConstraintPolicy::Thorough(
            ThoroughConstraints::new(EndpointGap {
                max_length: cli.max_gap,
            })
            .with_scorer(ShortestGap),
        ),
        Variant::Fast => ConstraintPolicy::Fast(FastConstraints {
            length_range: ValueRange::new(cli.min_length, cli.max_length),
            sort_order: match cli.order {
                Order::Ascending => LengthSortOrder::Ascending,
                Order::Descending => LengthSortOrder::Descending,
            },
            ..FastConstraints::default()
        }),
    }
}

/// Load and stack the mask slices, if any were given.
fn mask_from_cli(cli: &Cli) -> Result<Option<MaskVolume>, String> {
    if cli.mask.is_empty() {
        return Ok(None);
    }
    let mut slices = Vec::with_capacity(cli.mask.len());
    for path in &cli.mask {
        let img =
            image::open(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        slices.push(img.to_luma8());
    }
    MaskVolume::new(slices)
        .map(Some)
        .map_err(|e| format!("Error building mask: {e}"))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let mask = match mask_from_cli(&cli) {
        Ok(m) => m,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let fixture = BrokenFilaments {
        filaments: cli.filaments,
        points_per_piece: cli.points_per_piece,
        spacing: cli.spacing,
        gap: cli.gap,
        row_spacing: cli.row_spacing,
        slices: cli.slices,
    };

    let engine = match Reconnector::new(config, policy_from_cli(&cli)) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!("Fixture: {fixture:?}");
    eprintln!("Engine: {engine:#?}");
    if let Some(ref m) = mask {
        eprintln!("Mask: {}x{}x{}", m.width(), m.height(), m.depth());
    }
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    tracing::debug!(
        vertices = fixture.filaments * fixture.points_per_piece * 2,
        breaks = fixture.break_count(),
        "built synthetic fixture"
    );

    let cancel = CancellationToken::new();
    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let mut graph = fixture.build();
        let (outcome, diagnostics) =
            engine.run_with_diagnostics(&mut graph, mask.as_ref(), &cancel, &StdClock);

        if cli.json {
            match serde_json::to_string_pretty(&diagnostics) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("{}", diagnostics.report());
        }

        if run == 0 {
            eprintln!(
                "Closed {}/{} breaks",
                outcome.created.min(fixture.break_count()),
                fixture.break_count(),
            );
        }

        all_diagnostics.push(diagnostics);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a phase duration from diagnostics.
type StageExtractor = fn(&ConnectDiagnostics) -> Option<Duration>;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[ConnectDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Selection", |d| Some(d.selection.duration)),
        ("Generation", |d| Some(d.generation.duration)),
        ("Commit", |d| d.commit.as_ref().map(|s| s.duration)),
    ];

    for (name, extractor) in stage_extractors {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(extractor)
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
