//! simbands - quantile bands for stochastic simulation ensembles
//!
//! A CLI tool that aggregates many runs of a stochastic simulation into
//! per-tick quantile tables and compares them against a reference model.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Any failure (discovery, parse, I/O, configuration)

mod analysis;
mod cli;
mod config;
mod discovery;
mod ensemble;
mod error;
mod models;
mod report;

use analysis::comparison::{self, ComparisonSettings, LabeledTable};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use cli::{AggregateArgs, Args, Command, CompareArgs, OutputFormat, ReferenceArgs};
use config::{Config, ScenarioConfig, DEFAULT_CONFIG_FILE};
use discovery::{DiscoveryConfig, RunDiscovery, RunPattern};
use ensemble::{LoadOptions, NetlogoOptions};
use models::{AggregatedTable, AggregationSummary, RunEnsemble};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config(&args);
    }

    // Load configuration before logging so its verbosity applies
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(&args, config.general.verbose);

    info!("simbands v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(&args, &config) {
        error!("Command failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle init-config: generate a default .simbands.toml.
fn handle_init_config(args: &Args) -> Result<()> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            path.display()
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(&path, &content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("✅ Created {} with default settings.", path.display());
    println!("   Edit it to add scenarios and tune discovery and reference parsing.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config_verbose: bool) {
    let level = if config_verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch the command.
fn run(args: &Args, config: &Config) -> Result<()> {
    match &args.command {
        Command::Aggregate(cmd) => run_aggregate(config, cmd),
        Command::Reference(cmd) => run_reference(config, cmd),
        Command::Compare(cmd) => run_compare(config, cmd),
        Command::InitConfig => Ok(()),
    }
}

/// Aggregate numbered run files into one table.
fn run_aggregate(config: &Config, cmd: &AggregateArgs) -> Result<()> {
    let start_time = Instant::now();
    let scenario = select_scenario(config, cmd.scenario.as_deref())?;

    let raw_pattern = cmd
        .pattern
        .clone()
        .or_else(|| scenario.and_then(|s| s.run_pattern.clone()))
        .context("No run pattern: pass --pattern or set run_pattern in the scenario")?;
    let output = cmd
        .output
        .clone()
        .or_else(|| scenario.and_then(|s| s.output.clone()))
        .context("No output file: pass --output or set output in the scenario")?;
    let base_dir = cmd
        .base_dir
        .clone()
        .or_else(|| scenario.and_then(|s| s.base_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("."));

    // Step 1: Find the run files
    let pattern = RunPattern::parse(&raw_pattern)?;
    println!("🔍 Discovering runs: {}", base_dir.join(pattern.as_str()).display());
    let discovery = RunDiscovery::new(
        base_dir,
        pattern,
        DiscoveryConfig::from(&config.aggregation),
    );
    let runs = discovery.discover()?;

    // Step 2: Load them into one ensemble
    println!("📥 Loading {} runs...", runs.len());
    let options = LoadOptions {
        delimiter: config.aggregation.delimiter,
        time_aliases: config.aggregation.time_aliases.clone(),
    };
    let ensemble = ensemble::load_runs(&runs, &options, config.general.progress)?;
    log_ensemble_health(&ensemble);

    // Step 3: Reduce and write
    let reducer = config.aggregation.reducer.build();
    println!("📊 Computing {} per tick...", reducer.name());
    let table = analysis::aggregate(&ensemble, reducer.as_ref(), config.aggregation.parallel)?;
    report::persist(&table, &output)
        .with_context(|| format!("Failed to write table to {}", output.display()))?;

    let duration = start_time.elapsed().as_secs_f64();

    if let Some(ref summary_path) = cmd.summary {
        let summary = build_summary(
            &raw_pattern,
            &output,
            reducer.name(),
            &ensemble,
            &table,
            duration,
        );
        let json = report::generate_summary_json(&summary)?;
        std::fs::write(summary_path, json).with_context(|| {
            format!("Failed to write summary to {}", summary_path.display())
        })?;
        info!("Summary written to {}", summary_path.display());
    }

    print_table_summary(&table, ensemble.run_count(), duration);
    println!("\n✅ Aggregation complete! Table saved to: {}", output.display());
    Ok(())
}

/// Aggregate a BehaviorSpace table export.
fn run_reference(config: &Config, cmd: &ReferenceArgs) -> Result<()> {
    let start_time = Instant::now();
    let scenario = select_scenario(config, cmd.scenario.as_deref())?;

    let input = cmd
        .input
        .clone()
        .or_else(|| scenario.and_then(|s| s.reference_input.clone()))
        .context("No reference export: pass --input or set reference_input in the scenario")?;
    let output = cmd
        .output
        .clone()
        .or_else(|| scenario.and_then(|s| s.reference_output.clone()))
        .context("No output file: pass --output or set reference_output in the scenario")?;

    println!("📥 Loading reference export: {}", input.display());
    let options = NetlogoOptions::from(&config.reference);
    let ensemble = ensemble::load_netlogo(&input, &options)?;
    log_ensemble_health(&ensemble);

    let reducer = config.reference.reducer.build();
    println!("📊 Computing {} per tick...", reducer.name());
    let table = analysis::aggregate(&ensemble, reducer.as_ref(), config.aggregation.parallel)?;
    report::persist(&table, &output)
        .with_context(|| format!("Failed to write table to {}", output.display()))?;

    print_table_summary(&table, ensemble.run_count(), start_time.elapsed().as_secs_f64());
    println!("\n✅ Reference table saved to: {}", output.display());
    Ok(())
}

/// Compare candidate tables against a reference table.
fn run_compare(config: &Config, cmd: &CompareArgs) -> Result<()> {
    let scenario = select_scenario(config, cmd.scenario.as_deref())?;

    let reference_path = cmd
        .reference
        .clone()
        .or_else(|| scenario.and_then(|s| s.reference_output.clone()))
        .context("No reference table: pass --reference or set reference_output in the scenario")?;
    let candidate_paths: Vec<PathBuf> = if cmd.candidate.is_empty() {
        scenario.and_then(|s| s.output.clone()).into_iter().collect()
    } else {
        cmd.candidate.clone()
    };
    if candidate_paths.is_empty() {
        bail!("No candidate table: pass --candidate or set output in the scenario");
    }

    let reference = load_labeled(&reference_path, None)?;
    let candidates = candidate_paths
        .iter()
        .enumerate()
        .map(|(i, path)| load_labeled(path, cmd.label.get(i).map(String::as_str)))
        .collect::<Result<Vec<_>>>()?;

    let settings = ComparisonSettings {
        app_day: cmd.app_day.or_else(|| scenario.and_then(|s| s.app_day)),
        years: cmd.years.or_else(|| scenario.map(|s| s.years)).unwrap_or(1),
    };
    let result = comparison::compare(&reference, &candidates, &settings);

    let output = match cmd.format {
        OutputFormat::Json => report::generate_json_report(&result)?,
        OutputFormat::Markdown => report::generate_markdown_report(&result),
    };

    match cmd.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("\n✅ Comparison complete! Report saved to: {}", path.display());
        }
        None => print!("{}", output),
    }

    Ok(())
}

/// Read a persisted table that must carry full quantile bands.
fn load_labeled(path: &Path, label: Option<&str>) -> Result<LabeledTable> {
    let table = report::read_table(path)
        .with_context(|| format!("Failed to read table {}", path.display()))?;
    report::require_bands(&table, path)?;

    let label = label.map(str::to_string).unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    });
    debug!("Loaded '{}' ({} rows)", label, table.row_count());

    Ok(LabeledTable { label, table })
}

/// Resolve `--scenario`, if given.
fn select_scenario<'a>(
    config: &'a Config,
    name: Option<&str>,
) -> Result<Option<&'a ScenarioConfig>> {
    name.map(|n| config.scenario(n)).transpose()
}

/// Warn about ragged runs and log infinite cells.
fn log_ensemble_health(ensemble: &RunEnsemble) {
    for (run, len) in analysis::short_runs(ensemble) {
        let label = ensemble
            .runs
            .iter()
            .find(|r| r.id == run)
            .map(|r| r.label.as_str())
            .unwrap_or("?");
        warn!("Run {} ends early with {} rows", label, len);
    }

    let runs = ensemble.run_count();
    let partial = analysis::coverage_by_tick(ensemble)
        .into_iter()
        .filter(|(_, present)| *present < runs)
        .count();
    if partial > 0 {
        debug!("{} ticks are covered by fewer than {} runs", partial, runs);
    }

    for (metric, count) in ensemble.metrics.iter().zip(ensemble.infinite_counts()) {
        if count > 0 {
            debug!("{} infinite cells in '{}'", count, metric);
        }
    }
}

fn build_summary(
    source: &str,
    output: &Path,
    reducer: &str,
    ensemble: &RunEnsemble,
    table: &AggregatedTable,
    duration: f64,
) -> AggregationSummary {
    let infinite_cells: BTreeMap<String, usize> = ensemble
        .metrics
        .iter()
        .cloned()
        .zip(ensemble.infinite_counts())
        .filter(|(_, count)| *count > 0)
        .collect();

    AggregationSummary {
        source: source.to_string(),
        output: output.to_path_buf(),
        reducer: reducer.to_string(),
        generated_at: Utc::now(),
        runs: ensemble.runs.clone(),
        metrics: ensemble.metrics.clone(),
        rows: table.row_count(),
        columns: table.columns.len() + 1,
        first_tick: table.ticks.first().copied(),
        last_tick: table.ticks.last().copied(),
        infinite_cells,
        duration_seconds: duration,
    }
}

/// Print a short summary of a written table.
fn print_table_summary(table: &AggregatedTable, runs: usize, duration: f64) {
    println!("\n📊 Aggregation Summary:");
    println!("   Runs: {}", runs);
    println!("   Metrics: {}", table.metrics.len());
    println!("   Rows: {} | Columns: {}", table.row_count(), table.columns.len() + 1);
    if let (Some(first), Some(last)) = (table.ticks.first(), table.ticks.last()) {
        println!("   Ticks: {} .. {}", first, last);
    }
    println!("   Duration: {:.1}s", duration);
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    Ok(Config::load_default()?.unwrap_or_default())
}
