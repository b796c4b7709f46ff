//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::analysis::ReducerKind;
use crate::discovery::DiscoveryMode;
use crate::ensemble::Delimiter;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// simbands - quantile bands for stochastic simulation ensembles
///
/// Aggregate many runs of a simulation into per-tick quantile tables,
/// aggregate reference-model exports the same way, and compare the bands.
///
/// Examples:
///   simbands aggregate --pattern out/beecs-%04d.csv --output beecs.csv
///   simbands reference --input netlogo-raw.csv --output netlogo.csv
///   simbands compare --reference netlogo.csv --candidate beecs.csv --app-day 189
///   simbands aggregate --scenario pesticide
///   simbands init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .simbands.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (errors only, no progress bar)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Aggregate numbered run files into a quantile table
    Aggregate(AggregateArgs),

    /// Aggregate a NetLogo BehaviorSpace table export
    Reference(ReferenceArgs),

    /// Compare candidate quantile tables against a reference table
    Compare(CompareArgs),

    /// Generate a default .simbands.toml configuration file
    InitConfig,
}

/// Arguments of `aggregate`.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct AggregateArgs {
    /// Run file template with one %d or %0Nd placeholder
    ///
    /// Example: out/beecs-%04d.csv
    #[arg(short, long, value_name = "TEMPLATE")]
    pub pattern: Option<String>,

    /// Output file path for the aggregated table
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Directory the template is resolved against
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Statistics computed per metric and tick
    #[arg(long, value_name = "REDUCER")]
    pub reducer: Option<ReducerKind>,

    /// How run files are located
    #[arg(long, value_name = "MODE")]
    pub discovery: Option<DiscoveryMode>,

    /// Exact number of runs expected (0..N-1 must all exist)
    #[arg(long, value_name = "COUNT")]
    pub runs: Option<usize>,

    /// Field separator of run files
    #[arg(long, value_name = "DELIM")]
    pub delimiter: Option<Delimiter>,

    /// Reduce metrics on a single thread
    #[arg(long)]
    pub sequential: bool,

    /// Scenario from the configuration file
    #[arg(short, long, value_name = "NAME")]
    pub scenario: Option<String>,

    /// Write a JSON summary of the aggregation to this file
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,
}

/// Arguments of `reference`.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ReferenceArgs {
    /// BehaviorSpace table export
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Output file path for the aggregated table
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Column identifying the run of each row
    #[arg(long, value_name = "COLUMN")]
    pub run_column: Option<String>,

    /// Number of trailing metric columns (0 = every column after the time column)
    #[arg(long, value_name = "COUNT")]
    pub metric_count: Option<usize>,

    /// Metadata lines before the header row
    #[arg(long, value_name = "LINES")]
    pub preamble_lines: Option<usize>,

    /// Statistics computed per metric and tick
    #[arg(long, value_name = "REDUCER")]
    pub reducer: Option<ReducerKind>,

    /// Scenario from the configuration file
    #[arg(short, long, value_name = "NAME")]
    pub scenario: Option<String>,
}

/// Arguments of `compare`.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct CompareArgs {
    /// Reference quantile table
    #[arg(short, long, value_name = "FILE")]
    pub reference: Option<PathBuf>,

    /// Candidate quantile table (repeatable)
    #[arg(short = 'C', long, value_name = "FILE")]
    pub candidate: Vec<PathBuf>,

    /// Report label per candidate, in order (repeatable)
    ///
    /// Defaults to the file stem of each candidate
    #[arg(short, long, value_name = "LABEL")]
    pub label: Vec<String>,

    /// Day of the first pesticide application
    #[arg(long, value_name = "DAY")]
    pub app_day: Option<f64>,

    /// Simulated years (one checkpoint per year end)
    #[arg(long, value_name = "YEARS")]
    pub years: Option<u32>,

    /// Output file path for the report (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Scenario from the configuration file
    #[arg(short, long, value_name = "NAME")]
    pub scenario: Option<String>,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match &self.command {
            Command::Aggregate(cmd) => {
                if cmd.runs == Some(0) {
                    return Err("Run count must be at least 1".to_string());
                }
                if cmd.pattern.is_none() && cmd.scenario.is_none() {
                    return Err("Either --pattern or --scenario is required".to_string());
                }
            }
            Command::Reference(cmd) => {
                if cmd.input.is_none() && cmd.scenario.is_none() {
                    return Err("Either --input or --scenario is required".to_string());
                }
            }
            Command::Compare(cmd) => {
                if !cmd.label.is_empty() && cmd.label.len() != cmd.candidate.len() {
                    return Err(format!(
                        "Got {} labels for {} candidates",
                        cmd.label.len(),
                        cmd.candidate.len()
                    ));
                }
                if let Some(day) = cmd.app_day {
                    if !day.is_finite() {
                        return Err("Application day must be a finite number".to_string());
                    }
                }
            }
            Command::InitConfig => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args(command: Command) -> Args {
        Args {
            command,
            config: None,
            verbose: false,
            quiet: false,
        }
    }

    fn aggregate_args() -> AggregateArgs {
        AggregateArgs {
            pattern: Some("out/beecs-%04d.csv".to_string()),
            output: Some(PathBuf::from("beecs.csv")),
            ..AggregateArgs::default()
        }
    }

    #[test]
    fn test_parse_aggregate() {
        let args = Args::parse_from([
            "simbands",
            "aggregate",
            "--pattern",
            "out/beecs-%04d.csv",
            "--output",
            "beecs.csv",
            "--reducer",
            "mean",
            "--discovery",
            "listing",
            "--delimiter",
            "comma",
            "-v",
        ]);

        assert!(args.verbose);
        match args.command {
            Command::Aggregate(cmd) => {
                assert_eq!(cmd.pattern.as_deref(), Some("out/beecs-%04d.csv"));
                assert_eq!(cmd.reducer, Some(ReducerKind::Mean));
                assert_eq!(cmd.discovery, Some(DiscoveryMode::Listing));
                assert_eq!(cmd.delimiter, Some(Delimiter::Comma));
                assert!(!cmd.sequential);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_compare_repeatable() {
        let args = Args::parse_from([
            "simbands",
            "compare",
            "--reference",
            "netlogo.csv",
            "--candidate",
            "beecs.csv",
            "--candidate",
            "beecs-alt.csv",
            "--format",
            "json",
        ]);

        match args.command {
            Command::Compare(cmd) => {
                assert_eq!(cmd.candidate.len(), 2);
                assert_eq!(cmd.format, OutputFormat::Json);
                assert!(cmd.output.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args(Command::Aggregate(aggregate_args()));
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_aggregate() {
        assert!(make_args(Command::Aggregate(aggregate_args()))
            .validate()
            .is_ok());

        let mut cmd = aggregate_args();
        cmd.runs = Some(0);
        assert!(make_args(Command::Aggregate(cmd)).validate().is_err());

        let cmd = AggregateArgs::default();
        assert!(make_args(Command::Aggregate(cmd)).validate().is_err());

        let cmd = AggregateArgs {
            scenario: Some("default".to_string()),
            ..AggregateArgs::default()
        };
        assert!(make_args(Command::Aggregate(cmd)).validate().is_ok());
    }

    #[test]
    fn test_validation_label_count() {
        let cmd = CompareArgs {
            reference: Some(PathBuf::from("netlogo.csv")),
            candidate: vec![PathBuf::from("a.csv"), PathBuf::from("b.csv")],
            label: vec!["A".to_string()],
            ..CompareArgs::default()
        };
        assert!(make_args(Command::Compare(cmd)).validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args(Command::InitConfig);
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
