//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.simbands.toml` files, including the scenario table.

use crate::analysis::ReducerKind;
use crate::cli::{Args, Command};
use crate::discovery::DiscoveryMode;
use crate::ensemble::Delimiter;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = ".simbands.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Settings for aggregating raw run files.
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Settings for reading reference-model exports.
    #[serde(default)]
    pub reference: ReferenceConfig,

    /// Named scenarios.
    #[serde(default)]
    pub scenarios: Vec<ScenarioConfig>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Show a progress bar while loading runs.
    #[serde(default = "default_true")]
    pub progress: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            progress: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Statistics computed per metric and tick.
    #[serde(default)]
    pub reducer: ReducerKind,

    /// Field separator of run files.
    #[serde(default)]
    pub delimiter: Delimiter,

    /// Alternate names of the time column.
    #[serde(default = "default_time_aliases")]
    pub time_aliases: Vec<String>,

    /// How run files are located.
    #[serde(default)]
    pub discovery: DiscoveryMode,

    /// Exact number of runs expected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runs: Option<usize>,

    /// Reduce metrics on the rayon thread pool.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            reducer: ReducerKind::default(),
            delimiter: Delimiter::default(),
            time_aliases: default_time_aliases(),
            discovery: DiscoveryMode::default(),
            runs: None,
            parallel: true,
        }
    }
}

fn default_time_aliases() -> Vec<String> {
    vec!["t".to_string()]
}

/// Reference export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Metadata lines before the header row.
    #[serde(default = "default_preamble_lines")]
    pub preamble_lines: usize,

    /// Column identifying the run of each row.
    #[serde(default = "default_run_column")]
    pub run_column: String,

    /// Alternate names of the time column.
    #[serde(default = "default_reference_time_aliases")]
    pub time_aliases: Vec<String>,

    /// Number of trailing metric columns; 0 takes every column after the
    /// time column.
    #[serde(default = "default_metric_count")]
    pub metric_count: usize,

    /// Statistics computed per metric and tick.
    #[serde(default)]
    pub reducer: ReducerKind,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            preamble_lines: default_preamble_lines(),
            run_column: default_run_column(),
            time_aliases: default_reference_time_aliases(),
            metric_count: default_metric_count(),
            reducer: ReducerKind::default(),
        }
    }
}

fn default_preamble_lines() -> usize {
    6
}

fn default_run_column() -> String {
    "RAND_SEED".to_string()
}

fn default_reference_time_aliases() -> Vec<String> {
    vec!["t".to_string(), "[step]".to_string()]
}

fn default_metric_count() -> usize {
    19
}

/// One named scenario: where its runs live and where its tables go.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,

    /// Directory the run pattern is resolved against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,

    /// Run file template, e.g. `out/beecs-%04d.csv`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_pattern: Option<String>,

    /// Aggregated table of the runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Reference-model export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_input: Option<PathBuf>,

    /// Aggregated table of the reference export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_output: Option<PathBuf>,

    /// Day of the first pesticide application, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_day: Option<f64>,

    /// Simulated years.
    #[serde(default = "default_years")]
    pub years: u32,
}

fn default_years() -> u32 {
    1
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &Args) {
        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
        if args.quiet {
            self.general.progress = false;
        }

        match &args.command {
            Command::Aggregate(cmd) => {
                if let Some(reducer) = cmd.reducer {
                    self.aggregation.reducer = reducer;
                }
                if let Some(delimiter) = cmd.delimiter {
                    self.aggregation.delimiter = delimiter;
                }
                if let Some(discovery) = cmd.discovery {
                    self.aggregation.discovery = discovery;
                }
                if cmd.runs.is_some() {
                    self.aggregation.runs = cmd.runs;
                }
                if cmd.sequential {
                    self.aggregation.parallel = false;
                }
            }
            Command::Reference(cmd) => {
                if let Some(reducer) = cmd.reducer {
                    self.reference.reducer = reducer;
                }
                if let Some(ref column) = cmd.run_column {
                    self.reference.run_column = column.clone();
                }
                if let Some(count) = cmd.metric_count {
                    self.reference.metric_count = count;
                }
                if let Some(lines) = cmd.preamble_lines {
                    self.reference.preamble_lines = lines;
                }
            }
            Command::Compare(_) | Command::InitConfig => {}
        }
    }

    /// Look up a scenario by name.
    pub fn scenario(&self, name: &str) -> Result<&ScenarioConfig> {
        if let Some(scenario) = self.scenarios.iter().find(|s| s.name == name) {
            return Ok(scenario);
        }

        let known: Vec<&str> = self.scenarios.iter().map(|s| s.name.as_str()).collect();
        if known.is_empty() {
            bail!("Unknown scenario '{}': no scenarios are configured", name);
        }
        bail!(
            "Unknown scenario '{}' (configured: {})",
            name,
            known.join(", ")
        )
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let mut config = Config::default();
        config.scenarios.push(ScenarioConfig {
            name: "default".to_string(),
            base_dir: None,
            run_pattern: Some("out/beecs-%04d.csv".to_string()),
            output: Some(PathBuf::from("beecs.csv")),
            reference_input: Some(PathBuf::from("netlogo-raw.csv")),
            reference_output: Some(PathBuf::from("netlogo.csv")),
            app_day: None,
            years: default_years(),
        });
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.aggregation.reducer, ReducerKind::Quantiles);
        assert_eq!(config.aggregation.time_aliases, vec!["t"]);
        assert!(config.aggregation.parallel);
        assert_eq!(config.reference.preamble_lines, 6);
        assert_eq!(config.reference.run_column, "RAND_SEED");
        assert_eq!(config.reference.metric_count, 19);
        assert!(config.scenarios.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
verbose = true

[aggregation]
reducer = "mean"
delimiter = "semicolon"
discovery = "listing"
runs = 100

[reference]
metric_count = 0

[[scenarios]]
name = "pesticide"
run_pattern = "out/pesticide-%04d.csv"
output = "beecs-pesticide.csv"
app_day = 189
years = 2

[[scenarios]]
name = "default"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.general.verbose);
        assert!(config.general.progress);
        assert_eq!(config.aggregation.reducer, ReducerKind::Mean);
        assert_eq!(config.aggregation.delimiter, Delimiter::Semicolon);
        assert_eq!(config.aggregation.discovery, DiscoveryMode::Listing);
        assert_eq!(config.aggregation.runs, Some(100));
        assert_eq!(config.reference.metric_count, 0);
        assert_eq!(config.reference.run_column, "RAND_SEED");

        let scenario = config.scenario("pesticide").unwrap();
        assert_eq!(scenario.app_day, Some(189.0));
        assert_eq!(scenario.years, 2);
        assert_eq!(config.scenario("default").unwrap().years, 1);
    }

    #[test]
    fn test_unknown_scenario() {
        let config = Config::default();
        let err = config.scenario("missing").unwrap_err();
        assert!(err.to_string().contains("no scenarios"));
    }

    #[test]
    fn test_merge_with_args() {
        let args = Args::parse_from([
            "simbands",
            "--quiet",
            "aggregate",
            "--reducer",
            "mean",
            "--runs",
            "10",
            "--sequential",
        ]);

        let mut config = Config::default();
        config.merge_with_args(&args);
        assert!(!config.general.progress);
        assert_eq!(config.aggregation.reducer, ReducerKind::Mean);
        assert_eq!(config.aggregation.runs, Some(10));
        assert!(!config.aggregation.parallel);
        // Untouched by the CLI
        assert_eq!(config.aggregation.discovery, DiscoveryMode::Probe);
    }

    #[test]
    fn test_merge_keeps_file_values_without_flags() {
        let args = Args::parse_from(["simbands", "reference", "--input", "netlogo-raw.csv"]);

        let mut config = Config::default();
        config.reference.metric_count = 4;
        config.merge_with_args(&args);
        assert_eq!(config.reference.metric_count, 4);
        assert!(config.general.progress);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[aggregation]"));
        assert!(toml_str.contains("[reference]"));
        assert!(toml_str.contains("[[scenarios]]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.scenarios.len(), 1);
        assert_eq!(parsed.reference.metric_count, 19);
    }
}
