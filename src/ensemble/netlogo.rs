//! Reference-model ensembles from NetLogo BehaviorSpace table exports.
//!
//! A table export keeps every run in one comma-separated file. The file
//! opens with a few lines of experiment metadata, then a header row. Runs
//! are told apart by a run column (the random seed by default).

use super::reader::{locate_time_column, parse_tick, parse_value, reject_reserved};
use crate::error::{AggregateError, Result};
use crate::models::{RunEnsemble, RunRecord, RunSource, RUN_COLUMN};
use csv::{ReaderBuilder, Trim};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Options for reading a BehaviorSpace table export.
#[derive(Debug, Clone)]
pub struct NetlogoOptions {
    /// Metadata lines preceding the header row.
    pub preamble_lines: usize,
    /// Column identifying the run of each row.
    pub run_column: String,
    /// Alternate names of the time column.
    pub time_aliases: Vec<String>,
    /// Number of trailing columns holding metrics; `None` takes every
    /// column after the time column.
    pub metric_count: Option<usize>,
}

impl Default for NetlogoOptions {
    fn default() -> Self {
        Self {
            preamble_lines: 6,
            run_column: "RAND_SEED".to_string(),
            time_aliases: vec!["t".to_string(), "[step]".to_string()],
            metric_count: Some(19),
        }
    }
}

impl From<&crate::config::ReferenceConfig> for NetlogoOptions {
    fn from(config: &crate::config::ReferenceConfig) -> Self {
        Self {
            preamble_lines: config.preamble_lines,
            run_column: config.run_column.clone(),
            time_aliases: config.time_aliases.clone(),
            metric_count: (config.metric_count > 0).then_some(config.metric_count),
        }
    }
}

/// Load every run of a BehaviorSpace table export.
pub fn load_netlogo(path: &Path, options: &NetlogoOptions) -> Result<RunEnsemble> {
    info!("Loading reference table: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| AggregateError::io(path, e))?;
    let body = skip_lines(&content, options.preamble_lines).ok_or_else(|| {
        AggregateError::Parse {
            path: path.to_path_buf(),
            line: None,
            message: format!(
                "expected {} preamble lines before the header",
                options.preamble_lines
            ),
        }
    })?;
    let line_offset = options.preamble_lines as u64;

    let mut reader = ReaderBuilder::new()
        .delimiter(b',')
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AggregateError::csv(path, e).offset_line(line_offset))?
        .clone();
    let time_idx = locate_time_column(path, &headers, &options.time_aliases)?;
    reject_reserved(path, &headers, &[RUN_COLUMN])?;
    let run_idx = headers
        .iter()
        .position(|h| h == options.run_column)
        .ok_or_else(|| AggregateError::MissingColumn {
            path: path.to_path_buf(),
            column: options.run_column.clone(),
        })?;

    let candidates: Vec<usize> = match options.metric_count {
        Some(count) if count > headers.len() => {
            return Err(AggregateError::Parse {
                path: path.to_path_buf(),
                line: Some(line_offset + 1),
                message: format!(
                    "expected at least {} metric columns, header has {} columns",
                    count,
                    headers.len()
                ),
            });
        }
        Some(count) => (headers.len() - count..headers.len()).collect(),
        None => (time_idx + 1..headers.len()).collect(),
    };
    let metric_idx: Vec<usize> = candidates
        .into_iter()
        .filter(|&i| i != time_idx && i != run_idx)
        .collect();
    if metric_idx.is_empty() {
        return Err(AggregateError::Parse {
            path: path.to_path_buf(),
            line: Some(line_offset + 1),
            message: "no metric columns".to_string(),
        });
    }

    let metrics: Vec<String> = metric_idx.iter().map(|&i| headers[i].to_string()).collect();
    debug!("Reference metrics: {}", metrics.join(", "));

    let mut ensemble = RunEnsemble::new(metrics);
    let mut run_ids: HashMap<String, usize> = HashMap::new();

    for record in reader.records() {
        let record = record
            .map_err(|e| AggregateError::csv(path, e).offset_line(line_offset))?;
        let line = record.position().map(|p| p.line() + line_offset);

        let label = &record[run_idx];
        let run = match run_ids.get(label) {
            Some(&id) => id,
            None => {
                let id = ensemble.runs.len();
                run_ids.insert(label.to_string(), id);
                ensemble.runs.push(RunSource {
                    id,
                    label: label.to_string(),
                    path: path.to_path_buf(),
                    rows: 0,
                });
                id
            }
        };

        let tick = parse_tick(path, line, &record[time_idx])?;
        let values = metric_idx
            .iter()
            .map(|&i| parse_value(path, line, &headers[i], &record[i]))
            .collect::<Result<Vec<f64>>>()?;

        ensemble.runs[run].rows += 1;
        ensemble.records.push(RunRecord { run, tick, values });
    }

    if ensemble.is_empty() {
        return Err(AggregateError::NoRuns {
            pattern: path.display().to_string(),
        });
    }

    info!(
        "Loaded {} reference runs ({} rows)",
        ensemble.run_count(),
        ensemble.records.len()
    );
    Ok(ensemble)
}

/// The remainder of `content` after `n` lines.
fn skip_lines(content: &str, n: usize) -> Option<&str> {
    if n == 0 {
        return Some(content);
    }
    content
        .match_indices('\n')
        .nth(n - 1)
        .map(|(idx, _)| &content[idx + 1..])
}
