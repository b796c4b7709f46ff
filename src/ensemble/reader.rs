//! Delimited run table reading.

use crate::error::{AggregateError, Result};
use crate::models::{Tick, RUN_COLUMN, TICKS_COLUMN};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Field separator of raw run files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    /// Detect `;` or `,` from the header line
    #[default]
    Auto,
    /// Semicolon-separated
    Semicolon,
    /// Comma-separated
    Comma,
}

impl Delimiter {
    /// Byte separator for a file whose first line is `header`.
    pub fn resolve(self, header: &str) -> u8 {
        match self {
            Delimiter::Semicolon => b';',
            Delimiter::Comma => b',',
            Delimiter::Auto => {
                if header.contains(';') {
                    b';'
                } else {
                    b','
                }
            }
        }
    }
}

/// Options for reading raw run tables.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub delimiter: Delimiter,
    /// Alternate names of the time column, renamed to `ticks` on load.
    pub time_aliases: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::Auto,
            time_aliases: vec!["t".to_string()],
        }
    }
}

/// One run file after parsing.
#[derive(Debug, Clone)]
pub struct RunTable {
    pub metrics: Vec<String>,
    pub rows: Vec<(Tick, Vec<f64>)>,
}

/// Read one run file.
pub fn read_run_table(path: &Path, options: &LoadOptions) -> Result<RunTable> {
    let content = fs::read_to_string(path).map_err(|e| AggregateError::io(path, e))?;
    let first_line = content.lines().next().unwrap_or("");
    let delimiter = options.delimiter.resolve(first_line);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AggregateError::csv(path, e))?
        .clone();
    let time_idx = locate_time_column(path, &headers, &options.time_aliases)?;
    reject_reserved(path, &headers, &[RUN_COLUMN])?;

    let metric_idx: Vec<usize> = (0..headers.len()).filter(|&i| i != time_idx).collect();
    let metrics: Vec<String> = metric_idx.iter().map(|&i| headers[i].to_string()).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AggregateError::csv(path, e))?;
        let line = record.position().map(|p| p.line());

        let tick = parse_tick(path, line, &record[time_idx])?;
        let values = metric_idx
            .iter()
            .map(|&i| parse_value(path, line, &headers[i], &record[i]))
            .collect::<Result<Vec<f64>>>()?;
        rows.push((tick, values));
    }

    Ok(RunTable { metrics, rows })
}

/// Index of the time column, accepting `ticks` or any alias.
///
/// Fails on an empty header, duplicate column names, or a missing time
/// column.
pub(crate) fn locate_time_column(
    path: &Path,
    headers: &StringRecord,
    aliases: &[String],
) -> Result<usize> {
    if headers.iter().all(str::is_empty) {
        return Err(AggregateError::Parse {
            path: path.to_path_buf(),
            line: Some(1),
            message: "missing header row".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for name in headers.iter() {
        if !seen.insert(name) {
            return Err(AggregateError::Parse {
                path: path.to_path_buf(),
                line: headers.position().map(|p| p.line()),
                message: format!("duplicate column '{}'", name),
            });
        }
    }

    headers
        .iter()
        .position(|h| h == TICKS_COLUMN)
        .or_else(|| headers.iter().position(|h| aliases.iter().any(|a| a == h)))
        .ok_or_else(|| AggregateError::MissingColumn {
            path: path.to_path_buf(),
            column: TICKS_COLUMN.to_string(),
        })
}

pub(crate) fn reject_reserved(path: &Path, headers: &StringRecord, reserved: &[&str]) -> Result<()> {
    match headers.iter().find(|h| reserved.contains(h)) {
        Some(column) => Err(AggregateError::ReservedColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        }),
        None => Ok(()),
    }
}

pub(crate) fn parse_tick(path: &Path, line: Option<u64>, cell: &str) -> Result<Tick> {
    cell.parse::<f64>()
        .ok()
        .and_then(Tick::new)
        .ok_or_else(|| AggregateError::Parse {
            path: path.to_path_buf(),
            line,
            message: format!("invalid tick '{}'", cell),
        })
}

pub(crate) fn parse_value(path: &Path, line: Option<u64>, column: &str, cell: &str) -> Result<f64> {
    cell.parse::<f64>().map_err(|_| AggregateError::Parse {
        path: path.to_path_buf(),
        line,
        message: format!("non-numeric value '{}' in column '{}'", cell, column),
    })
}
