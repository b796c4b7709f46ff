//! Persisted aggregate tables.
//!
//! Output tables are `;`-separated with a `ticks` column followed by one
//! column per (metric, statistic). Quantile columns are named
//! `<metric>_Q05` ... `<metric>_Q95`, mean columns carry the bare metric
//! name. Column names are produced and parsed only here.

use crate::ensemble::reader::{parse_tick, parse_value};
use crate::error::{AggregateError, Result};
use crate::models::{AggregatedTable, Column, ColumnKey, QuantileLevel, Statistic, TICKS_COLUMN};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Field separator of aggregate tables.
pub const OUTPUT_DELIMITER: u8 = b';';

/// Write a table, replacing any existing file.
pub fn persist(table: &AggregatedTable, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| AggregateError::io(path, e))?;
    let mut writer = WriterBuilder::new()
        .delimiter(OUTPUT_DELIMITER)
        .from_writer(BufWriter::new(file));

    writer
        .write_record(table.header())
        .map_err(|e| AggregateError::csv(path, e))?;

    let mut row: Vec<String> = Vec::with_capacity(table.columns.len() + 1);
    for (idx, tick) in table.ticks.iter().enumerate() {
        row.clear();
        row.push(tick.to_string());
        row.extend(table.columns.iter().map(|c| c.values[idx].to_string()));
        writer
            .write_record(&row)
            .map_err(|e| AggregateError::csv(path, e))?;
    }

    let mut inner = writer
        .into_inner()
        .map_err(|e| AggregateError::io(path, e.into_error()))?;
    inner.flush().map_err(|e| AggregateError::io(path, e))?;

    info!(
        "Wrote {} rows x {} columns to {}",
        table.row_count(),
        table.columns.len() + 1,
        path.display()
    );
    Ok(())
}

/// Split a column name into metric and statistic.
pub fn parse_column_name(name: &str) -> (&str, Statistic) {
    if let Some((metric, label)) = name.rsplit_once('_') {
        if let Some(level) = QuantileLevel::from_label(label) {
            if !metric.is_empty() {
                return (metric, Statistic::Quantile(level));
            }
        }
    }
    (name, Statistic::Mean)
}

/// Read a table written by [`persist`].
pub fn read_table(path: &Path) -> Result<AggregatedTable> {
    let invalid = |message: String| AggregateError::InvalidTable {
        path: path.to_path_buf(),
        message,
    };

    let file = File::open(path).map_err(|e| AggregateError::io(path, e))?;
    let mut reader = ReaderBuilder::new()
        .delimiter(OUTPUT_DELIMITER)
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AggregateError::csv(path, e))?
        .clone();
    if headers.get(0) != Some(TICKS_COLUMN) {
        return Err(invalid(format!("first column must be '{}'", TICKS_COLUMN)));
    }

    let mut metrics: Vec<String> = Vec::new();
    let mut columns: Vec<Column> = Vec::new();
    for name in headers.iter().skip(1) {
        let (metric, statistic) = parse_column_name(name);
        let metric = match metrics.iter().position(|m| m == metric) {
            Some(idx) => idx,
            None => {
                metrics.push(metric.to_string());
                metrics.len() - 1
            }
        };
        let key = ColumnKey { metric, statistic };
        if columns.iter().any(|c| c.key == key) {
            return Err(invalid(format!("duplicate column '{}'", name)));
        }
        columns.push(Column {
            key,
            values: Vec::new(),
        });
    }

    let mut ticks = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AggregateError::csv(path, e))?;
        let line = record.position().map(|p| p.line());
        ticks.push(parse_tick(path, line, &record[0])?);
        for (idx, column) in columns.iter_mut().enumerate() {
            let name = &headers[idx + 1];
            column.values.push(parse_value(path, line, name, &record[idx + 1])?);
        }
    }

    Ok(AggregatedTable {
        metrics,
        ticks,
        columns,
    })
}

/// Check that every metric carries all seven quantile columns.
pub fn require_bands(table: &AggregatedTable, path: &Path) -> Result<()> {
    for (idx, metric) in table.metrics.iter().enumerate() {
        for level in QuantileLevel::ALL {
            let key = ColumnKey {
                metric: idx,
                statistic: Statistic::Quantile(level),
            };
            if table.column(key).is_none() {
                return Err(AggregateError::InvalidTable {
                    path: path.to_path_buf(),
                    message: format!("metric '{}' has no {} column", metric, level),
                });
            }
        }
    }
    Ok(())
}
