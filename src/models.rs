//! Data models for run ensembles and their aggregates.
//!
//! This module contains the core data structures shared across the
//! pipeline: ticks, run records, quantile levels, column keys, the
//! aggregated output table, and the report structures built on top.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Canonical name of the time-index column.
pub const TICKS_COLUMN: &str = "ticks";

/// Column name reserved for the run identifier.
pub const RUN_COLUMN: &str = "run";

/// A time-index value.
///
/// Integer and real ticks share one representation. NaN is never stored
/// and `-0` is folded into `0`, which makes the total order below agree
/// with numeric order.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Tick(f64);

impl Tick {
    /// Create a tick, rejecting NaN.
    pub fn new(value: f64) -> Option<Self> {
        if value.is_nan() {
            None
        } else {
            // Adding +0.0 turns -0.0 into 0.0 and leaves everything else alone.
            Some(Self(value + 0.0))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Tick {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Tick {}

impl PartialOrd for Tick {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tick {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quantile levels reported for every metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QuantileLevel {
    Q05,
    Q10,
    Q25,
    Q50,
    Q75,
    Q90,
    Q95,
}

impl QuantileLevel {
    /// All levels in ascending order.
    pub const ALL: [QuantileLevel; 7] = [
        QuantileLevel::Q05,
        QuantileLevel::Q10,
        QuantileLevel::Q25,
        QuantileLevel::Q50,
        QuantileLevel::Q75,
        QuantileLevel::Q90,
        QuantileLevel::Q95,
    ];

    /// Probability in `[0, 1]`.
    pub fn fraction(self) -> f64 {
        match self {
            QuantileLevel::Q05 => 0.05,
            QuantileLevel::Q10 => 0.10,
            QuantileLevel::Q25 => 0.25,
            QuantileLevel::Q50 => 0.50,
            QuantileLevel::Q75 => 0.75,
            QuantileLevel::Q90 => 0.90,
            QuantileLevel::Q95 => 0.95,
        }
    }

    /// Column-name suffix without the separating underscore.
    pub fn label(self) -> &'static str {
        match self {
            QuantileLevel::Q05 => "Q05",
            QuantileLevel::Q10 => "Q10",
            QuantileLevel::Q25 => "Q25",
            QuantileLevel::Q50 => "Q50",
            QuantileLevel::Q75 => "Q75",
            QuantileLevel::Q90 => "Q90",
            QuantileLevel::Q95 => "Q95",
        }
    }

    /// Position of this level within [`QuantileLevel::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.label() == label)
    }
}

impl fmt::Display for QuantileLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A per-group summary statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Statistic {
    Quantile(QuantileLevel),
    Mean,
}

/// Structured identity of an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnKey {
    /// Index into the table's metric list.
    pub metric: usize,
    pub statistic: Statistic,
}

impl ColumnKey {
    /// Format the wire name for this column.
    pub fn name(&self, metrics: &[String]) -> String {
        let metric = &metrics[self.metric];
        match self.statistic {
            Statistic::Quantile(level) => format!("{}_{}", metric, level.label()),
            Statistic::Mean => metric.clone(),
        }
    }
}

/// One row of a raw run table, tagged with its run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run: usize,
    pub tick: Tick,
    /// Metric values in ensemble metric order.
    pub values: Vec<f64>,
}

/// Provenance of one run in an ensemble.
#[derive(Debug, Clone, Serialize)]
pub struct RunSource {
    pub id: usize,
    /// Human-readable identifier (file index or reference-model seed).
    pub label: String,
    pub path: PathBuf,
    pub rows: usize,
}

/// All records of all runs of one scenario, in long form.
#[derive(Debug, Clone, Default)]
pub struct RunEnsemble {
    pub metrics: Vec<String>,
    pub runs: Vec<RunSource>,
    pub records: Vec<RunRecord>,
}

impl RunEnsemble {
    pub fn new(metrics: Vec<String>) -> Self {
        Self {
            metrics,
            runs: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Group record indices by tick, ticks ascending.
    pub fn group_by_tick(&self) -> BTreeMap<Tick, Vec<usize>> {
        let mut groups: BTreeMap<Tick, Vec<usize>> = BTreeMap::new();
        for (idx, record) in self.records.iter().enumerate() {
            groups.entry(record.tick).or_default().push(idx);
        }
        groups
    }

    /// Number of infinite cells per metric.
    pub fn infinite_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.metrics.len()];
        for record in &self.records {
            for (count, value) in counts.iter_mut().zip(&record.values) {
                if value.is_infinite() {
                    *count += 1;
                }
            }
        }
        counts
    }
}

/// The seven quantiles of one metric at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuantileBand {
    pub values: [f64; 7],
}

impl QuantileBand {
    pub fn get(&self, level: QuantileLevel) -> f64 {
        self.values[level.index()]
    }

    pub fn median(&self) -> f64 {
        self.get(QuantileLevel::Q50)
    }

    /// Whether values never decrease with the level.
    #[cfg(test)]
    pub fn is_monotone(&self) -> bool {
        self.values.windows(2).all(|w| w[0] <= w[1])
    }

    /// Whether `value` lies inside the outer Q05..Q95 band.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.get(QuantileLevel::Q05) && value <= self.get(QuantileLevel::Q95)
    }
}

/// One output column: its key and one value per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub key: ColumnKey,
    pub values: Vec<f64>,
}

/// The wide, tick-indexed result of an aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedTable {
    pub metrics: Vec<String>,
    pub ticks: Vec<Tick>,
    /// Metric-major, statistic order within a metric.
    pub columns: Vec<Column>,
}

impl AggregatedTable {
    /// Header row including the leading ticks column.
    pub fn header(&self) -> Vec<String> {
        std::iter::once(TICKS_COLUMN.to_string())
            .chain(self.columns.iter().map(|c| c.key.name(&self.metrics)))
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.ticks.len()
    }

    pub fn column(&self, key: ColumnKey) -> Option<&Column> {
        self.columns.iter().find(|c| c.key == key)
    }

    /// Quantile band of a metric at a row, if the table holds quantiles.
    pub fn band(&self, metric: usize, row: usize) -> Option<QuantileBand> {
        let mut values = [0.0; 7];
        for level in QuantileLevel::ALL {
            let column = self.column(ColumnKey {
                metric,
                statistic: Statistic::Quantile(level),
            })?;
            values[level.index()] = *column.values.get(row)?;
        }
        Some(QuantileBand { values })
    }
}

/// Metadata about one aggregation run, for the summary report.
#[derive(Debug, Clone, Serialize)]
pub struct AggregationSummary {
    pub source: String,
    pub output: PathBuf,
    pub reducer: String,
    pub generated_at: DateTime<Utc>,
    pub runs: Vec<RunSource>,
    pub metrics: Vec<String>,
    pub rows: usize,
    pub columns: usize,
    pub first_tick: Option<Tick>,
    pub last_tick: Option<Tick>,
    /// Infinite cells seen per metric name (only non-zero entries).
    pub infinite_cells: BTreeMap<String, usize>,
    pub duration_seconds: f64,
}

/// Quantile snapshot of both tables at one checkpoint tick.
#[derive(Debug, Clone, Serialize)]
pub struct Checkpoint {
    /// Requested tick (application day or year end).
    pub tick: f64,
    pub label: String,
    pub reference: Option<QuantileBand>,
    pub candidate: Option<QuantileBand>,
}

/// How one candidate's metric tracks the reference.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateComparison {
    pub candidate: String,
    pub shared_ticks: usize,
    pub non_finite_ticks: usize,
    pub max_median_gap: Option<f64>,
    pub mean_median_gap: Option<f64>,
    /// Fraction of compared ticks where the candidate median lies in the reference band.
    pub band_coverage: Option<f64>,
    pub checkpoints: Vec<Checkpoint>,
}

/// Comparison of one metric across all candidates.
#[derive(Debug, Clone, Serialize)]
pub struct MetricComparison {
    pub metric: String,
    pub candidates: Vec<CandidateComparison>,
}

/// Metadata for a comparison report.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonMetadata {
    pub reference: String,
    pub candidates: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub app_day: Option<f64>,
    pub years: u32,
}

/// The complete band comparison report.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub metadata: ComparisonMetadata,
    pub metrics: Vec<MetricComparison>,
    /// Metrics absent from at least one candidate, with the candidate label.
    pub skipped: Vec<(String, String)>,
}
