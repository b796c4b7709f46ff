//! Band comparison between a reference table and candidate tables.
//!
//! Works on persisted quantile tables, the same input a chart renderer
//! reads: per metric, the median line and the Q05..Q95 band of every
//! table on a shared tick axis.

use crate::models::{
    AggregatedTable, CandidateComparison, Checkpoint, ComparisonMetadata, ComparisonReport,
    MetricComparison, QuantileBand, Tick,
};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Simulated days per year, for year-end checkpoints.
pub const DAYS_PER_YEAR: f64 = 365.0;

/// A quantile table with the name it is reported under.
#[derive(Debug, Clone)]
pub struct LabeledTable {
    pub label: String,
    pub table: AggregatedTable,
}

/// Scenario markers used for checkpoint snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComparisonSettings {
    /// Day of the first pesticide application, if any.
    pub app_day: Option<f64>,
    /// Simulated years; one checkpoint per year end.
    pub years: u32,
}

impl ComparisonSettings {
    /// Checkpoint ticks with their labels, ascending.
    pub fn checkpoints(&self) -> Vec<(f64, String)> {
        let mut points: Vec<(f64, String)> = (1..=self.years)
            .map(|year| (year as f64 * DAYS_PER_YEAR, format!("end of year {}", year)))
            .collect();
        if let Some(day) = self.app_day.filter(|d| *d > 0.0) {
            points.push((day, "application day".to_string()));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        points
    }
}

/// Compare every reference metric against each candidate.
///
/// Tables must hold complete quantile bands (see
/// [`crate::report::table::require_bands`]). Metrics missing from a
/// candidate are listed in `skipped`; metrics only a candidate has are
/// ignored.
pub fn compare(
    reference: &LabeledTable,
    candidates: &[LabeledTable],
    settings: &ComparisonSettings,
) -> ComparisonReport {
    let checkpoints = settings.checkpoints();
    let mut metrics = Vec::new();
    let mut skipped = Vec::new();

    for (ref_metric, name) in reference.table.metrics.iter().enumerate() {
        let mut per_candidate = Vec::new();

        for candidate in candidates {
            let Some(cand_metric) = candidate.table.metrics.iter().position(|m| m == name) else {
                warn!("Metric '{}' missing from '{}'", name, candidate.label);
                skipped.push((name.clone(), candidate.label.clone()));
                continue;
            };

            per_candidate.push(compare_metric(
                &reference.table,
                ref_metric,
                candidate,
                cand_metric,
                &checkpoints,
            ));
        }

        if !per_candidate.is_empty() {
            metrics.push(MetricComparison {
                metric: name.clone(),
                candidates: per_candidate,
            });
        }
    }

    debug!(
        "Compared {} metrics, skipped {}",
        metrics.len(),
        skipped.len()
    );

    ComparisonReport {
        metadata: ComparisonMetadata {
            reference: reference.label.clone(),
            candidates: candidates.iter().map(|c| c.label.clone()).collect(),
            generated_at: Utc::now(),
            app_day: settings.app_day,
            years: settings.years,
        },
        metrics,
        skipped,
    }
}

fn compare_metric(
    reference: &AggregatedTable,
    ref_metric: usize,
    candidate: &LabeledTable,
    cand_metric: usize,
    checkpoints: &[(f64, String)],
) -> CandidateComparison {
    let cand_rows: BTreeMap<Tick, usize> = candidate
        .table
        .ticks
        .iter()
        .enumerate()
        .map(|(row, tick)| (*tick, row))
        .collect();

    let mut shared = 0;
    let mut non_finite = 0;
    let mut inside = 0;
    let mut max_gap: Option<f64> = None;
    let mut gap_sum = 0.0;

    for (ref_row, tick) in reference.ticks.iter().enumerate() {
        let Some(&cand_row) = cand_rows.get(tick) else {
            continue;
        };
        let (Some(ref_band), Some(cand_band)) = (
            reference.band(ref_metric, ref_row),
            candidate.table.band(cand_metric, cand_row),
        ) else {
            continue;
        };
        shared += 1;

        let (r, c) = (ref_band.median(), cand_band.median());
        if !r.is_finite() || !c.is_finite() {
            non_finite += 1;
            continue;
        }

        let gap = (c - r).abs();
        max_gap = Some(max_gap.map_or(gap, |m| m.max(gap)));
        gap_sum += gap;
        if ref_band.contains(c) {
            inside += 1;
        }
    }

    let compared = shared - non_finite;
    let (mean_gap, coverage) = if compared > 0 {
        (
            Some(gap_sum / compared as f64),
            Some(inside as f64 / compared as f64),
        )
    } else {
        (None, None)
    };

    let checkpoints = checkpoints
        .iter()
        .map(|(tick, label)| Checkpoint {
            tick: *tick,
            label: label.clone(),
            reference: band_at(reference, ref_metric, *tick),
            candidate: band_at(&candidate.table, cand_metric, *tick),
        })
        .collect();

    CandidateComparison {
        candidate: candidate.label.clone(),
        shared_ticks: shared,
        non_finite_ticks: non_finite,
        max_median_gap: max_gap,
        mean_median_gap: mean_gap,
        band_coverage: coverage,
        checkpoints,
    }
}

/// Band at the last row whose tick is at or before `tick`.
fn band_at(table: &AggregatedTable, metric: usize, tick: f64) -> Option<QuantileBand> {
    let rows = table.ticks.partition_point(|t| t.value() <= tick);
    let row = rows.checked_sub(1)?;
    table.band(metric, row)
}
