//! Ensemble aggregation: group by tick, reduce per metric, pivot wide.
//!
//! This module turns a long-form [`RunEnsemble`] into an
//! [`AggregatedTable`] using any [`Reducer`], and provides a few
//! ensemble statistics used for logging and summaries.

use super::reducer::Reducer;
use crate::error::{AggregateError, Result};
use crate::models::{AggregatedTable, Column, ColumnKey, RunEnsemble, Tick};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::debug;

/// Aggregate an ensemble into one wide table.
///
/// Rows are the distinct ticks of the ensemble in ascending order. For
/// every metric the reducer's statistics become consecutive columns.
/// With `parallel` set, metrics are reduced on the rayon pool; the output
/// is identical either way.
pub fn aggregate(
    ensemble: &RunEnsemble,
    reducer: &dyn Reducer,
    parallel: bool,
) -> Result<AggregatedTable> {
    if ensemble.is_empty() {
        return Err(AggregateError::EmptyEnsemble);
    }

    let groups: Vec<(Tick, Vec<usize>)> = ensemble.group_by_tick().into_iter().collect();
    debug!(
        "Reducing {} metrics over {} ticks with '{}'",
        ensemble.metrics.len(),
        groups.len(),
        reducer.name()
    );

    let metric_count = ensemble.metrics.len();
    let per_metric: Vec<Vec<Column>> = if parallel {
        (0..metric_count)
            .into_par_iter()
            .map(|metric| reduce_metric(ensemble, &groups, metric, reducer))
            .collect::<Result<_>>()?
    } else {
        (0..metric_count)
            .map(|metric| reduce_metric(ensemble, &groups, metric, reducer))
            .collect::<Result<_>>()?
    };

    Ok(AggregatedTable {
        metrics: ensemble.metrics.clone(),
        ticks: groups.iter().map(|(tick, _)| *tick).collect(),
        columns: per_metric.into_iter().flatten().collect(),
    })
}

/// Reduce one metric over every tick group.
fn reduce_metric(
    ensemble: &RunEnsemble,
    groups: &[(Tick, Vec<usize>)],
    metric: usize,
    reducer: &dyn Reducer,
) -> Result<Vec<Column>> {
    let statistics = reducer.statistics();
    let mut columns: Vec<Column> = statistics
        .iter()
        .map(|&statistic| Column {
            key: ColumnKey { metric, statistic },
            values: Vec::with_capacity(groups.len()),
        })
        .collect();

    let mut sample = Vec::new();
    for (tick, rows) in groups {
        sample.clear();
        sample.extend(rows.iter().map(|&row| ensemble.records[row].values[metric]));

        let reduced = reducer
            .reduce(&mut sample)
            .ok_or_else(|| AggregateError::EmptySample {
                metric: ensemble.metrics[metric].clone(),
                tick: tick.to_string(),
            })?;

        for (column, value) in columns.iter_mut().zip(reduced) {
            column.values.push(value);
        }
    }

    Ok(columns)
}

/// Number of records contributed by each run, keyed by run id.
pub fn run_lengths(ensemble: &RunEnsemble) -> HashMap<usize, usize> {
    let mut lengths: HashMap<usize, usize> = HashMap::new();

    for record in &ensemble.records {
        *lengths.entry(record.run).or_default() += 1;
    }

    lengths
}

/// Runs that stop before the longest run, shortest first.
pub fn short_runs(ensemble: &RunEnsemble) -> Vec<(usize, usize)> {
    let lengths = run_lengths(ensemble);
    let longest = lengths.values().copied().max().unwrap_or(0);

    let mut short: Vec<(usize, usize)> = lengths
        .into_iter()
        .filter(|(_, len)| *len < longest)
        .collect();

    short.sort_by_key(|&(run, len)| (len, run));
    short
}

/// Number of runs present at each tick, ticks ascending.
pub fn coverage_by_tick(ensemble: &RunEnsemble) -> Vec<(Tick, usize)> {
    ensemble
        .group_by_tick()
        .into_iter()
        .map(|(tick, rows)| (tick, rows.len()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::reducer::{MeanReducer, QuantileReducer};
    use crate::models::{QuantileLevel, RunRecord, RunSource, Statistic};
    use std::path::PathBuf;

    fn record(run: usize, tick: f64, values: &[f64]) -> RunRecord {
        RunRecord {
            run,
            tick: Tick::new(tick).unwrap(),
            values: values.to_vec(),
        }
    }

    fn create_test_ensemble(runs: &[Vec<(f64, Vec<f64>)>]) -> RunEnsemble {
        let mut ensemble = RunEnsemble::new(vec!["TotalPop".to_string(), "Honey".to_string()]);
        for (id, rows) in runs.iter().enumerate() {
            ensemble.runs.push(RunSource {
                id,
                label: id.to_string(),
                path: PathBuf::from(format!("run-{:04}.csv", id)),
                rows: rows.len(),
            });
            for (tick, values) in rows {
                ensemble.records.push(record(id, *tick, values));
            }
        }
        ensemble
    }

    fn q(level: QuantileLevel, metric: usize) -> ColumnKey {
        ColumnKey {
            metric,
            statistic: Statistic::Quantile(level),
        }
    }

    #[test]
    fn test_single_run_round_trip() {
        let ensemble = create_test_ensemble(&[vec![
            (0.0, vec![10.0, 1.5]),
            (1.0, vec![12.0, 2.5]),
            (2.0, vec![11.0, f64::INFINITY]),
        ]]);

        let table = aggregate(&ensemble, &QuantileReducer, false).unwrap();

        assert_eq!(table.row_count(), 3);
        for column in &table.columns {
            let source: Vec<f64> = ensemble
                .records
                .iter()
                .map(|r| r.values[column.key.metric])
                .collect();
            assert_eq!(column.values, source);
        }
    }

    #[test]
    fn test_column_count_and_order() {
        let ensemble = create_test_ensemble(&[vec![(0.0, vec![1.0, 2.0])]]);
        let table = aggregate(&ensemble, &QuantileReducer, false).unwrap();

        let header = table.header();
        assert_eq!(header.len(), 1 + 7 * 2);
        assert_eq!(header[0], "ticks");
        assert_eq!(header[1], "TotalPop_Q05");
        assert_eq!(header[7], "TotalPop_Q95");
        assert_eq!(header[8], "Honey_Q05");
        assert_eq!(header[14], "Honey_Q95");
    }

    #[test]
    fn test_unequal_run_lengths() {
        let ensemble = create_test_ensemble(&[
            vec![(0.0, vec![1.0, 0.0]), (1.0, vec![2.0, 0.0]), (2.0, vec![3.0, 0.0])],
            vec![(0.0, vec![3.0, 0.0]), (1.0, vec![4.0, 0.0])],
            vec![(0.0, vec![5.0, 0.0])],
        ]);

        let table = aggregate(&ensemble, &QuantileReducer, false).unwrap();

        let ticks: Vec<f64> = table.ticks.iter().map(|t| t.value()).collect();
        assert_eq!(ticks, vec![0.0, 1.0, 2.0]);

        let median = table.column(q(QuantileLevel::Q50, 0)).unwrap();
        // tick 0: {1,3,5}; tick 1: {2,4}; tick 2: {3}
        assert_eq!(median.values, vec![3.0, 3.0, 3.0]);

        let low = table.column(q(QuantileLevel::Q05, 0)).unwrap();
        assert!((low.values[0] - 1.2).abs() < 1e-12);
        assert!((low.values[1] - 2.1).abs() < 1e-12);
        assert_eq!(low.values[2], 3.0);
    }

    #[test]
    fn test_ticks_sorted_without_duplicates() {
        let ensemble = create_test_ensemble(&[
            vec![(2.0, vec![1.0, 1.0]), (0.0, vec![1.0, 1.0])],
            vec![(1.0, vec![1.0, 1.0]), (2.0, vec![1.0, 1.0])],
        ]);

        let table = aggregate(&ensemble, &QuantileReducer, false).unwrap();
        let ticks: Vec<f64> = table.ticks.iter().map(|t| t.value()).collect();
        assert_eq!(ticks, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_negative_zero_tick_shares_row_with_zero() {
        let ensemble = create_test_ensemble(&[
            vec![(-0.0, vec![1.0, 1.0])],
            vec![(0.0, vec![3.0, 1.0])],
        ]);

        let table = aggregate(&ensemble, &QuantileReducer, false).unwrap();
        let ticks: Vec<String> = table.ticks.iter().map(|t| t.to_string()).collect();
        assert_eq!(ticks, vec!["0"]);
        assert_eq!(table.column(q(QuantileLevel::Q50, 0)).unwrap().values, vec![2.0]);
    }

    #[test]
    fn test_nan_cell_yields_nan_band() {
        let ensemble = create_test_ensemble(&[
            vec![(0.0, vec![1.0, 1.0])],
            vec![(0.0, vec![2.0, 2.0])],
            vec![(0.0, vec![3.0, 3.0])],
            vec![(0.0, vec![4.0, 4.0])],
            vec![(0.0, vec![f64::NAN, 5.0])],
        ]);

        let table = aggregate(&ensemble, &QuantileReducer, false).unwrap();
        assert!(table.band(0, 0).unwrap().values.iter().all(|v| v.is_nan()));
        // Other metrics at the same tick are unaffected.
        assert_eq!(table.band(1, 0).unwrap().median(), 3.0);
    }

    #[test]
    fn test_bands_are_monotone() {
        let ensemble = create_test_ensemble(&[
            vec![(0.0, vec![9.0, -1.0])],
            vec![(0.0, vec![2.0, 4.0])],
            vec![(0.0, vec![7.0, 4.0])],
            vec![(0.0, vec![1.0, 8.0])],
        ]);

        let table = aggregate(&ensemble, &QuantileReducer, false).unwrap();
        for metric in 0..2 {
            assert!(table.band(metric, 0).unwrap().is_monotone());
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let runs: Vec<Vec<(f64, Vec<f64>)>> = (0..6)
            .map(|run| {
                (0..20)
                    .map(|tick| {
                        let x = (run * 31 + tick * 7) as f64 % 13.0;
                        (tick as f64, vec![x, x * x])
                    })
                    .collect()
            })
            .collect();
        let ensemble = create_test_ensemble(&runs);

        let sequential = aggregate(&ensemble, &QuantileReducer, false).unwrap();
        let parallel = aggregate(&ensemble, &QuantileReducer, true).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_mean_reducer_columns() {
        let ensemble = create_test_ensemble(&[
            vec![(0.0, vec![1.0, 10.0])],
            vec![(0.0, vec![3.0, 20.0])],
        ]);

        let table = aggregate(&ensemble, &MeanReducer, false).unwrap();
        assert_eq!(table.header(), vec!["ticks", "TotalPop", "Honey"]);
        assert_eq!(table.columns[0].values, vec![2.0]);
        assert_eq!(table.columns[1].values, vec![15.0]);
    }

    #[test]
    fn test_empty_ensemble_fails() {
        let ensemble = RunEnsemble::new(vec!["TotalPop".to_string()]);
        let err = aggregate(&ensemble, &QuantileReducer, false).unwrap_err();
        assert!(matches!(err, AggregateError::EmptyEnsemble));
    }

    #[test]
    fn test_short_runs_and_coverage() {
        let ensemble = create_test_ensemble(&[
            vec![(0.0, vec![1.0, 0.0]), (1.0, vec![1.0, 0.0]), (2.0, vec![1.0, 0.0])],
            vec![(0.0, vec![1.0, 0.0])],
            vec![(0.0, vec![1.0, 0.0]), (1.0, vec![1.0, 0.0])],
        ]);

        assert_eq!(short_runs(&ensemble), vec![(1, 1), (2, 2)]);

        let coverage: Vec<usize> = coverage_by_tick(&ensemble)
            .into_iter()
            .map(|(_, n)| n)
            .collect();
        assert_eq!(coverage, vec![3, 2, 1]);
    }
}
