//! Loading run files into a long-form ensemble.
//!
//! Each discovered run file is parsed, its time column normalised to
//! `ticks`, every row tagged with the run index, and the rows appended
//! to a single [`RunEnsemble`].

pub mod netlogo;
pub mod reader;

pub use netlogo::{load_netlogo, NetlogoOptions};
pub use reader::{Delimiter, LoadOptions};

use crate::discovery::DiscoveredRun;
use crate::error::{AggregateError, Result};
use crate::models::{RunEnsemble, RunRecord, RunSource};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

/// Load discovered runs, in order, into one ensemble.
///
/// The first run fixes the metric set. Later runs must carry the same
/// metrics; their column order may differ.
pub fn load_runs(
    runs: &[DiscoveredRun],
    options: &LoadOptions,
    show_progress: bool,
) -> Result<RunEnsemble> {
    let progress = if show_progress {
        let pb = ProgressBar::new(runs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} runs")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut ensemble: Option<RunEnsemble> = None;

    for run in runs {
        debug!("Loading run {}: {}", run.index, run.path.display());
        let table = reader::read_run_table(&run.path, options)?;

        let ensemble = ensemble.get_or_insert_with(|| RunEnsemble::new(table.metrics.clone()));
        let order = column_order(&ensemble.metrics, &table.metrics).ok_or_else(|| {
            AggregateError::ColumnMismatch {
                path: run.path.clone(),
                expected: ensemble.metrics.clone(),
                found: table.metrics.clone(),
            }
        })?;

        ensemble.runs.push(RunSource {
            id: run.index,
            label: run.index.to_string(),
            path: run.path.clone(),
            rows: table.rows.len(),
        });
        ensemble
            .records
            .extend(table.rows.into_iter().map(|(tick, values)| RunRecord {
                run: run.index,
                tick,
                values: order.iter().map(|&i| values[i]).collect(),
            }));

        if let Some(ref pb) = progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let ensemble = ensemble.unwrap_or_default();
    info!(
        "Loaded {} runs ({} rows, {} metrics)",
        ensemble.run_count(),
        ensemble.records.len(),
        ensemble.metrics.len()
    );
    Ok(ensemble)
}

/// For each expected metric, its position in `found`.
///
/// `None` when the two lists are not the same set of names.
fn column_order(expected: &[String], found: &[String]) -> Option<Vec<usize>> {
    if expected.len() != found.len() {
        return None;
    }
    expected
        .iter()
        .map(|name| found.iter().position(|f| f == name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_runs(dir: &Path, contents: &[&str]) -> Vec<DiscoveredRun> {
        contents
            .iter()
            .enumerate()
            .map(|(index, content)| {
                let path = dir.join(format!("beecs-{:04}.csv", index));
                fs::write(&path, content).unwrap();
                DiscoveredRun { index, path }
            })
            .collect()
    }

    #[test]
    fn test_column_order() {
        let expected = vec!["A".to_string(), "B".to_string()];
        assert_eq!(
            column_order(&expected, &["B".to_string(), "A".to_string()]),
            Some(vec![1, 0])
        );
        assert_eq!(column_order(&expected, &["A".to_string()]), None);
        assert_eq!(
            column_order(&expected, &["A".to_string(), "C".to_string()]),
            None
        );
    }

    #[test]
    fn test_load_tags_runs_and_reorders_columns() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(
            dir.path(),
            &["t;A;B\n0;1;10\n1;2;20\n", "ticks;B;A\n0;30;3\n"],
        );

        let ensemble = load_runs(&runs, &LoadOptions::default(), false).unwrap();
        assert_eq!(ensemble.metrics, vec!["A", "B"]);
        assert_eq!(ensemble.run_count(), 2);
        assert_eq!(ensemble.records.len(), 3);
        assert_eq!(ensemble.records[2].run, 1);
        assert_eq!(ensemble.records[2].values, vec![3.0, 30.0]);
        assert_eq!(ensemble.runs[0].rows, 2);
    }

    #[test]
    fn test_discover_load_aggregate_persist() {
        use crate::analysis::aggregate;
        use crate::analysis::reducer::QuantileReducer;
        use crate::discovery::{DiscoveryConfig, RunDiscovery, RunPattern};
        use crate::report::table::persist;

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("beecs-0000.csv"), "t;TotalPop;Honey\n1;10;1\n0;5;0.5\n2;20;2\n").unwrap();
        fs::write(out.join("beecs-0001.csv"), "ticks,Honey,TotalPop\n0,1.5,7\n1,2,12\n").unwrap();
        fs::write(out.join("beecs-0002.csv"), "t;TotalPop;Honey\n0;9;2.5\n").unwrap();
        // Past the gap; never loaded.
        fs::write(out.join("beecs-0004.csv"), "t;TotalPop;Honey\n0;1000;1000\n").unwrap();

        let runs = RunDiscovery::new(
            dir.path().to_path_buf(),
            RunPattern::parse("out/beecs-%04d.csv").unwrap(),
            DiscoveryConfig::default(),
        )
        .discover()
        .unwrap();
        assert_eq!(runs.len(), 3);

        let ensemble = load_runs(&runs, &LoadOptions::default(), false).unwrap();
        let table = aggregate(&ensemble, &QuantileReducer, true).unwrap();
        let output = dir.path().join("beecs.csv");
        persist(&table, &output).unwrap();

        let content = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        let header: Vec<&str> = lines[0].split(';').collect();
        assert_eq!(header.len(), 1 + 7 * 2);
        assert_eq!(header[0], "ticks");
        assert_eq!(header[4], "TotalPop_Q50");
        assert_eq!(header[11], "Honey_Q50");

        let ticks: Vec<&str> = lines[1..]
            .iter()
            .map(|line| line.split(';').next().unwrap())
            .collect();
        assert_eq!(ticks, vec!["0", "1", "2"]);
        assert!(lines[1..].iter().all(|line| line.split(';').count() == header.len()));

        // Tick 0 holds {5, 7, 9}; tick 2 only the first run's 20.
        let tick0: Vec<&str> = lines[1].split(';').collect();
        assert_eq!(tick0[4], "7");
        let tick2: Vec<&str> = lines[3].split(';').collect();
        assert_eq!(tick2[1], "20");
        assert_eq!(tick2[7], "20");
    }

    #[test]
    fn test_metric_mismatch_fails() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &["t;A;B\n0;1;2\n", "t;A;C\n0;1;2\n"]);

        let err = load_runs(&runs, &LoadOptions::default(), false).unwrap_err();
        assert!(matches!(err, AggregateError::ColumnMismatch { .. }));
    }

    #[test]
    fn test_malformed_run_aborts_load() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &["t;A\n0;1\n", "t;A\n0;oops\n"]);

        assert!(load_runs(&runs, &LoadOptions::default(), false).is_err());
    }
}
