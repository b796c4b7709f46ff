//! Per-group reducers.
//!
//! A reducer turns the values of one metric at one tick into a fixed
//! number of output cells. The aggregator only sees this trait, so the
//! quantile and mean pipelines share loading, grouping and persistence.

use super::quantile::{band_sorted, mean, sort_sample};
use crate::models::{QuantileLevel, Statistic};
use serde::{Deserialize, Serialize};

/// Reduces one group's sample to the statistics it declares.
pub trait Reducer: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// Statistics produced, in output column order.
    fn statistics(&self) -> &[Statistic];

    /// Reduce a sample, returning one value per statistic.
    ///
    /// The sample may be reordered. Returns `None` when it is empty.
    fn reduce(&self, sample: &mut [f64]) -> Option<Vec<f64>>;
}

const QUANTILE_STATISTICS: [Statistic; 7] = [
    Statistic::Quantile(QuantileLevel::Q05),
    Statistic::Quantile(QuantileLevel::Q10),
    Statistic::Quantile(QuantileLevel::Q25),
    Statistic::Quantile(QuantileLevel::Q50),
    Statistic::Quantile(QuantileLevel::Q75),
    Statistic::Quantile(QuantileLevel::Q90),
    Statistic::Quantile(QuantileLevel::Q95),
];

/// Seven interpolated quantiles per group.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuantileReducer;

impl Reducer for QuantileReducer {
    fn name(&self) -> &'static str {
        "quantiles"
    }

    fn statistics(&self) -> &[Statistic] {
        &QUANTILE_STATISTICS
    }

    fn reduce(&self, sample: &mut [f64]) -> Option<Vec<f64>> {
        sort_sample(sample);
        band_sorted(sample).map(|band| band.values.to_vec())
    }
}

/// Arithmetic mean per group.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanReducer;

impl Reducer for MeanReducer {
    fn name(&self) -> &'static str {
        "mean"
    }

    fn statistics(&self) -> &[Statistic] {
        &[Statistic::Mean]
    }

    fn reduce(&self, sample: &mut [f64]) -> Option<Vec<f64>> {
        mean(sample).map(|m| vec![m])
    }
}

/// Reducer selection for configuration and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReducerKind {
    /// Q05, Q10, Q25, Q50, Q75, Q90, Q95 per metric (default)
    #[default]
    Quantiles,
    /// Arithmetic mean per metric
    Mean,
}

impl ReducerKind {
    pub fn build(self) -> Box<dyn Reducer> {
        match self {
            ReducerKind::Quantiles => Box::new(QuantileReducer),
            ReducerKind::Mean => Box::new(MeanReducer),
        }
    }
}
