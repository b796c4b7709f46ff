//! Markdown and JSON report generation.
//!
//! This module renders band comparison reports and aggregation
//! summaries.

use crate::models::{
    AggregationSummary, CandidateComparison, ComparisonMetadata, ComparisonReport,
    MetricComparison, QuantileBand, QuantileLevel,
};
use anyhow::Result;

/// Generate a complete Markdown comparison report.
pub fn generate_markdown_report(report: &ComparisonReport) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Band Comparison Report\n\n");

    // Metadata section
    output.push_str(&generate_metadata_section(&report.metadata));

    // Overview table
    output.push_str(&generate_summary_section(&report.metrics));

    // Per-metric checkpoints
    output.push_str(&generate_checkpoints_section(&report.metrics));

    // Skipped metrics
    output.push_str(&generate_skipped_section(&report.skipped));

    // Footer
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ComparisonMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Reference:** `{}`\n", metadata.reference));
    for candidate in &metadata.candidates {
        section.push_str(&format!("- **Candidate:** `{}`\n", candidate));
    }
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(day) = metadata.app_day.filter(|d| *d > 0.0) {
        section.push_str(&format!("- **Application Day:** {}\n", day));
    }
    section.push_str(&format!("- **Simulated Years:** {}\n", metadata.years));
    section.push('\n');

    section
}

/// Generate the per-metric overview table.
fn generate_summary_section(metrics: &[MetricComparison]) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");

    if metrics.is_empty() {
        section.push_str("No metric is shared between the reference and any candidate.\n\n");
        return section;
    }

    section.push_str("| Metric | Candidate | Ticks | Max \\|ΔQ50\\| | Mean \\|ΔQ50\\| | In Band |\n");
    section.push_str("|:---|:---|:---:|---:|---:|---:|\n");

    for metric in metrics {
        for cmp in &metric.candidates {
            section.push_str(&generate_summary_row(&metric.metric, cmp));
        }
    }
    section.push('\n');

    section
}

fn generate_summary_row(metric: &str, cmp: &CandidateComparison) -> String {
    let ticks = if cmp.non_finite_ticks > 0 {
        format!("{} ({} non-finite)", cmp.shared_ticks, cmp.non_finite_ticks)
    } else {
        cmp.shared_ticks.to_string()
    };

    format!(
        "| {} | {} | {} | {} | {} | {} |\n",
        metric,
        cmp.candidate,
        ticks,
        format_optional(cmp.max_median_gap),
        format_optional(cmp.mean_median_gap),
        cmp.band_coverage
            .map(|c| format!("{:.1}%", c * 100.0))
            .unwrap_or_else(|| "-".to_string()),
    )
}

/// Generate checkpoint tables, one per metric.
fn generate_checkpoints_section(metrics: &[MetricComparison]) -> String {
    let has_checkpoints = metrics
        .iter()
        .flat_map(|m| &m.candidates)
        .any(|c| !c.checkpoints.is_empty());
    if !has_checkpoints {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Checkpoints\n\n");

    for metric in metrics {
        section.push_str(&format!("### {}\n\n", metric.metric));
        section.push_str("| Checkpoint | Tick | Table | Q05 | Q50 | Q95 |\n");
        section.push_str("|:---|:---:|:---|---:|---:|---:|\n");

        for cmp in &metric.candidates {
            for point in &cmp.checkpoints {
                section.push_str(&format!(
                    "| {} | {} | reference | {} |\n",
                    point.label,
                    point.tick,
                    format_band(point.reference.as_ref())
                ));
                section.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    point.label,
                    point.tick,
                    cmp.candidate,
                    format_band(point.candidate.as_ref())
                ));
            }
        }
        section.push('\n');
    }

    section
}

/// Generate the skipped-metrics section.
fn generate_skipped_section(skipped: &[(String, String)]) -> String {
    if skipped.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Skipped Metrics\n\n");
    for (metric, candidate) in skipped {
        section.push_str(&format!("- `{}` is missing from `{}`\n", metric, candidate));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by simbands v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

fn format_optional(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.3}", v))
        .unwrap_or_else(|| "-".to_string())
}

fn format_band(band: Option<&QuantileBand>) -> String {
    match band {
        Some(band) => format!(
            "{:.3} | {:.3} | {:.3}",
            band.get(QuantileLevel::Q05),
            band.get(QuantileLevel::Q50),
            band.get(QuantileLevel::Q95)
        ),
        None => "- | - | -".to_string(),
    }
}

/// Generate a JSON comparison report.
pub fn generate_json_report(report: &ComparisonReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Generate a JSON aggregation summary.
pub fn generate_summary_json(summary: &AggregationSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Checkpoint, RunSource, Tick};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn create_test_report() -> ComparisonReport {
        ComparisonReport {
            metadata: ComparisonMetadata {
                reference: "netlogo.csv".to_string(),
                candidates: vec!["beecs.csv".to_string()],
                generated_at: Utc::now(),
                app_day: Some(189.0),
                years: 1,
            },
            metrics: vec![MetricComparison {
                metric: "TotalPop".to_string(),
                candidates: vec![CandidateComparison {
                    candidate: "beecs.csv".to_string(),
                    shared_ticks: 365,
                    non_finite_ticks: 2,
                    max_median_gap: Some(120.5),
                    mean_median_gap: Some(14.25),
                    band_coverage: Some(0.975),
                    checkpoints: vec![Checkpoint {
                        tick: 189.0,
                        label: "application day".to_string(),
                        reference: Some(QuantileBand {
                            values: [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
                        }),
                        candidate: None,
                    }],
                }],
            }],
            skipped: vec![("Honey".to_string(), "beecs.csv".to_string())],
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&create_test_report());

        assert!(markdown.contains("# Band Comparison Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("**Application Day:** 189"));
        assert!(markdown.contains("## Summary"));
        assert!(markdown.contains("| TotalPop | beecs.csv | 365 (2 non-finite) | 120.500 | 14.250 | 97.5% |"));
        assert!(markdown.contains("## Checkpoints"));
        assert!(markdown.contains("| application day | 189 | reference | 1.000 | 4.000 | 7.000 |"));
        assert!(markdown.contains("| application day | 189 | beecs.csv | - | - | - |"));
        assert!(markdown.contains("`Honey` is missing from `beecs.csv`"));
    }

    #[test]
    fn test_empty_report() {
        let mut report = create_test_report();
        report.metrics.clear();
        report.skipped.clear();

        let markdown = generate_markdown_report(&report);
        assert!(markdown.contains("No metric is shared"));
        assert!(!markdown.contains("## Checkpoints"));
        assert!(!markdown.contains("## Skipped Metrics"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_report()).unwrap();

        assert!(json.contains("\"reference\""));
        assert!(json.contains("\"band_coverage\""));
        assert!(json.contains("\"checkpoints\""));
    }

    #[test]
    fn test_generate_summary_json() {
        let summary = AggregationSummary {
            source: "out/beecs-%04d.csv".to_string(),
            output: PathBuf::from("beecs.csv"),
            reducer: "quantiles".to_string(),
            generated_at: Utc::now(),
            runs: vec![RunSource {
                id: 0,
                label: "0".to_string(),
                path: PathBuf::from("out/beecs-0000.csv"),
                rows: 365,
            }],
            metrics: vec!["TotalPop".to_string()],
            rows: 365,
            columns: 8,
            first_tick: Tick::new(0.0),
            last_tick: Tick::new(364.0),
            infinite_cells: BTreeMap::new(),
            duration_seconds: 0.25,
        };

        let json = generate_summary_json(&summary).unwrap();
        assert!(json.contains("\"reducer\": \"quantiles\""));
        assert!(json.contains("\"last_tick\": 364.0"));
    }
}
