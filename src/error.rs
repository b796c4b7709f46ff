//! Error types for discovery, loading, reduction and persistence.
//!
//! Every variant aborts the aggregation it occurs in; nothing here is
//! recovered locally.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the aggregation pipeline.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// No run file exists for the pattern (index 0 missing).
    #[error("no run files found for pattern {pattern}")]
    NoRuns { pattern: String },

    /// The run file template is unusable.
    #[error("invalid run file pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The ensemble handed to a reducer holds no records.
    #[error("ensemble contains no run records")]
    EmptyEnsemble,

    /// A strict discovery strategy found a hole in the run indices.
    #[error("run {missing} is missing but run {found} exists (pattern {pattern})")]
    RunGap {
        pattern: String,
        missing: usize,
        found: usize,
    },

    /// An explicitly requested run file does not exist.
    #[error("expected run file not found: {}", path.display())]
    MissingRun { path: PathBuf },

    /// A cell or row could not be interpreted.
    #[error("{}{}: {message}", path.display(), line.map(|l| format!(":{}", l)).unwrap_or_default())]
    Parse {
        path: PathBuf,
        line: Option<u64>,
        message: String,
    },

    /// A required column is absent from a table header.
    #[error("{}: missing column '{column}'", path.display())]
    MissingColumn { path: PathBuf, column: String },

    /// A run's metric columns differ from the first run's.
    #[error("{}: metric columns differ from the first run (expected [{}], found [{}])", path.display(), expected.join(", "), found.join(", "))]
    ColumnMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// An input file uses a column name the pipeline reserves for itself.
    #[error("{}: column '{column}' is reserved", path.display())]
    ReservedColumn { path: PathBuf, column: String },

    /// A reducer was asked to summarise zero values.
    #[error("empty sample for metric '{metric}' at tick {tick}")]
    EmptySample { metric: String, tick: String },

    /// A persisted table does not follow the quantile column convention.
    #[error("{}: {message}", path.display())]
    InvalidTable { path: PathBuf, message: String },

    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The delimited reader or writer failed.
    #[error("{}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl AggregateError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a csv error, lifting malformed-row failures into `Parse`.
    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        let path = path.into();
        let line = source.position().map(|p| p.line());
        match source.kind() {
            csv::ErrorKind::UnequalLengths { expected_len, len, .. } => Self::Parse {
                path,
                line,
                message: format!("expected {} fields, found {}", expected_len, len),
            },
            csv::ErrorKind::Utf8 { .. } => Self::Parse {
                path,
                line,
                message: "invalid UTF-8".to_string(),
            },
            _ => Self::Csv { path, source },
        }
    }

    /// Shift a `Parse` line number by lines consumed before the reader.
    pub fn offset_line(self, offset: u64) -> Self {
        match self {
            Self::Parse {
                path,
                line,
                message,
            } => Self::Parse {
                path,
                line: line.map(|l| l + offset),
                message,
            },
            other => other,
        }
    }
}

/// Result alias for pipeline operations.
pub type Result<T, E = AggregateError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display_with_line() {
        let err = AggregateError::Parse {
            path: PathBuf::from("out/run-0001.csv"),
            line: Some(7),
            message: "non-numeric value 'abc' in column 'TotalPop'".to_string(),
        };
        let text = err.to_string();
        assert!(text.starts_with("out/run-0001.csv:7:"));
        assert!(text.contains("TotalPop"));
    }

    #[test]
    fn test_offset_line_only_touches_parse_lines() {
        let err = AggregateError::Parse {
            path: PathBuf::from("netlogo.csv"),
            line: Some(2),
            message: "expected 3 fields, found 4".to_string(),
        };
        match err.offset_line(6) {
            AggregateError::Parse { line, .. } => assert_eq!(line, Some(8)),
            other => panic!("unexpected error: {}", other),
        }

        let other = AggregateError::EmptyEnsemble.offset_line(6);
        assert!(matches!(other, AggregateError::EmptyEnsemble));
    }

    #[test]
    fn test_parse_error_display_without_line() {
        let err = AggregateError::Parse {
            path: PathBuf::from("a.csv"),
            line: None,
            message: "empty file".to_string(),
        };
        assert_eq!(err.to_string(), "a.csv: empty file");
    }

    #[test]
    fn test_no_runs_message() {
        let err = AggregateError::NoRuns {
            pattern: "out/beecs-%04d.csv".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no run files found for pattern out/beecs-%04d.csv"
        );
    }
}
