//! Run file discovery.
//!
//! Run files are numbered from 0 through a printf-style template such as
//! `out/beecs-%04d.csv`. Three strategies are offered:
//!
//! - `probe` stops at the first missing index. Files past the gap are
//!   reported but never loaded.
//! - `listing` reads the directory once and rejects any gap.
//! - an explicit run count requires exactly runs `0..n`.

use crate::error::{AggregateError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// How run files are located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// Probe indices 0, 1, 2, ... until one is missing
    #[default]
    Probe,
    /// List the directory and require contiguous indices
    Listing,
}

/// A file-name template with one integer placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPattern {
    raw: String,
    prefix: String,
    width: usize,
    suffix: String,
}

impl RunPattern {
    /// Parse a template containing exactly one `%d` or `%0Nd`.
    ///
    /// `%%` stands for a literal percent sign.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| AggregateError::InvalidPattern {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut width = None;
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            let target = if width.is_some() { &mut suffix } else { &mut prefix };
            if c != '%' {
                target.push(c);
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                target.push('%');
                continue;
            }
            if width.is_some() {
                return Err(invalid("more than one placeholder"));
            }

            let mut digits = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(d);
                chars.next();
            }
            if chars.next() != Some('d') {
                return Err(invalid("placeholder must be %d or %0Nd"));
            }
            if !digits.is_empty() && !digits.starts_with('0') {
                return Err(invalid("only zero padding is supported"));
            }
            width = Some(digits.parse::<usize>().unwrap_or(0));
        }

        let width = width.ok_or_else(|| invalid("no %d placeholder"))?;
        if suffix.contains('/') || suffix.contains(std::path::MAIN_SEPARATOR) {
            return Err(invalid("placeholder must be in the file name"));
        }

        Ok(Self {
            raw: raw.to_string(),
            prefix,
            width,
            suffix,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Relative path of run `index`.
    pub fn format(&self, index: usize) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            index,
            self.suffix,
            width = self.width
        )
    }

    /// Directory part of the template, relative to the base directory.
    fn directory(&self) -> PathBuf {
        Path::new(&self.format(0))
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Run index encoded in a bare file name, if it matches the template.
    pub fn match_file_name(&self, name: &str) -> Option<usize> {
        let file_prefix = self
            .prefix
            .rsplit(|c: char| c == '/' || c == std::path::MAIN_SEPARATOR)
            .next()
            .unwrap_or("");

        let digits = name
            .strip_prefix(file_prefix)?
            .strip_suffix(self.suffix.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let index: usize = digits.parse().ok()?;

        // Only the canonical spelling counts: "0007" matches %04d, "07" does not.
        if format!("{:0width$}", index, width = self.width) == digits {
            Some(index)
        } else {
            None
        }
    }
}

/// Discovery settings.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub mode: DiscoveryMode,
    /// Exact number of runs expected; overrides `mode` when set.
    pub expected_runs: Option<usize>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::Probe,
            expected_runs: None,
        }
    }
}

impl From<&crate::config::AggregationConfig> for DiscoveryConfig {
    fn from(config: &crate::config::AggregationConfig) -> Self {
        Self {
            mode: config.discovery,
            expected_runs: config.runs,
        }
    }
}

/// A run file selected for loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredRun {
    pub index: usize,
    pub path: PathBuf,
}

/// Locates the run files of one scenario.
pub struct RunDiscovery {
    base_dir: PathBuf,
    pattern: RunPattern,
    config: DiscoveryConfig,
}

impl RunDiscovery {
    /// Create a discovery for `pattern` relative to `base_dir`.
    pub fn new(base_dir: PathBuf, pattern: RunPattern, config: DiscoveryConfig) -> Self {
        Self {
            base_dir,
            pattern,
            config,
        }
    }

    /// Find the run files, ordered by index.
    pub fn discover(&self) -> Result<Vec<DiscoveredRun>> {
        let runs = match (self.config.expected_runs, self.config.mode) {
            (Some(count), _) => self.discover_count(count)?,
            (None, DiscoveryMode::Probe) => self.discover_probe()?,
            (None, DiscoveryMode::Listing) => self.discover_listing()?,
        };

        if runs.is_empty() {
            return Err(AggregateError::NoRuns {
                pattern: self.display_pattern(),
            });
        }

        debug!("Discovered {} run files", runs.len());
        Ok(runs)
    }

    fn run_path(&self, index: usize) -> PathBuf {
        self.base_dir.join(self.pattern.format(index))
    }

    fn display_pattern(&self) -> String {
        self.base_dir
            .join(self.pattern.as_str())
            .display()
            .to_string()
    }

    fn discover_probe(&self) -> Result<Vec<DiscoveredRun>> {
        let mut runs = Vec::new();

        loop {
            let path = self.run_path(runs.len());
            if !path.is_file() {
                break;
            }
            runs.push(DiscoveredRun {
                index: runs.len(),
                path,
            });
        }

        let missing = runs.len();
        if missing > 0 {
            let stragglers: Vec<usize> = self
                .list_indices()
                .into_iter()
                .filter(|&idx| idx > missing)
                .collect();
            if let Some(first) = stragglers.first() {
                warn!(
                    "Run {} is missing; ignoring {} later run file(s) starting at run {}",
                    missing,
                    stragglers.len(),
                    first
                );
            }
        }

        Ok(runs)
    }

    fn discover_listing(&self) -> Result<Vec<DiscoveredRun>> {
        let indices = self.list_indices();

        for (expected, &found) in indices.iter().enumerate() {
            if found != expected {
                return Err(AggregateError::RunGap {
                    pattern: self.display_pattern(),
                    missing: expected,
                    found,
                });
            }
        }

        Ok(indices
            .into_iter()
            .map(|index| DiscoveredRun {
                index,
                path: self.run_path(index),
            })
            .collect())
    }

    fn discover_count(&self, count: usize) -> Result<Vec<DiscoveredRun>> {
        (0..count)
            .map(|index| {
                let path = self.run_path(index);
                if path.is_file() {
                    Ok(DiscoveredRun { index, path })
                } else {
                    Err(AggregateError::MissingRun { path })
                }
            })
            .collect()
    }

    /// Sorted, deduplicated run indices present in the pattern's directory.
    fn list_indices(&self) -> Vec<usize> {
        let dir = self.base_dir.join(self.pattern.directory());
        let dir = if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir
        };

        let mut indices: Vec<usize> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Cannot read entry in {}: {}", dir.display(), e);
                    None
                }
            })
            // Follows links, like the probe and count strategies.
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| self.pattern.match_file_name(name))
            })
            .collect();

        indices.sort_unstable();
        indices.dedup();
        indices
    }
}
