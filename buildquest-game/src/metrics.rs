//! Metric providers: covered lines, covered branches and test counts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("report not found: {}", path.display())]
    MissingReport { path: PathBuf },
    #[error("report {} could not be read: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },
}

/// Reads integer metrics from build reports.
///
/// Implementations must return point-in-time consistent values for the
/// duration of one evaluation pass.
pub trait MetricsProvider {
    /// # Errors
    ///
    /// Returns an error if the coverage report cannot be read.
    fn covered_lines(&self, report: &Path) -> Result<u32, MetricsError>;

    /// # Errors
    ///
    /// Returns an error if the coverage report cannot be read.
    fn covered_branches(&self, report: &Path) -> Result<u32, MetricsError>;

    /// # Errors
    ///
    /// Returns an error if the test results cannot be read.
    fn test_count(&self, report: &Path) -> Result<u32, MetricsError>;
}

/// Counts captured once per build; the report paths are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub covered_lines: u32,
    pub covered_branches: u32,
    pub tests: u32,
}

impl MetricsSnapshot {
    #[must_use]
    pub const fn new(covered_lines: u32, covered_branches: u32, tests: u32) -> Self {
        Self {
            covered_lines,
            covered_branches,
            tests,
        }
    }
}

impl MetricsProvider for MetricsSnapshot {
    fn covered_lines(&self, _report: &Path) -> Result<u32, MetricsError> {
        Ok(self.covered_lines)
    }

    fn covered_branches(&self, _report: &Path) -> Result<u32, MetricsError> {
        Ok(self.covered_branches)
    }

    fn test_count(&self, _report: &Path) -> Result<u32, MetricsError> {
        Ok(self.tests)
    }
}

/// Provider for builds whose reports were not produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingReports;

impl MetricsProvider for MissingReports {
    fn covered_lines(&self, report: &Path) -> Result<u32, MetricsError> {
        Err(MetricsError::MissingReport {
            path: report.to_path_buf(),
        })
    }

    fn covered_branches(&self, report: &Path) -> Result<u32, MetricsError> {
        Err(MetricsError::MissingReport {
            path: report.to_path_buf(),
        })
    }

    fn test_count(&self, report: &Path) -> Result<u32, MetricsError> {
        Err(MetricsError::MissingReport {
            path: report.to_path_buf(),
        })
    }
}
