//! Build snapshot handed to every evaluation call.
//!
//! One `EvaluationContext` describes a single finished build from the point
//! of view of one user: the files under test, the report locations, the
//! free-form parameters the project was configured with, and the metric
//! provider used to read point-in-time counts.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::metrics::{MetricsError, MetricsProvider};

/// Coverage state of a single coverable line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Covered,
    Partial,
    Missed,
}

impl LineStatus {
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Partial | Self::Missed)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Covered => "fc",
            Self::Partial => "pc",
            Self::Missed => "nc",
        }
    }
}

/// A coverable line as reported by the coverage tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageLine {
    pub number: u32,
    pub content: String,
    pub status: LineStatus,
    #[serde(default)]
    pub covered_branches: u32,
    #[serde(default)]
    pub total_branches: u32,
}

impl CoverageLine {
    /// Lines consisting only of braces or declarations are never offered as goals.
    #[must_use]
    pub fn is_meaningful(&self) -> bool {
        let trimmed = self.content.trim();
        !(trimmed.is_empty()
            || trimmed == "{"
            || trimmed == "}"
            || trimmed.starts_with("package ")
            || trimmed.starts_with("import "))
    }
}

/// A source file with its coverage and change attribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    #[serde(default)]
    pub package: String,
    pub class_name: String,
    /// Line coverage ratio in `[0, 1]`.
    pub coverage: f64,
    #[serde(default)]
    pub changed_by: BTreeSet<String>,
    #[serde(default)]
    pub lines: Vec<CoverageLine>,
    #[serde(default)]
    pub is_test: bool,
}

impl SourceFile {
    #[must_use]
    pub fn is_changed_by(&self, user: &str) -> bool {
        self.changed_by.contains(user)
    }

    #[must_use]
    pub fn qualified_name(&self) -> String {
        if self.package.is_empty() {
            self.class_name.clone()
        } else {
            format!("{}.{}", self.package, self.class_name)
        }
    }

    /// Lines that still need work and are not structural noise.
    pub fn open_lines(&self) -> impl Iterator<Item = &CoverageLine> {
        self.lines
            .iter()
            .filter(|line| line.status.is_open() && line.is_meaningful())
    }

    #[must_use]
    pub fn line(&self, number: u32) -> Option<&CoverageLine> {
        self.lines.iter().find(|line| line.number == number)
    }
}

/// Outcome of the triggering build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildResult {
    #[default]
    Success,
    Unstable,
    Failure,
}

/// Facts about the build that triggered the evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub number: u32,
    #[serde(default)]
    pub result: BuildResult,
    /// Wall time of the build in seconds.
    #[serde(default)]
    pub duration_secs: u64,
    #[serde(default)]
    pub failed_tests: u32,
    #[serde(default)]
    pub total_tests: u32,
    #[serde(default)]
    pub project_coverage: f64,
}

/// Report file locations handed to metric providers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPaths {
    pub workspace: PathBuf,
    #[serde(default)]
    pub jacoco_csv: PathBuf,
    #[serde(default)]
    pub junit_results: PathBuf,
}

/// Everything a Challenge, QuestTask or detector may look at.
pub struct EvaluationContext<'a> {
    pub project: &'a str,
    pub branch: &'a str,
    pub user: &'a str,
    pub files: &'a [SourceFile],
    pub parameters: &'a BTreeMap<String, String>,
    pub build: &'a BuildInfo,
    pub reports: &'a ReportPaths,
    pub metrics: &'a dyn MetricsProvider,
    /// Epoch milliseconds of this evaluation pass.
    pub now: i64,
}

impl<'a> EvaluationContext<'a> {
    /// Files the evaluated user changed.
    pub fn user_files(&self) -> impl Iterator<Item = &'a SourceFile> + '_ {
        self.files.iter().filter(|file| file.is_changed_by(self.user))
    }

    #[must_use]
    pub fn file(&self, path: &str) -> Option<&'a SourceFile> {
        self.files.iter().find(|file| file.path == path)
    }

    /// # Errors
    ///
    /// Propagates the provider's failure to read the coverage report.
    pub fn covered_lines(&self) -> Result<u32, MetricsError> {
        self.metrics.covered_lines(&self.reports.jacoco_csv)
    }

    /// # Errors
    ///
    /// Propagates the provider's failure to read the coverage report.
    pub fn covered_branches(&self) -> Result<u32, MetricsError> {
        self.metrics.covered_branches(&self.reports.jacoco_csv)
    }

    /// # Errors
    ///
    /// Propagates the provider's failure to read the test results.
    pub fn test_count(&self) -> Result<u32, MetricsError> {
        self.metrics.test_count(&self.reports.junit_results)
    }
}

impl std::fmt::Debug for EvaluationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("project", &self.project)
            .field("branch", &self.branch)
            .field("user", &self.user)
            .field("files", &self.files.len())
            .field("build", &self.build)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::metrics::MetricsSnapshot;

    pub(crate) fn line(number: u32, content: &str, status: LineStatus) -> CoverageLine {
        CoverageLine {
            number,
            content: content.to_string(),
            status,
            covered_branches: 0,
            total_branches: 0,
        }
    }

    pub(crate) fn source_file(path: &str, coverage: f64, user: &str, open: u32) -> SourceFile {
        let mut lines = vec![line(1, "{", LineStatus::Missed)];
        for number in 0..open {
            lines.push(line(
                number + 2,
                &format!("total += value{number};"),
                LineStatus::Missed,
            ));
        }
        lines.push(line(open + 2, "return total;", LineStatus::Covered));
        SourceFile {
            path: path.to_string(),
            package: "org.example".to_string(),
            class_name: path
                .rsplit('/')
                .next()
                .unwrap_or(path)
                .trim_end_matches(".java")
                .to_string(),
            coverage,
            changed_by: [user.to_string()].into_iter().collect(),
            lines,
            is_test: false,
        }
    }

    /// Owns every borrowed piece of an `EvaluationContext`.
    pub(crate) struct Harness {
        pub files: Vec<SourceFile>,
        pub parameters: BTreeMap<String, String>,
        pub build: BuildInfo,
        pub reports: ReportPaths,
        pub metrics: MetricsSnapshot,
        pub now: i64,
    }

    impl Harness {
        pub(crate) fn new(files: Vec<SourceFile>) -> Self {
            Self {
                files,
                parameters: BTreeMap::new(),
                build: BuildInfo::default(),
                reports: ReportPaths::default(),
                metrics: MetricsSnapshot::default(),
                now: 1_000,
            }
        }

        pub(crate) fn ctx(&self) -> EvaluationContext<'_> {
            EvaluationContext {
                project: "demo",
                branch: "main",
                user: "alice",
                files: &self.files,
                parameters: &self.parameters,
                build: &self.build,
                reports: &self.reports,
                metrics: &self.metrics,
                now: self.now,
            }
        }
    }
}
