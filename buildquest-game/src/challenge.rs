//! Challenge contract consumed by quests and quest tasks.
//!
//! A Challenge is a single coverage or test-improvement goal. The engine only
//! needs its solved/solvable checks, its score and a stable identity; concrete
//! challenge families live outside this crate except for the line coverage
//! challenge that quests are assembled from.

pub mod line_coverage;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::EvaluationContext;

pub use line_coverage::LineCoverageChallenge;

/// Family a Challenge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    Build,
    ClassCoverage,
    MethodCoverage,
    LineCoverage,
    BranchCoverage,
    Mutation,
    Smell,
    Test,
    Dummy,
}

impl ChallengeKind {
    #[must_use]
    pub const fn is_coverage(self) -> bool {
        matches!(
            self,
            Self::ClassCoverage | Self::MethodCoverage | Self::LineCoverage | Self::BranchCoverage
        )
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Build => "Build",
            Self::ClassCoverage => "Class Coverage",
            Self::MethodCoverage => "Method Coverage",
            Self::LineCoverage => "Line Coverage",
            Self::BranchCoverage => "Branch Coverage",
            Self::Mutation => "Mutation",
            Self::Smell => "Smell",
            Self::Test => "Test",
            Self::Dummy => "Dummy",
        }
    }
}

/// Which Challenges a counting quest task accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeFilter {
    #[default]
    Any,
    Coverage,
    Kind(ChallengeKind),
}

impl ChallengeFilter {
    #[must_use]
    pub const fn matches(self, kind: ChallengeKind) -> bool {
        match self {
            Self::Any => true,
            Self::Coverage => kind.is_coverage(),
            Self::Kind(wanted) => wanted as u8 == kind as u8,
        }
    }

    /// Prefix used in "Solve three {label}Challenges".
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Any => "",
            Self::Coverage => "Coverage",
            Self::Kind(kind) => kind.label(),
        }
    }
}

/// Stable identity of a Challenge used for equality and duplicate checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChallengeKey(String);

impl ChallengeKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChallengeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The evaluation surface of a single Challenge.
pub trait Challenge: fmt::Debug + Send + Sync {
    fn kind(&self) -> ChallengeKind;

    fn key(&self) -> ChallengeKey;

    /// Creation time in epoch milliseconds.
    fn created(&self) -> i64;

    /// Solve time in epoch milliseconds, 0 while unsolved.
    fn solved(&self) -> i64;

    fn is_solved(&mut self, ctx: &EvaluationContext<'_>) -> bool;

    fn is_solvable(&self, ctx: &EvaluationContext<'_>) -> bool;

    /// Refresh time-sensitive state when the Challenge becomes current.
    fn update(&mut self, ctx: &EvaluationContext<'_>);

    fn score(&self) -> u32;

    fn escaped_string(&self) -> String;

    fn to_xml(&self, reason: Option<&str>, indentation: usize) -> String;

    fn record(&self) -> ChallengeRecord {
        ChallengeRecord {
            kind: self.kind(),
            key: self.key(),
            description: self.escaped_string(),
            created: self.created(),
            solved: self.solved(),
            score: self.score(),
        }
    }
}

/// Non-owning snapshot of a Challenge kept in per-user history lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub kind: ChallengeKind,
    pub key: ChallengeKey,
    #[serde(default)]
    pub description: String,
    pub created: i64,
    #[serde(default)]
    pub solved: i64,
    #[serde(default)]
    pub score: u32,
}

/// A Challenge the user turned down, with when and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedChallenge {
    pub record: ChallengeRecord,
    pub reason: String,
    pub rejected_at: i64,
}
