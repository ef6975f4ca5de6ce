//! Named evaluation capabilities bound to achievements.
//!
//! A catalog entry names its detector as `"namespace::name"`. The registry maps
//! those names to typed function values once at start-up; every achievement is
//! resolved against it eagerly so unknown names fail construction instead of
//! the first evaluation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use super::AchievementError;
use crate::challenge::{ChallengeKind, ChallengeRecord};
use crate::constants::{BUILTIN_DETECTOR_NAMESPACE, DETECTOR_SEPARATOR};
use crate::context::{BuildResult, EvaluationContext};
use crate::metrics::MetricsError;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error("detector {detector} failed: {reason}")]
    Failed { detector: String, reason: String },
}

/// `(namespace, name)` pair naming a detector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DetectorReference {
    namespace: String,
    name: String,
}

impl DetectorReference {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Reference into the built-in namespace.
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::new(BUILTIN_DETECTOR_NAMESPACE, name)
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DetectorReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{DETECTOR_SEPARATOR}{}", self.namespace, self.name)
    }
}

impl FromStr for DetectorReference {
    type Err = AchievementError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.rsplit_once(DETECTOR_SEPARATOR) {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self::new(namespace, name))
            }
            _ => Err(AchievementError::MalformedReference {
                value: value.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for DetectorReference {
    type Error = AchievementError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DetectorReference> for String {
    fn from(reference: DetectorReference) -> Self {
        reference.to_string()
    }
}

/// The fixed argument tuple every detector receives.
#[derive(Clone, Copy)]
pub struct DetectorArgs<'a, 'c> {
    pub ctx: &'a EvaluationContext<'c>,
    pub completed_challenges: &'a [ChallengeRecord],
    /// Challenges the user solved in the triggering build.
    pub solved_this_build: usize,
    /// The achievement's own configuration.
    pub parameters: &'a BTreeMap<String, String>,
}

impl DetectorArgs<'_, '_> {
    fn number(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(|raw| raw.trim().parse().ok())
    }

    /// Threshold parameters that are missing or invalid are never reached.
    fn threshold(&self, key: &str) -> f64 {
        self.number(key).unwrap_or(f64::INFINITY)
    }

    fn count(&self, key: &str) -> Option<u32> {
        self.parameters.get(key).and_then(|raw| raw.trim().parse().ok())
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.parameters.get(key).and_then(|raw| raw.trim().parse().ok())
    }
}

impl fmt::Debug for DetectorArgs<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorArgs")
            .field("ctx", self.ctx)
            .field("completed_challenges", &self.completed_challenges.len())
            .field("solved_this_build", &self.solved_this_build)
            .field("parameters", self.parameters)
            .finish()
    }
}

pub type CheckFn = dyn Fn(&DetectorArgs<'_, '_>) -> Result<bool, DetectorError> + Send + Sync;
pub type MeasureFn = dyn Fn(&DetectorArgs<'_, '_>) -> Result<f64, DetectorError> + Send + Sync;
pub type CountFn = dyn Fn(&DetectorArgs<'_, '_>) -> Result<i64, DetectorError> + Send + Sync;

/// What a detector returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    Check,
    Measure,
    Count,
}

#[derive(Clone)]
enum Detector {
    Check(Arc<CheckFn>),
    Measure(Arc<MeasureFn>),
    Count(Arc<CountFn>),
}

impl Detector {
    const fn kind(&self) -> DetectorKind {
        match self {
            Self::Check(_) => DetectorKind::Check,
            Self::Measure(_) => DetectorKind::Measure,
            Self::Count(_) => DetectorKind::Count,
        }
    }
}

/// Capability name to function value.
#[derive(Clone, Default)]
pub struct DetectorRegistry {
    detectors: HashMap<DetectorReference, Detector>,
}

impl DetectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in detector.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        builtin::register(&mut registry);
        registry
    }

    pub fn register_check<F>(&mut self, reference: DetectorReference, detector: F)
    where
        F: Fn(&DetectorArgs<'_, '_>) -> Result<bool, DetectorError> + Send + Sync + 'static,
    {
        self.detectors
            .insert(reference, Detector::Check(Arc::new(detector)));
    }

    pub fn register_measure<F>(&mut self, reference: DetectorReference, detector: F)
    where
        F: Fn(&DetectorArgs<'_, '_>) -> Result<f64, DetectorError> + Send + Sync + 'static,
    {
        self.detectors
            .insert(reference, Detector::Measure(Arc::new(detector)));
    }

    pub fn register_count<F>(&mut self, reference: DetectorReference, detector: F)
    where
        F: Fn(&DetectorArgs<'_, '_>) -> Result<i64, DetectorError> + Send + Sync + 'static,
    {
        self.detectors
            .insert(reference, Detector::Count(Arc::new(detector)));
    }

    #[must_use]
    pub fn contains(&self, reference: &DetectorReference) -> bool {
        self.detectors.contains_key(reference)
    }

    /// Registered names with their result kind, sorted by name.
    #[must_use]
    pub fn names(&self) -> Vec<(String, DetectorKind)> {
        let mut names: Vec<_> = self
            .detectors
            .iter()
            .map(|(reference, detector)| (reference.to_string(), detector.kind()))
            .collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));
        names
    }

    fn lookup(&self, reference: &DetectorReference) -> Result<&Detector, AchievementError> {
        self.detectors
            .get(reference)
            .ok_or_else(|| AchievementError::UnknownDetector {
                reference: reference.to_string(),
            })
    }

    /// # Errors
    ///
    /// Fails when the name is unknown or registered with another result kind.
    pub fn resolve_check(
        &self,
        reference: &DetectorReference,
    ) -> Result<Arc<CheckFn>, AchievementError> {
        match self.lookup(reference)? {
            Detector::Check(check) => Ok(Arc::clone(check)),
            other => Err(mismatch(reference, DetectorKind::Check, other)),
        }
    }

    /// # Errors
    ///
    /// Fails when the name is unknown or registered with another result kind.
    pub fn resolve_measure(
        &self,
        reference: &DetectorReference,
    ) -> Result<Arc<MeasureFn>, AchievementError> {
        match self.lookup(reference)? {
            Detector::Measure(measure) => Ok(Arc::clone(measure)),
            other => Err(mismatch(reference, DetectorKind::Measure, other)),
        }
    }

    /// # Errors
    ///
    /// Fails when the name is unknown or registered with another result kind.
    pub fn resolve_count(
        &self,
        reference: &DetectorReference,
    ) -> Result<Arc<CountFn>, AchievementError> {
        match self.lookup(reference)? {
            Detector::Count(count) => Ok(Arc::clone(count)),
            other => Err(mismatch(reference, DetectorKind::Count, other)),
        }
    }
}

fn mismatch(
    reference: &DetectorReference,
    expected: DetectorKind,
    found: &Detector,
) -> AchievementError {
    AchievementError::DetectorKindMismatch {
        reference: reference.to_string(),
        expected,
        found: found.kind(),
    }
}

impl fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorRegistry")
            .field("detectors", &self.names())
            .finish()
    }
}

mod builtin {
    use super::*;

    pub(super) fn register(registry: &mut DetectorRegistry) {
        registry.register_check(
            DetectorReference::builtin("solve_x_challenges"),
            solve_x_challenges,
        );
        registry.register_check(DetectorReference::builtin("solve_x_at_once"), solve_x_at_once);
        registry.register_check(
            DetectorReference::builtin("have_x_project_coverage"),
            have_x_project_coverage,
        );
        registry.register_check(
            DetectorReference::builtin("have_x_project_tests"),
            have_x_project_tests,
        );
        registry.register_check(
            DetectorReference::builtin("have_class_with_x_coverage"),
            have_class_with_x_coverage,
        );
        registry.register_check(
            DetectorReference::builtin("have_x_classes_with_y_coverage"),
            have_x_classes_with_y_coverage,
        );
        registry.register_check(
            DetectorReference::builtin("have_build_with_x_seconds"),
            have_build_with_x_seconds,
        );
        registry.register_check(
            DetectorReference::builtin("have_x_failed_tests"),
            have_x_failed_tests,
        );
        registry.register_check(
            DetectorReference::builtin("solve_challenge_in_x_seconds"),
            solve_challenge_in_x_seconds,
        );
        registry.register_check(
            DetectorReference::builtin("solve_first_build_fail"),
            solve_first_build_fail,
        );
        registry.register_measure(
            DetectorReference::builtin("solved_challenges_simultaneously"),
            solved_challenges_simultaneously,
        );
        registry.register_measure(
            DetectorReference::builtin("project_coverage_percent"),
            project_coverage_percent,
        );
        registry.register_count(DetectorReference::builtin("project_tests"), project_tests);
        registry.register_count(
            DetectorReference::builtin("max_class_coverage"),
            max_class_coverage,
        );
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(value: usize) -> f64 {
        value as f64
    }

    fn solve_x_challenges(args: &DetectorArgs<'_, '_>) -> Result<bool, DetectorError> {
        Ok(as_f64(args.completed_challenges.len()) >= args.threshold("solveNumber"))
    }

    fn solve_x_at_once(args: &DetectorArgs<'_, '_>) -> Result<bool, DetectorError> {
        Ok(as_f64(args.solved_this_build) >= args.threshold("solveNumber"))
    }

    fn have_x_project_coverage(args: &DetectorArgs<'_, '_>) -> Result<bool, DetectorError> {
        Ok(args.ctx.build.project_coverage >= args.threshold("haveCoverage"))
    }

    fn have_x_project_tests(args: &DetectorArgs<'_, '_>) -> Result<bool, DetectorError> {
        let tests = args.ctx.test_count()?;
        Ok(f64::from(tests) >= args.threshold("haveTests"))
    }

    fn have_class_with_x_coverage(args: &DetectorArgs<'_, '_>) -> Result<bool, DetectorError> {
        let wanted = args.threshold("haveCoverage");
        Ok(args.ctx.user_files().any(|file| file.coverage >= wanted))
    }

    fn have_x_classes_with_y_coverage(args: &DetectorArgs<'_, '_>) -> Result<bool, DetectorError> {
        let wanted = args.threshold("haveCoverage");
        let classes = args
            .ctx
            .user_files()
            .filter(|file| !file.is_test && file.coverage >= wanted)
            .count();
        Ok(as_f64(classes) >= args.threshold("classesCount"))
    }

    fn have_build_with_x_seconds(args: &DetectorArgs<'_, '_>) -> Result<bool, DetectorError> {
        let Some(more) = args.flag("more") else {
            return Ok(false);
        };
        #[allow(clippy::cast_precision_loss)]
        let duration = args.ctx.build.duration_secs as f64;
        Ok(if more {
            duration > args.threshold("duration")
        } else {
            duration < args.number("duration").unwrap_or(0.0)
        })
    }

    fn have_x_failed_tests(args: &DetectorArgs<'_, '_>) -> Result<bool, DetectorError> {
        let build = args.ctx.build;
        Ok(match args.count("failedTests") {
            Some(0) => build.total_tests > 0 && build.failed_tests == build.total_tests,
            Some(wanted) => build.failed_tests == wanted,
            None => false,
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn solve_challenge_in_x_seconds(args: &DetectorArgs<'_, '_>) -> Result<bool, DetectorError> {
        let limit = args.number("timeDifference").unwrap_or(0.0);
        Ok(args
            .completed_challenges
            .iter()
            .any(|record| ((record.solved - record.created) / 1_000) as f64 <= limit))
    }

    fn solve_first_build_fail(args: &DetectorArgs<'_, '_>) -> Result<bool, DetectorError> {
        Ok(args.ctx.build.result == BuildResult::Success
            && args
                .completed_challenges
                .iter()
                .any(|record| record.kind == ChallengeKind::Build))
    }

    fn solved_challenges_simultaneously(args: &DetectorArgs<'_, '_>) -> Result<f64, DetectorError> {
        Ok(as_f64(args.solved_this_build))
    }

    fn project_coverage_percent(args: &DetectorArgs<'_, '_>) -> Result<f64, DetectorError> {
        Ok(args.ctx.build.project_coverage * 100.0)
    }

    fn project_tests(args: &DetectorArgs<'_, '_>) -> Result<i64, DetectorError> {
        Ok(i64::from(args.ctx.test_count()?))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn max_class_coverage(args: &DetectorArgs<'_, '_>) -> Result<i64, DetectorError> {
        let best = args
            .ctx
            .user_files()
            .map(|file| file.coverage)
            .fold(0.0_f64, f64::max);
        Ok((best * 100.0).round() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::fixtures::{Harness, source_file};

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    fn record(kind: ChallengeKind, created: i64, solved: i64) -> ChallengeRecord {
        ChallengeRecord {
            kind,
            key: crate::challenge::ChallengeKey::new(format!("{kind:?}-{created}")),
            description: String::new(),
            created,
            solved,
            score: 1,
        }
    }

    fn args<'a, 'c>(
        ctx: &'a EvaluationContext<'c>,
        history: &'a [ChallengeRecord],
        parameters: &'a BTreeMap<String, String>,
    ) -> DetectorArgs<'a, 'c> {
        DetectorArgs {
            ctx,
            completed_challenges: history,
            solved_this_build: 0,
            parameters,
        }
    }

    #[test]
    fn reference_parses_namespace_and_name() {
        let reference: DetectorReference = "org.gamekins::solveXChallenges".parse().unwrap();
        assert_eq!(reference.namespace(), "org.gamekins");
        assert_eq!(reference.name(), "solveXChallenges");
        assert_eq!(reference.to_string(), "org.gamekins::solveXChallenges");
        assert!("no-separator".parse::<DetectorReference>().is_err());
        assert!("::missing".parse::<DetectorReference>().is_err());
    }

    #[test]
    fn unknown_names_fail_resolution() {
        let registry = DetectorRegistry::with_builtin();
        let err = registry
            .resolve_check(&DetectorReference::builtin("does_not_exist"))
            .err()
            .expect("unknown detector");
        assert!(matches!(err, AchievementError::UnknownDetector { .. }));
    }

    #[test]
    fn result_kind_must_match() {
        let registry = DetectorRegistry::with_builtin();
        let err = registry
            .resolve_measure(&DetectorReference::builtin("solve_x_challenges"))
            .err()
            .expect("kind mismatch");
        assert!(matches!(
            err,
            AchievementError::DetectorKindMismatch {
                expected: DetectorKind::Measure,
                found: DetectorKind::Check,
                ..
            }
        ));
    }

    #[test]
    fn solve_x_challenges_counts_history() {
        let registry = DetectorRegistry::with_builtin();
        let check = registry
            .resolve_check(&DetectorReference::builtin("solve_x_challenges"))
            .unwrap();
        let harness = Harness::new(Vec::new());
        let ctx = harness.ctx();
        let history = vec![
            record(ChallengeKind::LineCoverage, 0, 5_000),
            record(ChallengeKind::Smell, 0, 9_000),
        ];
        let parameters = params(&[("solveNumber", "2")]);
        assert!(check(&args(&ctx, &history, &parameters)).unwrap());
        assert!(!check(&args(&ctx, &history[..1], &parameters)).unwrap());
    }

    #[test]
    fn missing_thresholds_are_never_reached() {
        let registry = DetectorRegistry::with_builtin();
        let check = registry
            .resolve_check(&DetectorReference::builtin("solve_x_at_once"))
            .unwrap();
        let harness = Harness::new(Vec::new());
        let ctx = harness.ctx();
        let parameters = BTreeMap::new();
        let busy = DetectorArgs {
            solved_this_build: 50,
            ..args(&ctx, &[], &parameters)
        };
        assert!(!check(&busy).unwrap());
    }

    #[test]
    fn class_coverage_uses_changed_files() {
        let registry = DetectorRegistry::with_builtin();
        let check = registry
            .resolve_check(&DetectorReference::builtin("have_class_with_x_coverage"))
            .unwrap();
        let count = registry
            .resolve_count(&DetectorReference::builtin("max_class_coverage"))
            .unwrap();
        let harness = Harness::new(vec![
            source_file("src/A.java", 0.95, "alice", 1),
            source_file("src/B.java", 0.99, "bob", 1),
        ]);
        let ctx = harness.ctx();
        let parameters = params(&[("haveCoverage", "0.9")]);
        let args = args(&ctx, &[], &parameters);
        assert!(check(&args).unwrap());
        assert_eq!(count(&args).unwrap(), 95);
    }

    #[test]
    fn failing_metrics_propagate() {
        let registry = DetectorRegistry::with_builtin();
        let check = registry
            .resolve_check(&DetectorReference::builtin("have_x_project_tests"))
            .unwrap();
        let harness = Harness::new(Vec::new());
        let missing = crate::metrics::MissingReports;
        let ctx = EvaluationContext {
            metrics: &missing,
            ..harness.ctx()
        };
        let parameters = params(&[("haveTests", "10")]);
        assert!(matches!(
            check(&args(&ctx, &[], &parameters)),
            Err(DetectorError::Metrics(_))
        ));
    }

    #[test]
    fn build_duration_compares_in_both_directions() {
        let registry = DetectorRegistry::with_builtin();
        let check = registry
            .resolve_check(&DetectorReference::builtin("have_build_with_x_seconds"))
            .unwrap();
        let mut harness = Harness::new(Vec::new());
        harness.build.duration_secs = 30;
        let ctx = harness.ctx();
        let slow = params(&[("more", "true"), ("duration", "20")]);
        let fast = params(&[("more", "false"), ("duration", "20")]);
        let unset = params(&[("duration", "20")]);
        assert!(check(&args(&ctx, &[], &slow)).unwrap());
        assert!(!check(&args(&ctx, &[], &fast)).unwrap());
        assert!(!check(&args(&ctx, &[], &unset)).unwrap());
    }

    #[test]
    fn failed_tests_match_exact_counts() {
        let registry = DetectorRegistry::with_builtin();
        let check = registry
            .resolve_check(&DetectorReference::builtin("have_x_failed_tests"))
            .unwrap();
        let mut harness = Harness::new(Vec::new());
        harness.build.total_tests = 4;
        harness.build.failed_tests = 3;
        let ctx = harness.ctx();
        assert!(check(&args(&ctx, &[], &params(&[("failedTests", "3")]))).unwrap());
        assert!(!check(&args(&ctx, &[], &params(&[("failedTests", "2")]))).unwrap());
        assert!(!check(&args(&ctx, &[], &params(&[("failedTests", "0")]))).unwrap());
        assert!(!check(&args(&ctx, &[], &params(&[("failedTests", "3.5")]))).unwrap());

        harness.build.failed_tests = 4;
        let ctx = harness.ctx();
        assert!(check(&args(&ctx, &[], &params(&[("failedTests", "0")]))).unwrap());
    }
}
