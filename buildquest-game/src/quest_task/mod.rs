//! Single-metric goals measured against a baseline taken at creation.

pub mod factory;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::achievement::Achievement;
use crate::challenge::{ChallengeFilter, ChallengeRecord, RejectedChallenge};
use crate::constants::{
    COVERAGE_TASK_SCORE_DIVISOR, FIXED_TASK_SCORE, PERCENT_CAP, WEIGHT_ADD_MORE_TESTS,
    WEIGHT_COVER_MORE_BRANCHES, WEIGHT_COVER_MORE_LINES, WEIGHT_RECEIVE_CHALLENGE,
    WEIGHT_SEND_CHALLENGE, WEIGHT_SOLVE_ACHIEVEMENT, WEIGHT_SOLVE_CHALLENGES,
    WEIGHT_SOLVE_WITHOUT_REJECTION,
};
use crate::context::EvaluationContext;
use crate::metrics::MetricsError;
use crate::xml;

pub use factory::{
    choose_challenge_filter, choose_quest_task_type, generate_new_quest_tasks,
    generate_quest_task,
};

/// The eight quest task variants as plain tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestTaskType {
    AddMoreTests,
    CoverMoreBranches,
    CoverMoreLines,
    ReceiveChallenge,
    SendChallenge,
    SolveAchievement,
    SolveChallenges,
    SolveChallengesWithoutRejection,
}

impl QuestTaskType {
    pub const ALL: [Self; 8] = [
        Self::AddMoreTests,
        Self::CoverMoreBranches,
        Self::CoverMoreLines,
        Self::ReceiveChallenge,
        Self::SendChallenge,
        Self::SolveAchievement,
        Self::SolveChallenges,
        Self::SolveChallengesWithoutRejection,
    ];

    #[must_use]
    pub const fn weight(self) -> u32 {
        match self {
            Self::AddMoreTests => WEIGHT_ADD_MORE_TESTS,
            Self::CoverMoreBranches => WEIGHT_COVER_MORE_BRANCHES,
            Self::CoverMoreLines => WEIGHT_COVER_MORE_LINES,
            Self::ReceiveChallenge => WEIGHT_RECEIVE_CHALLENGE,
            Self::SendChallenge => WEIGHT_SEND_CHALLENGE,
            Self::SolveAchievement => WEIGHT_SOLVE_ACHIEVEMENT,
            Self::SolveChallenges => WEIGHT_SOLVE_CHALLENGES,
            Self::SolveChallengesWithoutRejection => WEIGHT_SOLVE_WITHOUT_REJECTION,
        }
    }

    /// Variants that only make sense with another participant to interact with.
    #[must_use]
    pub const fn needs_counterpart(self) -> bool {
        matches!(self, Self::ReceiveChallenge | Self::SendChallenge)
    }

    /// Goal magnitudes of these variants are scaled up.
    #[must_use]
    pub const fn is_coverage(self) -> bool {
        matches!(self, Self::CoverMoreBranches | Self::CoverMoreLines)
    }

    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::AddMoreTests => "AddMoreTestsQuestTask",
            Self::CoverMoreBranches => "CoverMoreBranchesQuestTask",
            Self::CoverMoreLines => "CoverMoreLinesQuestTask",
            Self::ReceiveChallenge => "ReceiveChallengeQuestTask",
            Self::SendChallenge => "SendChallengeQuestTask",
            Self::SolveAchievement => "SolveAchievementQuestTask",
            Self::SolveChallenges => "SolveChallengesQuestTask",
            Self::SolveChallengesWithoutRejection => "SolveChallengesWithoutRejectionQuestTask",
        }
    }
}

/// Variant payload: the immutable baseline plus any back-references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestTaskKind {
    AddMoreTests {
        start_number_of_tests: u32,
    },
    CoverMoreBranches {
        start_number_of_branches: u32,
    },
    CoverMoreLines {
        start_number_of_lines: u32,
    },
    ReceiveChallenge {
        #[serde(default)]
        challenges: Vec<ChallengeRecord>,
    },
    SendChallenge {
        #[serde(default)]
        challenges: Vec<ChallengeRecord>,
    },
    SolveAchievement {
        start_number_of_achievements: usize,
        /// Titles of the achievements that solved the task.
        #[serde(default)]
        achievements: Vec<String>,
    },
    SolveChallenges {
        #[serde(default)]
        filter: ChallengeFilter,
        #[serde(default)]
        challenges: Vec<ChallengeRecord>,
    },
    SolveChallengesWithoutRejection {
        #[serde(default)]
        challenges: Vec<ChallengeRecord>,
    },
}

/// Per-user history a quest task counts against.
#[derive(Debug, Clone, Copy)]
pub struct QuestTaskInputs<'a> {
    pub completed_challenges: &'a [ChallengeRecord],
    pub rejected_challenges: &'a [RejectedChallenge],
    pub completed_achievements: &'a [Achievement],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestTask {
    number_goal: u32,
    #[serde(default)]
    current_number: i64,
    created: i64,
    #[serde(default)]
    solved: i64,
    #[serde(flatten)]
    kind: QuestTaskKind,
}

impl QuestTask {
    fn with_kind(number_goal: u32, created: i64, kind: QuestTaskKind) -> Self {
        Self {
            number_goal,
            current_number: 0,
            created,
            solved: 0,
            kind,
        }
    }

    #[must_use]
    pub fn add_more_tests(number_goal: u32, start_number_of_tests: u32, created: i64) -> Self {
        Self::with_kind(
            number_goal,
            created,
            QuestTaskKind::AddMoreTests {
                start_number_of_tests,
            },
        )
    }

    #[must_use]
    pub fn cover_more_branches(
        number_goal: u32,
        start_number_of_branches: u32,
        created: i64,
    ) -> Self {
        Self::with_kind(
            number_goal,
            created,
            QuestTaskKind::CoverMoreBranches {
                start_number_of_branches,
            },
        )
    }

    #[must_use]
    pub fn cover_more_lines(number_goal: u32, start_number_of_lines: u32, created: i64) -> Self {
        Self::with_kind(
            number_goal,
            created,
            QuestTaskKind::CoverMoreLines {
                start_number_of_lines,
            },
        )
    }

    #[must_use]
    pub fn receive_challenge(created: i64) -> Self {
        Self::with_kind(
            1,
            created,
            QuestTaskKind::ReceiveChallenge {
                challenges: Vec::new(),
            },
        )
    }

    #[must_use]
    pub fn send_challenge(created: i64) -> Self {
        Self::with_kind(
            1,
            created,
            QuestTaskKind::SendChallenge {
                challenges: Vec::new(),
            },
        )
    }

    #[must_use]
    pub fn solve_achievement(start_number_of_achievements: usize, created: i64) -> Self {
        Self::with_kind(
            1,
            created,
            QuestTaskKind::SolveAchievement {
                start_number_of_achievements,
                achievements: Vec::new(),
            },
        )
    }

    #[must_use]
    pub fn solve_challenges(number_goal: u32, filter: ChallengeFilter, created: i64) -> Self {
        Self::with_kind(
            number_goal,
            created,
            QuestTaskKind::SolveChallenges {
                filter,
                challenges: Vec::new(),
            },
        )
    }

    #[must_use]
    pub fn solve_challenges_without_rejection(number_goal: u32, created: i64) -> Self {
        Self::with_kind(
            number_goal,
            created,
            QuestTaskKind::SolveChallengesWithoutRejection {
                challenges: Vec::new(),
            },
        )
    }

    #[must_use]
    pub const fn task_type(&self) -> QuestTaskType {
        match self.kind {
            QuestTaskKind::AddMoreTests { .. } => QuestTaskType::AddMoreTests,
            QuestTaskKind::CoverMoreBranches { .. } => QuestTaskType::CoverMoreBranches,
            QuestTaskKind::CoverMoreLines { .. } => QuestTaskType::CoverMoreLines,
            QuestTaskKind::ReceiveChallenge { .. } => QuestTaskType::ReceiveChallenge,
            QuestTaskKind::SendChallenge { .. } => QuestTaskType::SendChallenge,
            QuestTaskKind::SolveAchievement { .. } => QuestTaskType::SolveAchievement,
            QuestTaskKind::SolveChallenges { .. } => QuestTaskType::SolveChallenges,
            QuestTaskKind::SolveChallengesWithoutRejection { .. } => {
                QuestTaskType::SolveChallengesWithoutRejection
            }
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &QuestTaskKind {
        &self.kind
    }

    #[must_use]
    pub const fn number_goal(&self) -> u32 {
        self.number_goal
    }

    #[must_use]
    pub const fn current_number(&self) -> i64 {
        self.current_number
    }

    #[must_use]
    pub const fn created(&self) -> i64 {
        self.created
    }

    #[must_use]
    pub const fn solved(&self) -> i64 {
        self.solved
    }

    #[must_use]
    pub fn title(&self) -> String {
        self.to_string()
    }

    /// Recompute `current_number` and stamp `solved` once the goal is reached.
    ///
    /// # Errors
    ///
    /// Propagates metric provider failures for the delta-based variants.
    pub fn is_solved(
        &mut self,
        ctx: &EvaluationContext<'_>,
        inputs: &QuestTaskInputs<'_>,
    ) -> Result<bool, MetricsError> {
        if self.solved != 0 {
            return Ok(true);
        }
        let goal = i64::from(self.number_goal);
        let created = self.created;
        let current = match &mut self.kind {
            QuestTaskKind::AddMoreTests {
                start_number_of_tests,
            } => delta(ctx.test_count()?, *start_number_of_tests),
            QuestTaskKind::CoverMoreBranches {
                start_number_of_branches,
            } => delta(ctx.covered_branches()?, *start_number_of_branches),
            QuestTaskKind::CoverMoreLines {
                start_number_of_lines,
            } => delta(ctx.covered_lines()?, *start_number_of_lines),
            QuestTaskKind::ReceiveChallenge { .. } | QuestTaskKind::SendChallenge { .. } => {
                self.current_number
            }
            QuestTaskKind::SolveAchievement {
                start_number_of_achievements,
                achievements,
            } => {
                let completed = inputs.completed_achievements;
                let new = completed.get(*start_number_of_achievements..).unwrap_or_default();
                if i64::try_from(new.len()).unwrap_or(i64::MAX) >= goal {
                    achievements.extend(new.iter().map(|a| a.title().to_string()));
                }
                count(new.len())
            }
            QuestTaskKind::SolveChallenges { filter, challenges } => {
                let filter = *filter;
                let solved = solved_since(inputs.completed_challenges, created, |record| {
                    filter.matches(record.kind)
                });
                attach_if_reached(challenges, solved, goal)
            }
            QuestTaskKind::SolveChallengesWithoutRejection { challenges } => {
                let since = inputs
                    .rejected_challenges
                    .last()
                    .map_or(created, |last| last.rejected_at.max(created));
                let solved = solved_since(inputs.completed_challenges, since, |_| true);
                attach_if_reached(challenges, solved, goal)
            }
        };

        self.current_number = current;
        if current >= goal {
            self.solved = ctx.now;
            log::debug!("quest task '{self}' solved with {current}/{goal}");
            return Ok(true);
        }
        Ok(false)
    }

    /// Record a sent challenge. Only a send task counts it.
    pub fn challenge_sent(&mut self, record: ChallengeRecord) -> bool {
        let QuestTaskKind::SendChallenge { challenges } = &mut self.kind else {
            return false;
        };
        challenges.push(record);
        self.current_number += 1;
        true
    }

    /// Record a received challenge. Only a receive task counts it.
    pub fn challenge_received(&mut self, record: ChallengeRecord) -> bool {
        let QuestTaskKind::ReceiveChallenge { challenges } = &mut self.kind else {
            return false;
        };
        challenges.push(record);
        self.current_number += 1;
        true
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        match self.task_type() {
            QuestTaskType::CoverMoreBranches | QuestTaskType::CoverMoreLines => {
                self.number_goal / COVERAGE_TASK_SCORE_DIVISOR
            }
            QuestTaskType::ReceiveChallenge | QuestTaskType::SolveAchievement => FIXED_TASK_SCORE,
            QuestTaskType::AddMoreTests
            | QuestTaskType::SendChallenge
            | QuestTaskType::SolveChallenges
            | QuestTaskType::SolveChallengesWithoutRejection => self.number_goal,
        }
    }

    #[must_use]
    pub fn completed_percentage(&self) -> u32 {
        if self.number_goal == 0 {
            return PERCENT_CAP;
        }
        let percent = (self.current_number.max(0) * i64::from(PERCENT_CAP))
            / i64::from(self.number_goal);
        u32::try_from(percent.min(i64::from(PERCENT_CAP))).unwrap_or(PERCENT_CAP)
    }

    /// Same variant, goal and challenge filter; baselines and progress are ignored.
    #[must_use]
    pub fn same_goal(&self, other: &Self) -> bool {
        self.task_type() == other.task_type()
            && self.number_goal == other.number_goal
            && self.filter() == other.filter()
    }

    #[must_use]
    pub const fn filter(&self) -> Option<ChallengeFilter> {
        match &self.kind {
            QuestTaskKind::SolveChallenges { filter, .. } => Some(*filter),
            _ => None,
        }
    }

    /// Challenges this task counted, for reporting only.
    #[must_use]
    pub fn challenges(&self) -> &[ChallengeRecord] {
        match &self.kind {
            QuestTaskKind::ReceiveChallenge { challenges }
            | QuestTaskKind::SendChallenge { challenges }
            | QuestTaskKind::SolveChallenges { challenges, .. }
            | QuestTaskKind::SolveChallengesWithoutRejection { challenges } => challenges,
            _ => &[],
        }
    }

    #[must_use]
    pub fn to_xml(&self, indentation: usize) -> String {
        let mut pairs = vec![
            ("created", self.created.to_string()),
            ("solved", self.solved.to_string()),
        ];
        if let QuestTaskKind::SolveAchievement {
            start_number_of_achievements,
            ..
        } = &self.kind
        {
            pairs.push((
                "startNumberOfAchievements",
                start_number_of_achievements.to_string(),
            ));
        } else {
            pairs.push(("currentNumber", self.current_number.to_string()));
            pairs.push(("numberGoal", self.number_goal.to_string()));
        }
        match &self.kind {
            QuestTaskKind::AddMoreTests {
                start_number_of_tests,
            } => pairs.push(("startNumberOfTests", start_number_of_tests.to_string())),
            QuestTaskKind::CoverMoreBranches {
                start_number_of_branches,
            } => pairs.push(("startNumberOfBranches", start_number_of_branches.to_string())),
            QuestTaskKind::CoverMoreLines {
                start_number_of_lines,
            } => pairs.push(("startNumberOfLines", start_number_of_lines.to_string())),
            _ => {}
        }
        format!(
            "{}<{}{}/>",
            xml::pad(indentation),
            self.task_type().tag(),
            xml::attributes(&pairs)
        )
    }
}

impl fmt::Display for QuestTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let goal = self.number_goal;
        match &self.kind {
            QuestTaskKind::AddMoreTests { .. } if goal == 1 => {
                f.write_str("Add one test to your project")
            }
            QuestTaskKind::AddMoreTests { .. } => write!(f, "Add {goal} tests to your project"),
            QuestTaskKind::CoverMoreBranches { .. } => {
                write!(f, "Cover {goal} more branches in your project by tests")
            }
            QuestTaskKind::CoverMoreLines { .. } => {
                write!(f, "Cover {goal} more lines in your project by tests")
            }
            QuestTaskKind::ReceiveChallenge { .. } => {
                f.write_str("Receive one challenge from your colleagues")
            }
            QuestTaskKind::SendChallenge { .. } => {
                f.write_str("Send one challenge to your colleagues")
            }
            QuestTaskKind::SolveAchievement { .. } => f.write_str("Solve one additional achievement"),
            QuestTaskKind::SolveChallenges { filter, .. } => {
                let label = match filter.label() {
                    "" => String::new(),
                    label => format!("{label} "),
                };
                if goal == 1 {
                    write!(f, "Solve one {label}Challenge")
                } else {
                    write!(f, "Solve {goal} {label}Challenges")
                }
            }
            QuestTaskKind::SolveChallengesWithoutRejection { .. } => {
                write!(f, "Solve {goal} challenge(s) without rejecting one")
            }
        }
    }
}

fn delta(current: u32, baseline: u32) -> i64 {
    i64::from(current) - i64::from(baseline)
}

fn count(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

fn solved_since<F>(records: &[ChallengeRecord], since: i64, accept: F) -> Vec<&ChallengeRecord>
where
    F: Fn(&ChallengeRecord) -> bool,
{
    records
        .iter()
        .filter(|record| record.solved >= since && accept(record))
        .collect()
}

fn attach_if_reached(
    challenges: &mut Vec<ChallengeRecord>,
    solved: Vec<&ChallengeRecord>,
    goal: i64,
) -> i64 {
    let current = count(solved.len());
    if current >= goal {
        challenges.extend(solved.into_iter().cloned());
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::{ChallengeKey, ChallengeKind};
    use crate::context::fixtures::Harness;

    fn record(kind: ChallengeKind, id: &str, solved: i64) -> ChallengeRecord {
        ChallengeRecord {
            kind,
            key: ChallengeKey::new(id),
            description: String::new(),
            created: 0,
            solved,
            score: 1,
        }
    }

    fn no_history() -> QuestTaskInputs<'static> {
        QuestTaskInputs {
            completed_challenges: &[],
            rejected_challenges: &[],
            completed_achievements: &[],
        }
    }

    #[test]
    fn add_more_tests_counts_from_the_baseline() {
        let mut harness = Harness::new(Vec::new());
        let mut task = QuestTask::add_more_tests(3, 10, 0);

        harness.metrics.tests = 12;
        assert!(!task.is_solved(&harness.ctx(), &no_history()).unwrap());
        assert_eq!(task.current_number(), 2);
        assert_eq!(task.solved(), 0);

        harness.metrics.tests = 13;
        assert!(task.is_solved(&harness.ctx(), &no_history()).unwrap());
        assert_ne!(task.solved(), 0);
        assert_eq!(task.completed_percentage(), 100);
    }

    #[test]
    fn coverage_deltas_may_go_negative() {
        let mut harness = Harness::new(Vec::new());
        harness.metrics.covered_lines = 40;
        let mut task = QuestTask::cover_more_lines(10, 50, 0);
        assert!(!task.is_solved(&harness.ctx(), &no_history()).unwrap());
        assert_eq!(task.current_number(), -10);
        assert_eq!(task.completed_percentage(), 0);
        assert_eq!(task.score(), 2);
    }

    #[test]
    fn missing_reports_propagate() {
        let harness = Harness::new(Vec::new());
        let missing = crate::metrics::MissingReports;
        let ctx = EvaluationContext {
            metrics: &missing,
            ..harness.ctx()
        };
        let mut task = QuestTask::cover_more_branches(5, 0, 0);
        assert!(task.is_solved(&ctx, &no_history()).is_err());
        assert_eq!(task.solved(), 0);
    }

    #[test]
    fn solve_challenges_respects_filter_and_creation_time() {
        let harness = Harness::new(Vec::new());
        let history = vec![
            record(ChallengeKind::LineCoverage, "old", 5),
            record(ChallengeKind::LineCoverage, "a", 20),
            record(ChallengeKind::Mutation, "b", 21),
            record(ChallengeKind::BranchCoverage, "c", 22),
        ];
        let inputs = QuestTaskInputs {
            completed_challenges: &history,
            ..no_history()
        };
        let mut task = QuestTask::solve_challenges(2, ChallengeFilter::Coverage, 10);
        assert!(task.is_solved(&harness.ctx(), &inputs).unwrap());
        let keys: Vec<&str> = task.challenges().iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert_eq!(task.score(), 2);
    }

    #[test]
    fn rejection_resets_the_window() {
        let harness = Harness::new(Vec::new());
        let history = vec![
            record(ChallengeKind::Smell, "a", 20),
            record(ChallengeKind::Smell, "b", 30),
            record(ChallengeKind::Smell, "c", 40),
        ];
        let rejected = vec![RejectedChallenge {
            record: record(ChallengeKind::Smell, "r", 0),
            reason: "no".to_string(),
            rejected_at: 25,
        }];
        let inputs = QuestTaskInputs {
            completed_challenges: &history,
            rejected_challenges: &rejected,
            completed_achievements: &[],
        };
        let mut task = QuestTask::solve_challenges_without_rejection(3, 10);
        assert!(!task.is_solved(&harness.ctx(), &inputs).unwrap());
        assert_eq!(task.current_number(), 2);
        assert!(task.challenges().is_empty());
    }

    #[test]
    fn send_and_receive_are_fed_externally() {
        let harness = Harness::new(Vec::new());
        let mut send = QuestTask::send_challenge(0);
        let mut receive = QuestTask::receive_challenge(0);
        assert!(!send.is_solved(&harness.ctx(), &no_history()).unwrap());

        let sent = record(ChallengeKind::Dummy, "x", 0);
        assert!(!receive.challenge_sent(sent.clone()));
        assert!(send.challenge_sent(sent));
        assert!(send.is_solved(&harness.ctx(), &no_history()).unwrap());
        assert_eq!(send.score(), 1);
        assert_eq!(receive.score(), 1);
        assert_eq!(send.to_string(), "Send one challenge to your colleagues");
    }

    #[test]
    fn solved_is_stamped_once() {
        let mut harness = Harness::new(Vec::new());
        harness.metrics.tests = 5;
        let mut task = QuestTask::add_more_tests(1, 0, 0);
        assert!(task.is_solved(&harness.ctx(), &no_history()).unwrap());
        let first = task.solved();
        harness.now += 500;
        harness.metrics.tests = 0;
        assert!(task.is_solved(&harness.ctx(), &no_history()).unwrap());
        assert_eq!(task.solved(), first);
    }

    #[test]
    fn descriptions_follow_the_goal() {
        assert_eq!(
            QuestTask::add_more_tests(3, 0, 0).to_string(),
            "Add 3 tests to your project"
        );
        assert_eq!(
            QuestTask::add_more_tests(1, 0, 0).to_string(),
            "Add one test to your project"
        );
        assert_eq!(
            QuestTask::solve_challenges(1, ChallengeFilter::Kind(ChallengeKind::LineCoverage), 0)
                .to_string(),
            "Solve one Line Coverage Challenge"
        );
        assert_eq!(
            QuestTask::solve_challenges(4, ChallengeFilter::Any, 0).to_string(),
            "Solve 4 Challenges"
        );
    }

    #[test]
    fn same_goal_ignores_baselines() {
        let a = QuestTask::add_more_tests(3, 10, 0);
        let b = QuestTask::add_more_tests(3, 99, 50);
        let c = QuestTask::add_more_tests(4, 10, 0);
        assert!(a.same_goal(&b));
        assert!(!a.same_goal(&c));
        let any = QuestTask::solve_challenges(2, ChallengeFilter::Any, 0);
        let coverage = QuestTask::solve_challenges(2, ChallengeFilter::Coverage, 0);
        assert!(!any.same_goal(&coverage));
    }

    #[test]
    fn xml_includes_the_baseline() {
        let task = QuestTask::add_more_tests(3, 10, 7);
        assert_eq!(
            task.to_xml(2),
            "  <AddMoreTestsQuestTask created=\"7\" solved=\"0\" currentNumber=\"0\" numberGoal=\"3\" startNumberOfTests=\"10\"/>"
        );
        assert_eq!(
            QuestTask::solve_achievement(4, 1).to_xml(0),
            "<SolveAchievementQuestTask created=\"1\" solved=\"0\" startNumberOfAchievements=\"4\"/>"
        );
    }

    #[test]
    fn tasks_round_trip_through_json() {
        let task = QuestTask::solve_challenges(2, ChallengeFilter::Coverage, 3);
        let json = serde_json::to_value(&task).expect("serialize task");
        assert_eq!(json["type"], "solve_challenges");
        let back: QuestTask = serde_json::from_value(json).expect("parse task");
        assert_eq!(back, task);
    }
}
