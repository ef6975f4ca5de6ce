use anyhow::{Context, Result};
use buildquest_game::{
    BuildOutcome, DetectorRegistry, EvaluationContext, Event, EventLog, ProgressStore,
    ProgressionConfig, ProgressionEngine, Quest, QuestTask, ReportPaths, UserProgress,
};
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::common::util::format_millis;
use crate::common::{Expectation, Scenario, UserActivity};

/// What one user did in one build, as seen by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub build: u32,
    pub time: i64,
    pub user: String,
    pub outcome: BuildOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub title: String,
    pub percentage: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementSummary {
    pub title: String,
    pub solved: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeSummary {
    pub title: String,
    pub earned: u32,
    pub per_tier: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub title: String,
    pub current: i64,
    pub milestone: usize,
    pub milestones: usize,
}

/// Final state of one participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserReport {
    pub user: String,
    pub score: u64,
    pub totals: BuildOutcome,
    pub current_quests: Vec<String>,
    pub completed_quests: Vec<String>,
    pub rejected_quests: Vec<String>,
    pub current_quest_tasks: Vec<TaskSummary>,
    pub completed_quest_tasks: Vec<String>,
    pub achievements: Vec<AchievementSummary>,
    pub badges: Vec<BadgeSummary>,
    pub progress: Vec<ProgressSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub scenario: String,
    pub project: String,
    pub seed: u64,
    pub builds: usize,
    pub passed: bool,
    pub failures: Vec<String>,
    pub total_events: usize,
    pub elapsed_ms: u64,
    pub users: Vec<UserReport>,
    pub timeline: Vec<TimelineEntry>,
    /// Events still held by the sink after the last build.
    pub last_build_events: Vec<Event>,
}

impl UserReport {
    fn collect(store: &UserProgress, project: &str, totals: BuildOutcome) -> Self {
        let names = |quests: &[Quest]| {
            quests
                .iter()
                .map(|quest| quest.name().to_string())
                .collect::<Vec<_>>()
        };
        let (badges, progress) = store.project(project).map_or_else(
            || (Vec::new(), Vec::new()),
            |state| {
                let badges: Vec<BadgeSummary> = state
                    .badge_achievements
                    .iter()
                    .map(|badge| BadgeSummary {
                        title: badge.title().to_string(),
                        earned: badge.total_badges(),
                        per_tier: badge.badge_counts().to_vec(),
                    })
                    .collect();
                let progress: Vec<ProgressSummary> = state
                    .progress_achievements
                    .iter()
                    .map(|achievement| ProgressSummary {
                        title: achievement.title().to_string(),
                        current: achievement.current_progress(),
                        milestone: achievement.active_milestone(),
                        milestones: achievement.milestones().len(),
                    })
                    .collect();
                (badges, progress)
            },
        );

        Self {
            user: store.user().to_string(),
            score: store.score(project),
            totals,
            current_quests: names(store.current_quests(project)),
            completed_quests: names(store.completed_quests(project)),
            rejected_quests: store
                .rejected_quests(project)
                .iter()
                .map(|rejected| format!("{} ({})", rejected.quest.name(), rejected.reason))
                .collect(),
            current_quest_tasks: store
                .current_quest_tasks(project)
                .iter()
                .map(|task| TaskSummary {
                    title: task.title(),
                    percentage: task.completed_percentage(),
                })
                .collect(),
            completed_quest_tasks: store
                .completed_quest_tasks(project)
                .iter()
                .map(QuestTask::title)
                .collect(),
            achievements: store
                .completed_achievements(project)
                .iter()
                .map(|achievement| AchievementSummary {
                    title: achievement.title().to_string(),
                    solved: achievement.solved_time_label(),
                })
                .collect(),
            badges,
            progress,
        }
    }

    fn unmet(&self, expectation: &Expectation) -> Vec<String> {
        let mut failures = Vec::new();
        if self.score < expectation.min_score {
            failures.push(format!(
                "{}: score {} below {}",
                self.user, self.score, expectation.min_score
            ));
        }
        if self.totals.quests_solved < expectation.min_quests_solved {
            failures.push(format!(
                "{}: solved {} quests, expected at least {}",
                self.user, self.totals.quests_solved, expectation.min_quests_solved
            ));
        }
        if self.totals.quest_tasks_solved < expectation.min_quest_tasks_solved {
            failures.push(format!(
                "{}: solved {} quest tasks, expected at least {}",
                self.user, self.totals.quest_tasks_solved, expectation.min_quest_tasks_solved
            ));
        }
        for wanted in &expectation.achievements {
            if !self.achievements.iter().any(|a| &a.title == wanted) {
                failures.push(format!("{}: missing achievement '{wanted}'", self.user));
            }
        }
        failures
    }
}

/// Record scripted challenge traffic; returns how many challenges were solved.
fn apply_activity(
    store: &mut UserProgress,
    project: &str,
    activity: &UserActivity,
    now: i64,
) -> usize {
    for challenge in &activity.solved {
        store.complete_challenge(project, challenge.record(now, true));
    }
    for challenge in &activity.rejected {
        store.reject_challenge(project, challenge.rejection(now));
    }
    for challenge in &activity.sent {
        if !store.challenge_sent(project, challenge.record(now, false)) {
            log::debug!("no send task took '{}'", challenge.key);
        }
    }
    for challenge in &activity.received {
        if !store.challenge_received(project, challenge.record(now, false)) {
            log::debug!("no receive task took '{}'", challenge.key);
        }
    }
    activity.solved.len()
}

/// Replays scenarios against a [`ProgressionEngine`].
pub struct Simulator {
    engine: ProgressionEngine,
    verbose: bool,
}

impl Simulator {
    #[must_use]
    pub fn new(config: ProgressionConfig, verbose: bool) -> Self {
        Self {
            engine: ProgressionEngine::new(DetectorRegistry::with_builtin(), config),
            verbose,
        }
    }

    /// Run every build of `scenario` for every participant.
    ///
    /// # Errors
    ///
    /// Fails when the catalog cannot be resolved or the engine reports a
    /// detector or metric failure.
    pub fn run(&self, scenario: &Scenario, seed: u64) -> Result<SimulationReport> {
        let started = Instant::now();
        let catalog = self
            .engine
            .load_catalog()
            .context("failed to resolve the achievement catalog")?;
        let project = scenario.project.as_str();
        let branch = scenario.branch.as_str();

        let mut users: Vec<UserProgress> = scenario
            .participants
            .iter()
            .map(|name| {
                let mut store = UserProgress::new(name.clone());
                store.participate(project, &catalog);
                store
            })
            .collect();
        let participants = users.len();
        let mut totals = vec![BuildOutcome::default(); participants];
        let mut timeline = Vec::new();
        let mut total_events = 0;
        let mut last_build_events = Vec::new();

        let events = EventLog::new();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let reports = ReportPaths::default();

        for (index, build) in scenario.builds.iter().enumerate() {
            let number = u32::try_from(index + 1).unwrap_or(u32::MAX);
            let now = scenario.build_time(index)?;
            let info = build.info(number);
            let metrics = build.metrics();
            log::info!("build #{number} of {project}/{branch} at {}", format_millis(now));
            ProgressionEngine::start_build(&events, project, branch, number, now);

            for (store, total) in users.iter_mut().zip(totals.iter_mut()) {
                let user = store.user().to_string();
                let solved = build
                    .activity
                    .get(&user)
                    .map_or(0, |activity| apply_activity(store, project, activity, now));
                let ctx = EvaluationContext {
                    project,
                    branch,
                    user: &user,
                    files: &build.files,
                    parameters: &build.parameters,
                    build: &info,
                    reports: &reports,
                    metrics: &metrics,
                    now,
                };
                let outcome = self
                    .engine
                    .check_user(store, &ctx, &events, participants, solved, &mut rng)
                    .with_context(|| format!("build #{number} failed for {user}"))?;

                if self.verbose && !outcome.is_quiet() {
                    println!(
                        "   #{number} {}: +{} points, {} steps, {} quests, {} tasks, {} achievements",
                        user.bright_white(),
                        outcome.score_gained,
                        outcome.quest_steps_solved,
                        outcome.quests_solved,
                        outcome.quest_tasks_solved,
                        outcome.achievements_solved
                    );
                }
                total.absorb(&outcome);
                timeline.push(TimelineEntry {
                    build: number,
                    time: now,
                    user,
                    outcome,
                });
            }

            last_build_events = events.events();
            total_events += last_build_events.len();
        }

        let reports_out: Vec<UserReport> = users
            .iter()
            .zip(totals)
            .map(|(store, total)| UserReport::collect(store, project, total))
            .collect();
        let failures: Vec<String> = reports_out
            .iter()
            .filter_map(|report| {
                scenario
                    .expectations
                    .get(&report.user)
                    .map(|expectation| report.unmet(expectation))
            })
            .flatten()
            .collect();

        Ok(SimulationReport {
            scenario: scenario.name.clone(),
            project: scenario.project.clone(),
            seed,
            builds: scenario.builds.len(),
            passed: failures.is_empty(),
            failures,
            total_events,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            users: reports_out,
            timeline,
            last_build_events,
        })
    }

    /// Run `scenario` once per seed.
    ///
    /// # Errors
    ///
    /// Stops at the first failing run.
    pub fn run_all(&self, scenario: &Scenario, seeds: &[u64]) -> Result<Vec<SimulationReport>> {
        seeds
            .iter()
            .map(|&seed| {
                if self.verbose {
                    println!(
                        "🧪 Simulating {} (seed {seed})",
                        scenario.name.bright_white()
                    );
                }
                self.run(scenario, seed)
            })
            .collect()
    }
}
