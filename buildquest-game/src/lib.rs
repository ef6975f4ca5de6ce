//! BuildQuest Progression Engine
//!
//! Platform-agnostic goal logic for build-server gamification: multi-step
//! quests, single-metric quest tasks and achievements, evaluated once per
//! build for every participating user. No I/O happens here; report metrics,
//! persistence and notification delivery are collaborators.

pub mod achievement;
pub mod challenge;
pub mod config;
pub mod constants;
pub mod context;
pub mod event;
pub mod metrics;
pub mod progress;
pub mod quest;
pub mod quest_task;

mod weights;
mod xml;

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::mem;
use thiserror::Error;

// Re-export commonly used types
pub use achievement::{
    Achievement, AchievementCatalog, AchievementError, BadgeAchievement, DetectorArgs,
    DetectorError, DetectorKind, DetectorReference, DetectorRegistry, ProgressAchievement,
    ProgressStep,
};
pub use challenge::{
    Challenge, ChallengeFilter, ChallengeKey, ChallengeKind, ChallengeRecord,
    LineCoverageChallenge, RejectedChallenge,
};
pub use config::{ProgressionConfig, SolvabilityScope};
pub use context::{
    BuildInfo, BuildResult, CoverageLine, EvaluationContext, LineStatus, ReportPaths, SourceFile,
};
pub use event::{Event, EventKind, EventLog, EventSink, NullSink};
pub use metrics::{MetricsError, MetricsProvider, MetricsSnapshot, MissingReports};
pub use progress::{ProgressStore, ProjectProgress, UserProgress};
pub use quest::{Quest, QuestStep, RejectedQuest, generate_new_quests, generate_quest};
pub use quest_task::{
    QuestTask, QuestTaskInputs, QuestTaskKind, QuestTaskType, generate_new_quest_tasks,
    generate_quest_task,
};

use crate::constants::REJECT_REASON_UNSOLVABLE;

/// Failure of one per-build evaluation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Achievement(#[from] AchievementError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// What one `check_user` call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub quest_steps_solved: usize,
    pub quests_solved: usize,
    pub quests_rejected: usize,
    pub achievements_solved: usize,
    pub badges_earned: usize,
    pub progress_made: usize,
    pub quest_tasks_solved: usize,
    pub quests_generated: usize,
    pub quest_tasks_generated: usize,
    pub score_gained: u64,
}

impl BuildOutcome {
    #[must_use]
    pub const fn is_quiet(&self) -> bool {
        self.quest_steps_solved == 0
            && self.quests_solved == 0
            && self.quests_rejected == 0
            && self.achievements_solved == 0
            && self.badges_earned == 0
            && self.progress_made == 0
            && self.quest_tasks_solved == 0
            && self.quests_generated == 0
            && self.quest_tasks_generated == 0
    }

    pub fn absorb(&mut self, other: &Self) {
        self.quest_steps_solved += other.quest_steps_solved;
        self.quests_solved += other.quests_solved;
        self.quests_rejected += other.quests_rejected;
        self.achievements_solved += other.achievements_solved;
        self.badges_earned += other.badges_earned;
        self.progress_made += other.progress_made;
        self.quest_tasks_solved += other.quest_tasks_solved;
        self.quests_generated += other.quests_generated;
        self.quest_tasks_generated += other.quest_tasks_generated;
        self.score_gained += other.score_gained;
    }
}

/// Evaluates and replenishes a user's goals after each build.
#[derive(Debug, Clone)]
pub struct ProgressionEngine {
    registry: DetectorRegistry,
    config: ProgressionConfig,
}

impl Default for ProgressionEngine {
    fn default() -> Self {
        Self::new(DetectorRegistry::with_builtin(), ProgressionConfig::default())
    }
}

impl ProgressionEngine {
    #[must_use]
    pub const fn new(registry: DetectorRegistry, config: ProgressionConfig) -> Self {
        Self { registry, config }
    }

    #[must_use]
    pub const fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn config(&self) -> &ProgressionConfig {
        &self.config
    }

    /// The bundled achievement catalog resolved against this engine's registry.
    ///
    /// # Errors
    ///
    /// Fails if a catalog entry names a detector the registry lacks.
    pub fn load_catalog(&self) -> Result<AchievementCatalog, AchievementError> {
        AchievementCatalog::load_default(&self.registry)
    }

    /// Announce a new build; sinks drop events of the previous one.
    pub fn start_build(
        events: &dyn EventSink,
        project: &str,
        branch: &str,
        build: u32,
        now: i64,
    ) {
        events.add_event(Event::new(
            project,
            branch,
            "",
            now,
            EventKind::BuildStarted { build },
        ));
    }

    /// Run one evaluation pass for the user of `ctx`.
    ///
    /// `participants` is the number of users taking part in the project and
    /// `solved_this_build` the number of challenges the user solved outside
    /// of quests in the triggering build.
    ///
    /// # Errors
    ///
    /// Detector and metric failures abort the pass. Goals already moved to
    /// their completed lists stay there.
    pub fn check_user<S, R>(
        &self,
        store: &mut S,
        ctx: &EvaluationContext<'_>,
        events: &dyn EventSink,
        participants: usize,
        solved_this_build: usize,
        rng: &mut R,
    ) -> Result<BuildOutcome, EngineError>
    where
        S: ProgressStore + ?Sized,
        R: Rng + ?Sized,
    {
        let mut outcome = BuildOutcome::default();
        if !store.is_participating(ctx.project) {
            log::debug!("{} does not participate in {}", ctx.user, ctx.project);
            return Ok(outcome);
        }

        self.check_quests(store, ctx, events, &mut outcome);
        self.check_achievements(
            store,
            ctx,
            events,
            solved_this_build + outcome.quest_steps_solved,
            &mut outcome,
        )?;
        Self::check_quest_tasks(store, ctx, events, &mut outcome)?;

        outcome.quests_generated = generate_new_quests(store, ctx, events, &self.config, rng);
        outcome.quest_tasks_generated =
            generate_new_quest_tasks(store, ctx, events, &self.config, participants, rng)?;

        log::info!(
            "{} in {}: {} quests solved, {} tasks solved, {} achievements, +{} points",
            ctx.user,
            ctx.project,
            outcome.quests_solved,
            outcome.quest_tasks_solved,
            outcome.achievements_solved,
            outcome.score_gained
        );
        Ok(outcome)
    }

    fn check_quests<S: ProgressStore + ?Sized>(
        &self,
        store: &mut S,
        ctx: &EvaluationContext<'_>,
        events: &dyn EventSink,
        outcome: &mut BuildOutcome,
    ) {
        let project = ctx.project;
        let mut quests = mem::take(store.current_quests_mut(project));
        quests.retain(|quest| !quest.is_unavailable());

        let mut active = Vec::with_capacity(quests.len());
        for mut quest in quests {
            while quest.is_current_step_solved(ctx) {
                outcome.quest_steps_solved += 1;
                if let Some(step) = quest.last_step() {
                    store.complete_challenge(project, step.challenge().record());
                    events.add_event(event(
                        ctx,
                        EventKind::QuestStepSolved {
                            quest: quest.name().to_string(),
                            step: step.to_string(),
                        },
                    ));
                }
            }

            if quest.is_solved(ctx.now) {
                let score = quest.score();
                log::info!("{} solved quest '{}' for {score}", ctx.user, quest.name());
                store.add_score(project, score);
                outcome.quests_solved += 1;
                outcome.score_gained += u64::from(score);
                events.add_event(event(
                    ctx,
                    EventKind::QuestSolved {
                        quest: quest.name().to_string(),
                        score,
                    },
                ));
                store.complete_quest(project, quest);
            } else if !quest.is_solvable(ctx, self.config.solvability) {
                log::info!("quest '{}' of {} is no longer solvable", quest.name(), ctx.user);
                outcome.quests_rejected += 1;
                events.add_event(event(
                    ctx,
                    EventKind::QuestUnsolvable {
                        quest: quest.name().to_string(),
                    },
                ));
                store.reject_quest(project, quest, REJECT_REASON_UNSOLVABLE);
            } else {
                active.push(quest);
            }
        }
        store.current_quests_mut(project).extend(active);
    }

    fn check_achievements<S: ProgressStore + ?Sized>(
        &self,
        store: &mut S,
        ctx: &EvaluationContext<'_>,
        events: &dyn EventSink,
        solved_this_build: usize,
        outcome: &mut BuildOutcome,
    ) -> Result<(), AchievementError> {
        let project = ctx.project;
        let history = store.completed_challenges(project).to_vec();
        let no_parameters = BTreeMap::new();
        let args = DetectorArgs {
            ctx,
            completed_challenges: &history,
            solved_this_build,
            parameters: &no_parameters,
        };

        // Evaluate on copies so a failing detector leaves the store untouched.
        let mut unsolved = store.unsolved_achievements_mut(project).clone();
        let mut badges = store.badge_achievements_mut(project).clone();
        let mut progress = store.progress_achievements_mut(project).clone();
        let solved = unsolved
            .iter_mut()
            .map(|achievement| achievement.is_solved(&args))
            .collect::<Result<Vec<bool>, _>>()?;
        let tiers = badges
            .iter_mut()
            .map(|badge| badge.update(&args))
            .collect::<Result<Vec<_>, _>>()?;
        let steps = progress
            .iter_mut()
            .map(|achievement| achievement.progress(&args))
            .collect::<Result<Vec<_>, _>>()?;

        let mut remaining = Vec::with_capacity(unsolved.len());
        for (achievement, solved) in unsolved.into_iter().zip(solved) {
            if !solved {
                remaining.push(achievement);
                continue;
            }
            log::info!("{} solved achievement '{}'", ctx.user, achievement.title());
            outcome.achievements_solved += 1;
            events.add_event(event(
                ctx,
                EventKind::AchievementSolved {
                    title: achievement.title().to_string(),
                },
            ));
            store.complete_achievement(project, achievement);
        }
        *store.unsolved_achievements_mut(project) = remaining;

        for (badge, tier) in badges.iter().zip(tiers) {
            if let Some(tier) = tier {
                log::info!("{} earned tier {tier} of '{}'", ctx.user, badge.title());
                outcome.badges_earned += 1;
                events.add_event(event(
                    ctx,
                    EventKind::BadgeEarned {
                        title: badge.title().to_string(),
                        tier,
                    },
                ));
            }
        }
        *store.badge_achievements_mut(project) = badges;

        for (achievement, step) in progress.iter().zip(steps) {
            if let Some(step) = step {
                outcome.progress_made += 1;
                events.add_event(event(
                    ctx,
                    EventKind::ProgressMade {
                        title: achievement.title().to_string(),
                        progress: step.progress,
                        milestone: step.milestone,
                    },
                ));
            }
        }
        *store.progress_achievements_mut(project) = progress;
        Ok(())
    }

    fn check_quest_tasks<S: ProgressStore + ?Sized>(
        store: &mut S,
        ctx: &EvaluationContext<'_>,
        events: &dyn EventSink,
        outcome: &mut BuildOutcome,
    ) -> Result<(), MetricsError> {
        let project = ctx.project;
        let mut tasks = mem::take(store.current_quest_tasks_mut(project));
        let results = {
            let inputs = store.task_inputs(project);
            tasks
                .iter_mut()
                .map(|task| {
                    let before = task.current_number();
                    let solved = task.is_solved(ctx, &inputs)?;
                    Ok((solved, task.current_number() != before))
                })
                .collect::<Result<Vec<_>, MetricsError>>()
        };
        let results = match results {
            Ok(results) => results,
            Err(err) => {
                *store.current_quest_tasks_mut(project) = tasks;
                return Err(err);
            }
        };

        let mut active = Vec::with_capacity(tasks.len());
        for (task, (solved, moved)) in tasks.into_iter().zip(results) {
            if moved {
                events.add_event(event(
                    ctx,
                    EventKind::QuestTaskProgress {
                        task: task.title(),
                        current: task.current_number(),
                        goal: task.number_goal(),
                    },
                ));
            }
            if !solved {
                active.push(task);
                continue;
            }
            let score = task.score();
            log::info!("{} solved quest task '{task}' for {score}", ctx.user);
            store.add_score(project, score);
            outcome.quest_tasks_solved += 1;
            outcome.score_gained += u64::from(score);
            events.add_event(event(
                ctx,
                EventKind::QuestTaskSolved {
                    task: task.title(),
                    score,
                },
            ));
            store.complete_quest_task(project, task);
        }
        store.current_quest_tasks_mut(project).extend(active);
        Ok(())
    }
}

fn event(ctx: &EvaluationContext<'_>, kind: EventKind) -> Event {
    Event::new(ctx.project, ctx.branch, ctx.user, ctx.now, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::fixtures::{Harness, source_file};
    use crate::quest::test_support::SwitchChallenge;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn engine() -> ProgressionEngine {
        ProgressionEngine::new(DetectorRegistry::new(), ProgressionConfig::default())
    }

    fn participant() -> UserProgress {
        let mut store = UserProgress::new("alice");
        store.participate("demo", &AchievementCatalog::default());
        store
    }

    #[test]
    fn non_participants_are_skipped() {
        let harness = Harness::new(vec![source_file("src/Calc.java", 0.4, "alice", 5)]);
        let mut store = UserProgress::new("alice");
        let events = EventLog::new();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let outcome = engine()
            .check_user(&mut store, &harness.ctx(), &events, 1, 0, &mut rng)
            .expect("evaluation");
        assert!(outcome.is_quiet());
        assert!(store.current_quests("demo").is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn solved_quests_score_and_make_room() {
        let harness = Harness::new(Vec::new());
        let ctx = harness.ctx();
        let mut store = participant();
        let switch = SwitchChallenge::new("a");
        store.new_quest("demo", Quest::new("One switch", vec![switch.step()], 0));
        switch.solve();
        let events = EventLog::new();
        let mut rng = ChaCha20Rng::seed_from_u64(1);

        let outcome = engine()
            .check_user(&mut store, &ctx, &events, 1, 0, &mut rng)
            .expect("evaluation");

        assert_eq!(outcome.quest_steps_solved, 1);
        assert_eq!(outcome.quests_solved, 1);
        assert_eq!(store.completed_quests("demo").len(), 1);
        assert_eq!(store.completed_challenges("demo").len(), 1);
        // The emptied slot is refilled; nothing is available so the placeholder lands.
        assert_eq!(outcome.quests_generated, 0);
        assert!(store.current_quests("demo")[0].is_unavailable());
        assert!(store.score("demo") >= u64::from(2u32 + 1));
    }

    #[test]
    fn unsolvable_quests_are_rejected() {
        let harness = Harness::new(Vec::new());
        let ctx = harness.ctx();
        let mut store = participant();
        let switch = SwitchChallenge::new("a");
        switch.block();
        store.new_quest("demo", Quest::new("Blocked", vec![switch.step()], 0));
        let events = EventLog::new();
        let mut rng = ChaCha20Rng::seed_from_u64(1);

        let outcome = engine()
            .check_user(&mut store, &ctx, &events, 1, 0, &mut rng)
            .expect("evaluation");

        assert_eq!(outcome.quests_rejected, 1);
        let rejected = store.rejected_quests("demo");
        assert_eq!(rejected[0].reason, REJECT_REASON_UNSOLVABLE);
        assert!(
            events
                .events()
                .iter()
                .any(|e| matches!(&e.kind, EventKind::QuestUnsolvable { quest } if quest == "Blocked"))
        );
    }

    #[test]
    fn placeholders_are_replaced_once_candidates_exist() {
        let mut store = participant();
        store.new_quest("demo", Quest::unavailable(0));
        let harness = Harness::new(vec![source_file("src/Calc.java", 0.4, "alice", 5)]);
        let events = EventLog::new();
        let mut rng = ChaCha20Rng::seed_from_u64(4);

        let outcome = engine()
            .check_user(&mut store, &harness.ctx(), &events, 1, 0, &mut rng)
            .expect("evaluation");

        assert_eq!(outcome.quests_generated, 1);
        let quests = store.current_quests("demo");
        assert_eq!(quests.len(), 1);
        assert!(!quests[0].is_unavailable());
    }

    fn flaky_registry() -> DetectorRegistry {
        let mut registry = DetectorRegistry::new();
        registry.register_check(DetectorReference::new("t", "ok"), |args| {
            Ok(args.ctx.now != 222)
        });
        registry.register_check(DetectorReference::new("t", "bad"), |args| {
            if args.ctx.now == 111 {
                return Err(DetectorError::Failed {
                    detector: "t::bad".to_string(),
                    reason: "report unreadable".to_string(),
                });
            }
            Ok(false)
        });
        registry.register_measure(DetectorReference::new("t", "ten"), |_| Ok(10.0));
        registry.register_measure(DetectorReference::new("t", "flaky"), |args| {
            if args.ctx.now == 111 {
                return Err(DetectorError::Failed {
                    detector: "t::flaky".to_string(),
                    reason: "report unreadable".to_string(),
                });
            }
            Ok(0.0)
        });
        registry
    }

    fn check(registry: &DetectorRegistry, name: &str) -> Achievement {
        Achievement::new(
            format!("/badges/{name}"),
            DetectorReference::new("t", name),
            name,
            name,
            false,
            BTreeMap::new(),
            registry,
        )
        .expect("check detector is registered")
    }

    fn badge(registry: &DetectorRegistry, name: &str) -> BadgeAchievement {
        BadgeAchievement::new(
            vec![format!("/badges/{name}")],
            vec![1],
            DetectorReference::new("t", name),
            name,
            name,
            "points",
            vec![name.to_string()],
            registry,
        )
        .expect("measure detector is registered")
    }

    fn run_at(store: &mut UserProgress, now: i64) -> Result<BuildOutcome, EngineError> {
        let mut harness = Harness::new(Vec::new());
        harness.now = now;
        let events = EventLog::new();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        engine().check_user(store, &harness.ctx(), &events, 1, 0, &mut rng)
    }

    #[test]
    fn failing_achievement_check_leaves_solve_times_unstamped() {
        let registry = flaky_registry();
        let mut store = participant();
        store
            .unsolved_achievements_mut("demo")
            .extend([check(&registry, "ok"), check(&registry, "bad")]);

        assert!(run_at(&mut store, 111).is_err());
        assert!(store.completed_achievements("demo").is_empty());
        assert!(
            store
                .unsolved_achievements_mut("demo")
                .iter()
                .all(|achievement| achievement.solved_time() == 0)
        );

        let quiet = run_at(&mut store, 222).expect("evaluation");
        assert_eq!(quiet.achievements_solved, 0);

        let outcome = run_at(&mut store, 333).expect("evaluation");
        assert_eq!(outcome.achievements_solved, 1);
        let completed = store.completed_achievements("demo");
        assert_eq!(completed[0].title(), "ok");
        assert_eq!(completed[0].solved_time(), 333);
    }

    #[test]
    fn failing_badge_measure_leaves_earlier_badges_uncounted() {
        let registry = flaky_registry();
        let mut store = participant();
        store
            .badge_achievements_mut("demo")
            .extend([badge(&registry, "ten"), badge(&registry, "flaky")]);

        assert!(run_at(&mut store, 111).is_err());
        assert_eq!(store.badge_achievements_mut("demo")[0].badge_counts(), &[0]);

        let outcome = run_at(&mut store, 222).expect("evaluation");
        assert_eq!(outcome.badges_earned, 1);
        let badges = store.badge_achievements_mut("demo");
        assert_eq!(badges[0].badge_counts(), &[1]);
        assert_eq!(badges[1].badge_counts(), &[0]);
    }

    #[test]
    fn metric_failures_keep_active_tasks() {
        let harness = Harness::new(Vec::new());
        let missing = MissingReports;
        let ctx = EvaluationContext {
            metrics: &missing,
            ..harness.ctx()
        };
        let mut store = participant();
        store.new_quest_task("demo", QuestTask::add_more_tests(2, 0, 0));
        let events = EventLog::new();
        let mut rng = ChaCha20Rng::seed_from_u64(1);

        let err = engine()
            .check_user(&mut store, &ctx, &events, 1, 0, &mut rng)
            .unwrap_err();
        assert!(matches!(err, EngineError::Metrics(_)));
        assert_eq!(store.current_quest_tasks("demo").len(), 1);
    }

    #[test]
    fn quest_tasks_progress_then_solve() {
        let mut harness = Harness::new(Vec::new());
        harness.metrics.tests = 11;
        let mut store = participant();
        store.new_quest_task("demo", QuestTask::add_more_tests(3, 10, 0));
        let events = EventLog::new();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let engine = engine();

        let first = engine
            .check_user(&mut store, &harness.ctx(), &events, 1, 0, &mut rng)
            .expect("evaluation");
        assert_eq!(first.quest_tasks_solved, 0);
        assert!(events.events().iter().any(|e| matches!(
            e.kind,
            EventKind::QuestTaskProgress { current: 1, goal: 3, .. }
        )));

        harness.metrics.tests = 13;
        let second = engine
            .check_user(&mut store, &harness.ctx(), &events, 1, 0, &mut rng)
            .expect("evaluation");
        assert_eq!(second.quest_tasks_solved, 1);
        assert_eq!(store.completed_quest_tasks("demo").len(), 1);
        assert_eq!(store.current_quest_tasks("demo").len(), 1);
    }
}
