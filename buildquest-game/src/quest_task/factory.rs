//! Weighted quest task generation.

use rand::Rng;

use super::{QuestTask, QuestTaskType};
use crate::challenge::{ChallengeFilter, ChallengeKind};
use crate::config::ProgressionConfig;
use crate::constants::{
    COVERAGE_GOAL_SCALE, MULTI_PARTICIPANT_THRESHOLD, QUEST_TASK_GOAL_MAX, QUEST_TASK_GOAL_MIN,
    WEIGHT_FILTER_ANY, WEIGHT_FILTER_COVERAGE, WEIGHT_KIND_BRANCH, WEIGHT_KIND_BUILD,
    WEIGHT_KIND_CLASS, WEIGHT_KIND_LINE, WEIGHT_KIND_METHOD, WEIGHT_KIND_MUTATION,
    WEIGHT_KIND_SMELL,
};
use crate::context::EvaluationContext;
use crate::event::{Event, EventKind, EventSink};
use crate::metrics::MetricsError;
use crate::progress::ProgressStore;
use crate::weights::choose_weighted;

// Test challenges only prove a test exists and are never counted.
const FILTER_WEIGHTS: [(ChallengeFilter, u32); 9] = [
    (ChallengeFilter::Any, WEIGHT_FILTER_ANY),
    (ChallengeFilter::Coverage, WEIGHT_FILTER_COVERAGE),
    (
        ChallengeFilter::Kind(ChallengeKind::ClassCoverage),
        WEIGHT_KIND_CLASS,
    ),
    (
        ChallengeFilter::Kind(ChallengeKind::MethodCoverage),
        WEIGHT_KIND_METHOD,
    ),
    (
        ChallengeFilter::Kind(ChallengeKind::LineCoverage),
        WEIGHT_KIND_LINE,
    ),
    (
        ChallengeFilter::Kind(ChallengeKind::BranchCoverage),
        WEIGHT_KIND_BRANCH,
    ),
    (
        ChallengeFilter::Kind(ChallengeKind::Mutation),
        WEIGHT_KIND_MUTATION,
    ),
    (ChallengeFilter::Kind(ChallengeKind::Smell), WEIGHT_KIND_SMELL),
    (ChallengeFilter::Kind(ChallengeKind::Build), WEIGHT_KIND_BUILD),
];

/// Draw the challenge family a counting task will accept.
pub fn choose_challenge_filter<R: Rng + ?Sized>(rng: &mut R) -> ChallengeFilter {
    choose_weighted(&FILTER_WEIGHTS, rng).unwrap_or_default()
}

/// Draw a variant; send/receive are only eligible with more than one participant.
pub fn choose_quest_task_type<R: Rng + ?Sized>(participants: usize, rng: &mut R) -> QuestTaskType {
    let table: Vec<(QuestTaskType, u32)> = QuestTaskType::ALL
        .into_iter()
        .filter(|task_type| {
            !task_type.needs_counterpart() || participants > MULTI_PARTICIPANT_THRESHOLD
        })
        .map(|task_type| (task_type, task_type.weight()))
        .collect();
    choose_weighted(&table, rng).unwrap_or(QuestTaskType::SolveChallenges)
}

fn build_task<R: Rng + ?Sized>(
    task_type: QuestTaskType,
    number: u32,
    ctx: &EvaluationContext<'_>,
    completed_achievements: usize,
    rng: &mut R,
) -> Result<QuestTask, MetricsError> {
    let now = ctx.now;
    let scaled = number * COVERAGE_GOAL_SCALE;
    Ok(match task_type {
        QuestTaskType::AddMoreTests => QuestTask::add_more_tests(number, ctx.test_count()?, now),
        QuestTaskType::CoverMoreBranches => {
            QuestTask::cover_more_branches(scaled, ctx.covered_branches()?, now)
        }
        QuestTaskType::CoverMoreLines => {
            QuestTask::cover_more_lines(scaled, ctx.covered_lines()?, now)
        }
        QuestTaskType::ReceiveChallenge => QuestTask::receive_challenge(now),
        QuestTaskType::SendChallenge => QuestTask::send_challenge(now),
        QuestTaskType::SolveAchievement => QuestTask::solve_achievement(completed_achievements, now),
        QuestTaskType::SolveChallenges => {
            QuestTask::solve_challenges(number, choose_challenge_filter(rng), now)
        }
        QuestTaskType::SolveChallengesWithoutRejection => {
            QuestTask::solve_challenges_without_rejection(number, now)
        }
    })
}

/// One task whose goal differs from every task in `current`.
///
/// Falls back to "solve `n` challenges of any kind" once `attempts` draws all
/// duplicated an active task.
///
/// # Errors
///
/// Propagates metric failures while taking a baseline snapshot.
pub fn generate_quest_task<R: Rng + ?Sized>(
    current: &[QuestTask],
    ctx: &EvaluationContext<'_>,
    completed_achievements: usize,
    participants: usize,
    attempts: usize,
    rng: &mut R,
) -> Result<QuestTask, MetricsError> {
    let number = rng.gen_range(QUEST_TASK_GOAL_MIN..=QUEST_TASK_GOAL_MAX);

    for attempt in 1..=attempts {
        let task_type = choose_quest_task_type(participants, rng);
        let task = build_task(task_type, number, ctx, completed_achievements, rng)?;
        if current.iter().any(|active| active.same_goal(&task)) {
            log::debug!("attempt {attempt}: '{task}' duplicates an active task");
            continue;
        }
        return Ok(task);
    }
    Ok(QuestTask::solve_challenges(number, ChallengeFilter::Any, ctx.now))
}

/// Fill the user's task slots up to `config.current_quest_tasks`.
///
/// # Errors
///
/// Propagates metric failures; tasks generated before the failure are kept.
pub fn generate_new_quest_tasks<S, R>(
    store: &mut S,
    ctx: &EvaluationContext<'_>,
    events: &dyn EventSink,
    config: &ProgressionConfig,
    participants: usize,
    rng: &mut R,
) -> Result<usize, MetricsError>
where
    S: ProgressStore + ?Sized,
    R: Rng + ?Sized,
{
    let open_slots = config
        .current_quest_tasks
        .saturating_sub(store.current_quest_tasks(ctx.project).len());
    if open_slots > 0 {
        log::debug!(
            "generating up to {open_slots} quest tasks for {} in {}",
            ctx.user,
            ctx.project
        );
    }

    let mut generated = 0;
    for _ in 0..open_slots {
        let task = generate_quest_task(
            store.current_quest_tasks(ctx.project),
            ctx,
            store.completed_achievements(ctx.project).len(),
            participants,
            config.attempts(),
            rng,
        )?;
        log::info!("generated quest task '{task}' for {}", ctx.user);
        events.add_event(Event::new(
            ctx.project,
            ctx.branch,
            ctx.user,
            ctx.now,
            EventKind::QuestTaskGenerated {
                task: task.title(),
            },
        ));
        store.new_quest_task(ctx.project, task);
        generated += 1;
    }
    Ok(generated)
}
