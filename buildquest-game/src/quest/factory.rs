//! Randomized quest generation.

use rand::Rng;
use rand::seq::{IteratorRandom, SliceRandom};

use super::{Quest, QuestStep};
use crate::challenge::{Challenge, LineCoverageChallenge};
use crate::config::ProgressionConfig;
use crate::constants::{LINES_QUEST_NAME, LINES_QUEST_STEPS};
use crate::context::{EvaluationContext, SourceFile};
use crate::event::{Event, EventKind, EventSink};
use crate::progress::ProgressStore;

/// Fill the user's quest slots up to `config.current_quests`.
///
/// Returns the number of real quests added. When the user changed no file
/// with open coverage, or a slot exhausts its attempts, the "no quest"
/// placeholder is recorded and generation stops for this build.
pub fn generate_new_quests<S, R>(
    store: &mut S,
    ctx: &EvaluationContext<'_>,
    events: &dyn EventSink,
    config: &ProgressionConfig,
    rng: &mut R,
) -> usize
where
    S: ProgressStore + ?Sized,
    R: Rng + ?Sized,
{
    let open_slots = config
        .current_quests
        .saturating_sub(store.current_quests(ctx.project).len());
    if open_slots == 0 {
        return 0;
    }
    log::debug!(
        "generating up to {open_slots} quests for {} in {}",
        ctx.user,
        ctx.project
    );

    let mut generated = 0;
    for _ in 0..open_slots {
        match generate_quest(store, ctx, config.attempts(), rng) {
            Some(quest) => {
                log::info!("generated quest '{}' for {}", quest.name(), ctx.user);
                events.add_event(event(
                    ctx,
                    EventKind::QuestGenerated {
                        quest: Some(quest.name().to_string()),
                    },
                ));
                store.new_quest(ctx.project, quest);
                generated += 1;
            }
            None => {
                log::info!("no quest available for {} in {}", ctx.user, ctx.project);
                store.new_quest(ctx.project, Quest::unavailable(ctx.now));
                events.add_event(event(ctx, EventKind::QuestGenerated { quest: None }));
                break;
            }
        }
    }
    generated
}

/// One quest for the user, or `None` once `attempts` draws were all rejected.
pub fn generate_quest<S, R>(
    store: &S,
    ctx: &EvaluationContext<'_>,
    attempts: usize,
    rng: &mut R,
) -> Option<Quest>
where
    S: ProgressStore + ?Sized,
    R: Rng + ?Sized,
{
    let candidates = candidate_files(ctx);
    if candidates.is_empty() {
        log::debug!("{} has no changed files with open coverage", ctx.user);
        return None;
    }

    for attempt in 1..=attempts {
        let Some(quest) = generate_lines_quest(ctx, &candidates, rng) else {
            log::debug!("attempt {attempt}: no class with enough open lines");
            continue;
        };
        if is_rejected(store, ctx.project, &quest) {
            log::debug!("attempt {attempt}: '{}' was rejected before", quest.name());
            continue;
        }
        return Some(quest);
    }
    None
}

/// Three distinct open lines of one randomly chosen class.
pub fn generate_lines_quest<R: Rng + ?Sized>(
    ctx: &EvaluationContext<'_>,
    candidates: &[&SourceFile],
    rng: &mut R,
) -> Option<Quest> {
    let file = candidates.choose(rng)?;
    let lines = file.open_lines().choose_multiple(rng, LINES_QUEST_STEPS);
    if lines.len() < LINES_QUEST_STEPS {
        return None;
    }
    let steps = lines
        .into_iter()
        .map(|line| {
            QuestStep::new(
                "",
                Box::new(LineCoverageChallenge::new(file, line, ctx.branch, ctx.now))
                    as Box<dyn Challenge>,
            )
        })
        .collect();
    Some(Quest::new(LINES_QUEST_NAME, steps, ctx.now))
}

fn candidate_files<'a>(ctx: &EvaluationContext<'a>) -> Vec<&'a SourceFile> {
    ctx.user_files()
        .filter(|file| !file.is_test && file.coverage < 1.0)
        .collect()
}

fn is_rejected<S: ProgressStore + ?Sized>(store: &S, project: &str, quest: &Quest) -> bool {
    if store
        .rejected_quests(project)
        .iter()
        .any(|rejected| rejected.quest == *quest)
    {
        return true;
    }
    let keys = quest.step_keys();
    store
        .rejected_challenges(project)
        .iter()
        .any(|rejected| keys.contains(&rejected.record.key))
}

fn event(ctx: &EvaluationContext<'_>, kind: EventKind) -> Event {
    Event::new(ctx.project, ctx.branch, ctx.user, ctx.now, kind)
}
