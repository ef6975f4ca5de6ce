//! Multi-step quests.
//!
//! A [`Quest`] walks its [`QuestStep`]s strictly in order: the step at
//! `current_step` must be solved before the next one is looked at, and the
//! quest is solved once `current_step == steps.len()`. A quest without steps
//! is the "nothing could be generated" placeholder and never advances.

pub mod factory;

use std::collections::BTreeSet;
use std::fmt;

use crate::challenge::{Challenge, ChallengeKey};
use crate::config::SolvabilityScope;
use crate::constants::NO_QUEST;
use crate::context::EvaluationContext;
use crate::xml;

pub use factory::{generate_lines_quest, generate_new_quests, generate_quest};

/// One challenge of a quest with its display text.
#[derive(Debug)]
pub struct QuestStep {
    description: String,
    challenge: Box<dyn Challenge>,
}

impl QuestStep {
    pub fn new(description: impl Into<String>, challenge: Box<dyn Challenge>) -> Self {
        Self {
            description: description.into(),
            challenge,
        }
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn challenge(&self) -> &dyn Challenge {
        self.challenge.as_ref()
    }

    #[must_use]
    pub fn key(&self) -> ChallengeKey {
        self.challenge.key()
    }

    #[must_use]
    pub fn to_xml(&self, indentation: usize) -> String {
        let pad = xml::pad(indentation);
        format!(
            "{pad}<QuestStep{}>\n{}\n{pad}</QuestStep>",
            xml::attributes(&[("description", self.description.clone())]),
            self.challenge.to_xml(None, indentation + 2)
        )
    }
}

impl PartialEq for QuestStep {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl fmt::Display for QuestStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            f.write_str(&self.challenge.escaped_string())
        } else {
            f.write_str(&self.description)
        }
    }
}

/// Ordered sequence of steps solved one at a time.
#[derive(Debug)]
pub struct Quest {
    name: String,
    steps: Vec<QuestStep>,
    created: i64,
    current_step: usize,
    solved: i64,
}

impl Quest {
    pub fn new(name: impl Into<String>, steps: Vec<QuestStep>, created: i64) -> Self {
        Self {
            name: name.into(),
            steps,
            created,
            current_step: 0,
            solved: 0,
        }
    }

    /// The placeholder recorded when no quest could be generated.
    #[must_use]
    pub fn unavailable(created: i64) -> Self {
        Self::new(NO_QUEST, Vec::new(), created)
    }

    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.steps.is_empty() && self.name == NO_QUEST
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn steps(&self) -> &[QuestStep] {
        &self.steps
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
    pub const fn current_step_number(&self) -> usize {
        self.current_step
    }

    /// The step being worked on; the last step once the quest is finished.
    #[must_use]
    pub fn current_step(&self) -> Option<&QuestStep> {
        self.steps
            .get(self.current_step)
            .or_else(|| self.steps.last())
    }

    /// The most recently completed step, or the first step before any progress.
    #[must_use]
    pub fn last_step(&self) -> Option<&QuestStep> {
        self.steps.get(self.current_step.saturating_sub(1))
    }

    /// Advance by one step if the current step's challenge is solved.
    ///
    /// On success the next step's challenge, if any, is refreshed with `update`.
    pub fn is_current_step_solved(&mut self, ctx: &EvaluationContext<'_>) -> bool {
        let Some(step) = self.steps.get_mut(self.current_step) else {
            return false;
        };
        if !step.challenge.is_solved(ctx) {
            return false;
        }
        self.current_step += 1;
        if let Some(next) = self.steps.get_mut(self.current_step) {
            next.challenge.update(ctx);
        }
        true
    }

    /// Whether the quest can still be finished.
    ///
    /// `CurrentStep` only asks the step being worked on; `RemainingSteps`
    /// asks every step that is not solved yet.
    #[must_use]
    pub fn is_solvable(&self, ctx: &EvaluationContext<'_>, scope: SolvabilityScope) -> bool {
        if self.steps.is_empty() {
            return false;
        }
        let remaining = self.steps.get(self.current_step..).unwrap_or_default();
        match scope {
            SolvabilityScope::CurrentStep => remaining
                .first()
                .is_none_or(|step| step.challenge.is_solvable(ctx)),
            SolvabilityScope::RemainingSteps => remaining
                .iter()
                .all(|step| step.challenge.is_solvable(ctx)),
        }
    }

    /// True once every step is done; the first observation stamps `solved`.
    pub fn is_solved(&mut self, now: i64) -> bool {
        if self.steps.is_empty() || self.current_step < self.steps.len() {
            return false;
        }
        if self.solved == 0 {
            self.solved = now;
        }
        true
    }

    /// Sum of the step scores plus one bonus point per step.
    #[must_use]
    pub fn score(&self) -> u32 {
        let steps = u32::try_from(self.steps.len()).unwrap_or(u32::MAX);
        self.steps
            .iter()
            .map(|step| step.challenge.score())
            .sum::<u32>()
            .saturating_add(steps)
    }

    #[must_use]
    pub fn step_keys(&self) -> BTreeSet<ChallengeKey> {
        self.steps.iter().map(QuestStep::key).collect()
    }

    #[must_use]
    pub fn to_xml(&self, reason: Option<&str>, indentation: usize) -> String {
        let pad = xml::pad(indentation);
        let inner = xml::pad(indentation + 2);
        let mut out = format!(
            "{pad}<Quest{}{}>\n",
            xml::attributes(&[
                ("name", self.name.clone()),
                ("created", self.created.to_string()),
                ("solved", self.solved.to_string()),
                ("currentStep", self.current_step.to_string()),
            ]),
            xml::reason_attribute(reason)
        );
        out.push_str(&format!(
            "{inner}<QuestSteps count=\"{}\">\n",
            self.steps.len()
        ));
        for step in &self.steps {
            out.push_str(&step.to_xml(indentation + 4));
            out.push('\n');
        }
        out.push_str(&format!("{inner}</QuestSteps>\n{pad}</Quest>"));
        out
    }
}

/// Order-insensitive: each quest's step challenges are contained in the other's.
impl PartialEq for Quest {
    fn eq(&self, other: &Self) -> bool {
        let mine = self.step_keys();
        let theirs = other.step_keys();
        mine.is_subset(&theirs) && theirs.is_subset(&mine)
    }
}

impl fmt::Display for Quest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A quest the user dropped or that became unsolvable.
#[derive(Debug)]
pub struct RejectedQuest {
    pub quest: Quest,
    pub reason: String,
}
