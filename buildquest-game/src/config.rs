//! Generation targets and evaluation switches.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CURRENT_QUEST_TASKS, DEFAULT_CURRENT_QUESTS, GENERATION_ATTEMPTS};

const DEFAULT_PROGRESSION_DATA: &str = include_str!("../assets/progression.json");

/// How far ahead `Quest::is_solvable` looks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolvabilityScope {
    /// Only the step the quest is waiting on.
    #[default]
    CurrentStep,
    /// Every step from the current one to the end.
    RemainingSteps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default = "ProgressionConfig::fallback")]
pub struct ProgressionConfig {
    pub current_quests: usize,
    pub current_quest_tasks: usize,
    pub generation_attempts: usize,
    pub solvability: SolvabilityScope,
}

impl ProgressionConfig {
    const FALLBACK: Self = Self {
        current_quests: DEFAULT_CURRENT_QUESTS,
        current_quest_tasks: DEFAULT_CURRENT_QUEST_TASKS,
        generation_attempts: GENERATION_ATTEMPTS,
        solvability: SolvabilityScope::CurrentStep,
    };

    const fn fallback() -> Self {
        Self::FALLBACK
    }

    #[must_use]
    pub fn load_from_static() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns an error if `json` is not a valid configuration object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Attempts are never below one.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.generation_attempts.max(1)
    }
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        serde_json::from_str(DEFAULT_PROGRESSION_DATA).unwrap_or(Self::FALLBACK)
    }
}
