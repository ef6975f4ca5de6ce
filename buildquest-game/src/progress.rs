//! Per-user goal state.
//!
//! [`ProgressStore`] is the contract the engine reads and mutates; persistence
//! lives behind it. [`UserProgress`] is the in-memory implementation used by
//! the simulation harness and the tests.

use std::collections::{BTreeMap, BTreeSet};

use crate::achievement::{
    Achievement, AchievementCatalog, BadgeAchievement, ProgressAchievement,
};
use crate::challenge::{ChallengeRecord, RejectedChallenge};
use crate::quest::{Quest, RejectedQuest};
use crate::quest_task::{QuestTask, QuestTaskInputs, QuestTaskType};

/// Goal collections of one user, keyed by project.
///
/// Callers guarantee a single writer per user while an evaluation runs.
pub trait ProgressStore {
    fn user(&self) -> &str;

    fn is_participating(&self, project: &str) -> bool;

    fn score(&self, project: &str) -> u64;

    fn add_score(&mut self, project: &str, score: u32);

    fn current_quests(&self, project: &str) -> &[Quest];

    fn current_quests_mut(&mut self, project: &str) -> &mut Vec<Quest>;

    fn new_quest(&mut self, project: &str, quest: Quest) {
        self.current_quests_mut(project).push(quest);
    }

    fn complete_quest(&mut self, project: &str, quest: Quest);

    fn completed_quests(&self, project: &str) -> &[Quest];

    fn reject_quest(&mut self, project: &str, quest: Quest, reason: &str);

    fn rejected_quests(&self, project: &str) -> &[RejectedQuest];

    fn completed_challenges(&self, project: &str) -> &[ChallengeRecord];

    fn complete_challenge(&mut self, project: &str, record: ChallengeRecord);

    fn rejected_challenges(&self, project: &str) -> &[RejectedChallenge];

    fn reject_challenge(&mut self, project: &str, rejected: RejectedChallenge);

    fn current_quest_tasks(&self, project: &str) -> &[QuestTask];

    fn current_quest_tasks_mut(&mut self, project: &str) -> &mut Vec<QuestTask>;

    fn new_quest_task(&mut self, project: &str, task: QuestTask) {
        self.current_quest_tasks_mut(project).push(task);
    }

    fn complete_quest_task(&mut self, project: &str, task: QuestTask);

    fn completed_quest_tasks(&self, project: &str) -> &[QuestTask];

    fn completed_achievements(&self, project: &str) -> &[Achievement];

    fn unsolved_achievements_mut(&mut self, project: &str) -> &mut Vec<Achievement>;

    fn complete_achievement(&mut self, project: &str, achievement: Achievement);

    fn badge_achievements_mut(&mut self, project: &str) -> &mut Vec<BadgeAchievement>;

    fn progress_achievements_mut(&mut self, project: &str) -> &mut Vec<ProgressAchievement>;

    /// Feed a sent challenge to the first send task that accepts it.
    fn challenge_sent(&mut self, project: &str, record: ChallengeRecord) -> bool {
        self.current_quest_tasks_mut(project)
            .iter_mut()
            .find(|task| task.task_type() == QuestTaskType::SendChallenge)
            .is_some_and(|task| task.challenge_sent(record))
    }

    /// Feed a received challenge to the first receive task that accepts it.
    fn challenge_received(&mut self, project: &str, record: ChallengeRecord) -> bool {
        self.current_quest_tasks_mut(project)
            .iter_mut()
            .find(|task| task.task_type() == QuestTaskType::ReceiveChallenge)
            .is_some_and(|task| task.challenge_received(record))
    }

    /// Read-only history a quest task evaluates against.
    fn task_inputs(&self, project: &str) -> QuestTaskInputs<'_> {
        QuestTaskInputs {
            completed_challenges: self.completed_challenges(project),
            rejected_challenges: self.rejected_challenges(project),
            completed_achievements: self.completed_achievements(project),
        }
    }
}

/// Everything one user holds in one project.
#[derive(Debug, Default)]
pub struct ProjectProgress {
    pub score: u64,
    pub current_quests: Vec<Quest>,
    pub completed_quests: Vec<Quest>,
    pub rejected_quests: Vec<RejectedQuest>,
    pub current_quest_tasks: Vec<QuestTask>,
    pub completed_quest_tasks: Vec<QuestTask>,
    pub completed_challenges: Vec<ChallengeRecord>,
    pub rejected_challenges: Vec<RejectedChallenge>,
    pub unsolved_achievements: Vec<Achievement>,
    pub completed_achievements: Vec<Achievement>,
    pub badge_achievements: Vec<BadgeAchievement>,
    pub progress_achievements: Vec<ProgressAchievement>,
}

/// In-memory [`ProgressStore`].
#[derive(Debug, Default)]
pub struct UserProgress {
    user: String,
    participating: BTreeSet<String>,
    projects: BTreeMap<String, ProjectProgress>,
}

impl UserProgress {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    /// Join `project` and receive a fresh copy of every catalog achievement.
    pub fn participate(&mut self, project: &str, catalog: &AchievementCatalog) {
        if !self.participating.insert(project.to_string()) {
            return;
        }
        let state = self.project_mut(project);
        state.unsolved_achievements = catalog
            .achievements
            .iter()
            .map(Achievement::unsolved_copy)
            .collect();
        state.badge_achievements = catalog
            .badges
            .iter()
            .map(BadgeAchievement::unearned_copy)
            .collect();
        state.progress_achievements = catalog
            .progress
            .iter()
            .map(ProgressAchievement::fresh_copy)
            .collect();
    }

    pub fn leave(&mut self, project: &str) {
        self.participating.remove(project);
    }

    #[must_use]
    pub fn project(&self, project: &str) -> Option<&ProjectProgress> {
        self.projects.get(project)
    }

    pub fn project_mut(&mut self, project: &str) -> &mut ProjectProgress {
        self.projects.entry(project.to_string()).or_default()
    }
}

impl ProgressStore for UserProgress {
    fn user(&self) -> &str {
        &self.user
    }

    fn is_participating(&self, project: &str) -> bool {
        self.participating.contains(project)
    }

    fn score(&self, project: &str) -> u64 {
        self.project(project).map_or(0, |state| state.score)
    }

    fn add_score(&mut self, project: &str, score: u32) {
        self.project_mut(project).score += u64::from(score);
    }

    fn current_quests(&self, project: &str) -> &[Quest] {
        self.project(project)
            .map_or(&[][..], |state| state.current_quests.as_slice())
    }

    fn current_quests_mut(&mut self, project: &str) -> &mut Vec<Quest> {
        &mut self.project_mut(project).current_quests
    }

    fn complete_quest(&mut self, project: &str, quest: Quest) {
        self.project_mut(project).completed_quests.push(quest);
    }

    fn completed_quests(&self, project: &str) -> &[Quest] {
        self.project(project)
            .map_or(&[][..], |state| state.completed_quests.as_slice())
    }

    fn reject_quest(&mut self, project: &str, quest: Quest, reason: &str) {
        self.project_mut(project).rejected_quests.push(RejectedQuest {
            quest,
            reason: reason.to_string(),
        });
    }

    fn rejected_quests(&self, project: &str) -> &[RejectedQuest] {
        self.project(project)
            .map_or(&[][..], |state| state.rejected_quests.as_slice())
    }

    fn completed_challenges(&self, project: &str) -> &[ChallengeRecord] {
        self.project(project)
            .map_or(&[][..], |state| state.completed_challenges.as_slice())
    }

    fn complete_challenge(&mut self, project: &str, record: ChallengeRecord) {
        self.project_mut(project).completed_challenges.push(record);
    }

    fn rejected_challenges(&self, project: &str) -> &[RejectedChallenge] {
        self.project(project)
            .map_or(&[][..], |state| state.rejected_challenges.as_slice())
    }

    fn reject_challenge(&mut self, project: &str, rejected: RejectedChallenge) {
        self.project_mut(project).rejected_challenges.push(rejected);
    }

    fn current_quest_tasks(&self, project: &str) -> &[QuestTask] {
        self.project(project)
            .map_or(&[][..], |state| state.current_quest_tasks.as_slice())
    }

    fn current_quest_tasks_mut(&mut self, project: &str) -> &mut Vec<QuestTask> {
        &mut self.project_mut(project).current_quest_tasks
    }

    fn complete_quest_task(&mut self, project: &str, task: QuestTask) {
        self.project_mut(project).completed_quest_tasks.push(task);
    }

    fn completed_quest_tasks(&self, project: &str) -> &[QuestTask] {
        self.project(project)
            .map_or(&[][..], |state| state.completed_quest_tasks.as_slice())
    }

    fn completed_achievements(&self, project: &str) -> &[Achievement] {
        self.project(project)
            .map_or(&[][..], |state| state.completed_achievements.as_slice())
    }

    fn unsolved_achievements_mut(&mut self, project: &str) -> &mut Vec<Achievement> {
        &mut self.project_mut(project).unsolved_achievements
    }

    fn complete_achievement(&mut self, project: &str, achievement: Achievement) {
        self.project_mut(project)
            .completed_achievements
            .push(achievement);
    }

    fn badge_achievements_mut(&mut self, project: &str) -> &mut Vec<BadgeAchievement> {
        &mut self.project_mut(project).badge_achievements
    }

    fn progress_achievements_mut(&mut self, project: &str) -> &mut Vec<ProgressAchievement> {
        &mut self.project_mut(project).progress_achievements
    }
}
