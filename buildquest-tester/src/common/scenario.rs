//! Scripted build sequences the simulator replays.
//!
//! A scenario names the participants of one project and lists the builds that
//! happen to it in order. Each build carries the files and metrics the engine
//! sees, plus what every user did with challenges outside of quests.

use anyhow::{Context, Result, bail};
use buildquest_game::{
    BuildInfo, BuildResult, ChallengeKey, ChallengeKind, ChallengeRecord, MetricsSnapshot,
    ProgressionConfig, RejectedChallenge, SourceFile,
};
use chrono::{DateTime, Duration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const DEMO_SCENARIO: &str = include_str!("../../assets/demo_scenario.json");
const DEFAULT_START: &str = "2021-01-05T09:00:00Z";
const DEFAULT_BUILD_INTERVAL_MINUTES: i64 = 30;

fn default_start() -> String {
    DEFAULT_START.to_string()
}

const fn default_interval() -> i64 {
    DEFAULT_BUILD_INTERVAL_MINUTES
}

const fn default_score() -> u32 {
    1
}

fn default_reason() -> String {
    "no time".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub project: String,
    #[serde(default = "Scenario::default_branch")]
    pub branch: String,
    pub participants: Vec<String>,
    /// RFC 3339 time of the first build.
    #[serde(default = "default_start")]
    pub start: String,
    #[serde(default = "default_interval")]
    pub build_interval_minutes: i64,
    #[serde(default)]
    pub config: ProgressionConfig,
    pub builds: Vec<ScenarioBuild>,
    #[serde(default)]
    pub expectations: BTreeMap<String, Expectation>,
}

/// One build as the engine sees it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioBuild {
    #[serde(default)]
    pub result: BuildResult,
    #[serde(default)]
    pub duration_secs: u64,
    #[serde(default)]
    pub project_coverage: f64,
    #[serde(default)]
    pub tests: u32,
    #[serde(default)]
    pub failed_tests: u32,
    #[serde(default)]
    pub covered_lines: u32,
    #[serde(default)]
    pub covered_branches: u32,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub files: Vec<SourceFile>,
    #[serde(default)]
    pub activity: BTreeMap<String, UserActivity>,
}

/// Challenge traffic of one user in one build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserActivity {
    #[serde(default)]
    pub solved: Vec<ScriptedChallenge>,
    #[serde(default)]
    pub rejected: Vec<ScriptedChallenge>,
    #[serde(default)]
    pub sent: Vec<ScriptedChallenge>,
    #[serde(default)]
    pub received: Vec<ScriptedChallenge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedChallenge {
    pub kind: ChallengeKind,
    pub key: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_score")]
    pub score: u32,
    /// Minutes between creation and the scripted build.
    #[serde(default)]
    pub age_minutes: i64,
    #[serde(default = "default_reason")]
    pub reason: String,
}

/// Lower bounds a user's final state must meet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Expectation {
    #[serde(default)]
    pub min_score: u64,
    #[serde(default)]
    pub min_quests_solved: usize,
    #[serde(default)]
    pub min_quest_tasks_solved: usize,
    #[serde(default)]
    pub achievements: Vec<String>,
}

impl Scenario {
    fn default_branch() -> String {
        "main".to_string()
    }

    /// The bundled demo scenario.
    ///
    /// # Errors
    ///
    /// Fails only if the bundled asset is malformed.
    pub fn load_default() -> Result<Self> {
        Self::from_json(DEMO_SCENARIO).context("bundled demo scenario is invalid")
    }

    /// # Errors
    ///
    /// Returns an error when the file cannot be read or is not a valid scenario.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid scenario {}", path.display()))
    }

    /// # Errors
    ///
    /// Returns an error on malformed JSON or inconsistent participants.
    pub fn from_json(raw: &str) -> Result<Self> {
        let scenario: Self = serde_json::from_str(raw)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<()> {
        if self.participants.is_empty() {
            bail!("scenario '{}' has no participants", self.name);
        }
        for (index, build) in self.builds.iter().enumerate() {
            if let Some(user) = build
                .activity
                .keys()
                .find(|user| !self.participants.contains(user))
            {
                bail!(
                    "build {} lists activity for {user}, who is not a participant",
                    index + 1
                );
            }
        }
        if let Some(user) = self
            .expectations
            .keys()
            .find(|user| !self.participants.contains(user))
        {
            bail!("expectation for unknown participant {user}");
        }
        self.start_millis()?;
        Ok(())
    }

    /// Epoch milliseconds of the first build.
    ///
    /// # Errors
    ///
    /// Returns an error when `start` is not RFC 3339.
    pub fn start_millis(&self) -> Result<i64> {
        let start = DateTime::parse_from_rfc3339(&self.start)
            .with_context(|| format!("invalid start time {:?}", self.start))?;
        Ok(start.timestamp_millis())
    }

    /// Epoch milliseconds of the build at `index`, counting from zero.
    ///
    /// # Errors
    ///
    /// Returns an error when `start` is not RFC 3339.
    pub fn build_time(&self, index: usize) -> Result<i64> {
        let offset = i64::try_from(index).unwrap_or(i64::MAX);
        let step = Duration::minutes(self.build_interval_minutes.saturating_mul(offset));
        Ok(self.start_millis()? + step.num_milliseconds())
    }
}

impl ScenarioBuild {
    #[must_use]
    pub fn info(&self, number: u32) -> BuildInfo {
        BuildInfo {
            number,
            result: self.result,
            duration_secs: self.duration_secs,
            failed_tests: self.failed_tests,
            total_tests: self.tests,
            project_coverage: self.project_coverage,
        }
    }

    #[must_use]
    pub const fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::new(self.covered_lines, self.covered_branches, self.tests)
    }
}

impl ScriptedChallenge {
    /// History entry for a challenge handled at `now`.
    #[must_use]
    pub fn record(&self, now: i64, solved: bool) -> ChallengeRecord {
        let created = now - Duration::minutes(self.age_minutes).num_milliseconds();
        ChallengeRecord {
            kind: self.kind,
            key: ChallengeKey::new(self.key.clone()),
            description: self.description.clone(),
            created,
            solved: if solved { now } else { 0 },
            score: self.score,
        }
    }

    #[must_use]
    pub fn rejection(&self, now: i64) -> RejectedChallenge {
        RejectedChallenge {
            record: self.record(now, false),
            reason: self.reason.clone(),
            rejected_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "name": "minimal",
        "project": "shop",
        "participants": ["alice"],
        "builds": [{ "tests": 3 }]
    }"#;

    #[test]
    fn demo_scenario_parses() {
        let scenario = Scenario::load_default().expect("demo scenario");
        assert!(scenario.participants.len() > 1);
        assert!(!scenario.builds.is_empty());
    }

    #[test]
    fn minimal_scenario_fills_defaults() {
        let scenario = Scenario::from_json(MINIMAL).expect("minimal");
        assert_eq!(scenario.branch, "main");
        assert_eq!(scenario.config, ProgressionConfig::default());
        assert_eq!(scenario.builds[0].metrics(), MetricsSnapshot::new(0, 0, 3));
        let first = scenario.build_time(0).expect("start");
        let second = scenario.build_time(1).expect("start");
        assert_eq!(second - first, 30 * 60_000);
    }

    #[test]
    fn activity_for_strangers_is_rejected() {
        let raw = r#"{
            "name": "stranger",
            "project": "shop",
            "participants": ["alice"],
            "builds": [{ "activity": { "mallory": {} } }]
        }"#;
        let err = Scenario::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("mallory"));
    }

    #[test]
    fn invalid_start_is_rejected() {
        let raw = MINIMAL.replace("\"builds\"", "\"start\": \"yesterday\", \"builds\"");
        assert!(Scenario::from_json(&raw).is_err());
    }

    #[test]
    fn scripted_challenges_age_backwards() {
        let challenge = ScriptedChallenge {
            kind: ChallengeKind::Smell,
            key: "smell:Cart:12".to_string(),
            description: String::new(),
            score: 2,
            age_minutes: 5,
            reason: default_reason(),
        };
        let record = challenge.record(600_000, true);
        assert_eq!(record.created, 300_000);
        assert_eq!(record.solved, 600_000);
        let rejected = challenge.rejection(600_000);
        assert_eq!(rejected.record.solved, 0);
        assert_eq!(rejected.rejected_at, 600_000);
    }
}
