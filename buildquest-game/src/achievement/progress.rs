use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::{AchievementError, CountFn, DetectorArgs, DetectorReference, DetectorRegistry};
use crate::constants::PERCENT_CAP;
use crate::xml;

/// Result of a progress evaluation that moved the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressStep {
    pub progress: i64,
    /// Highest milestone crossed by this step, if any.
    pub milestone: Option<i64>,
}

/// Achievement with a cumulative counter measured against milestones.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProgressAchievement {
    badge_base_path: String,
    /// Ascending milestone values.
    milestones: Vec<i64>,
    detector: DetectorReference,
    description: String,
    title: String,
    #[serde(default)]
    progress: i64,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    additional_parameters: BTreeMap<String, String>,
    #[serde(skip)]
    count: Option<Arc<CountFn>>,
}

impl ProgressAchievement {
    /// # Errors
    ///
    /// Fails when the detector is not a registered count.
    pub fn new(
        badge_base_path: impl Into<String>,
        mut milestones: Vec<i64>,
        detector: DetectorReference,
        description: impl Into<String>,
        title: impl Into<String>,
        unit: impl Into<String>,
        registry: &DetectorRegistry,
    ) -> Result<Self, AchievementError> {
        let count = registry.resolve_count(&detector)?;
        milestones.sort_unstable();
        Ok(Self {
            badge_base_path: badge_base_path.into(),
            milestones,
            detector,
            description: description.into(),
            title: title.into(),
            progress: 0,
            unit: unit.into(),
            additional_parameters: BTreeMap::new(),
            count: Some(count),
        })
    }

    /// # Errors
    ///
    /// Fails when the stored reference is no longer registered as a count.
    pub fn rehydrate(mut self, registry: &DetectorRegistry) -> Result<Self, AchievementError> {
        self.milestones.sort_unstable();
        self.count = Some(registry.resolve_count(&self.detector)?);
        Ok(self)
    }

    /// Measure and raise `progress` if the new value is larger.
    ///
    /// # Errors
    ///
    /// Propagates detector failures and fails if the achievement was never resolved.
    pub fn progress(
        &mut self,
        args: &DetectorArgs<'_, '_>,
    ) -> Result<Option<ProgressStep>, AchievementError> {
        let count = self
            .count
            .as_ref()
            .ok_or_else(|| AchievementError::Unresolved {
                title: self.title.clone(),
            })?;
        let parameters = &self.additional_parameters;
        let value = count(&DetectorArgs {
            parameters,
            ..*args
        })?;
        if value <= self.progress {
            return Ok(None);
        }
        let before = self.active_milestone();
        self.progress = value;
        let after = self.active_milestone();
        let milestone = (after > before).then(|| self.milestones[after - 1]);
        Ok(Some(ProgressStep {
            progress: value,
            milestone,
        }))
    }

    #[must_use]
    pub const fn current_progress(&self) -> i64 {
        self.progress
    }

    #[must_use]
    pub fn milestones(&self) -> &[i64] {
        &self.milestones
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    #[must_use]
    pub fn badge_base_path(&self) -> &str {
        &self.badge_base_path
    }

    /// Index of the first milestone not yet reached; `milestones.len()` once all are.
    #[must_use]
    pub fn active_milestone(&self) -> usize {
        self.milestones
            .iter()
            .position(|milestone| self.progress < *milestone)
            .unwrap_or(self.milestones.len())
    }

    /// Progress towards milestone `index`, measured from the previous one.
    #[must_use]
    pub fn milestone_percentage(&self, index: usize) -> u32 {
        let Some(&target) = self.milestones.get(index) else {
            return PERCENT_CAP;
        };
        let start = index
            .checked_sub(1)
            .and_then(|previous| self.milestones.get(previous).copied())
            .unwrap_or(0);
        let span = target - start;
        if span <= 0 {
            return if self.progress >= target { PERCENT_CAP } else { 0 };
        }
        let percent = ((self.progress - start) * i64::from(PERCENT_CAP) / span)
            .clamp(0, i64::from(PERCENT_CAP));
        u32::try_from(percent).unwrap_or(PERCENT_CAP)
    }

    /// A fresh copy with zero progress.
    #[must_use]
    pub fn fresh_copy(&self) -> Self {
        Self {
            progress: 0,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn to_xml(&self, indentation: usize) -> String {
        format!(
            "{}<Achievement{}/>",
            xml::pad(indentation),
            xml::attributes(&[
                ("title", self.title.clone()),
                ("description", self.description.clone()),
                ("progress", self.progress.to_string()),
            ])
        )
    }
}

impl PartialEq for ProgressAchievement {
    fn eq(&self, other: &Self) -> bool {
        self.description == other.description && self.title == other.title
    }
}

impl Eq for ProgressAchievement {}

impl Hash for ProgressAchievement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.description.hash(state);
        self.title.hash(state);
    }
}

impl fmt::Debug for ProgressAchievement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressAchievement")
            .field("title", &self.title)
            .field("milestones", &self.milestones)
            .field("progress", &self.progress)
            .field("detector", &self.detector.to_string())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ProgressAchievement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}
