use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::{AchievementError, DetectorArgs, DetectorReference, DetectorRegistry, MeasureFn};
use crate::xml;

/// Tiered achievement: each evaluation may earn one badge of the highest tier
/// whose lower bound the measured value strictly exceeds.
#[derive(Clone, Serialize, Deserialize)]
pub struct BadgeAchievement {
    badge_paths: Vec<String>,
    /// Ascending thresholds, one per tier.
    lower_bounds: Vec<u32>,
    detector: DetectorReference,
    description: String,
    title: String,
    #[serde(default)]
    badge_counts: Vec<u32>,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    titles: Vec<String>,
    #[serde(default)]
    additional_parameters: BTreeMap<String, String>,
    #[serde(skip)]
    measure: Option<Arc<MeasureFn>>,
}

impl BadgeAchievement {
    /// # Errors
    ///
    /// Fails when the detector is not a registered measure or when the tier
    /// lists disagree in length.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        badge_paths: Vec<String>,
        lower_bounds: Vec<u32>,
        detector: DetectorReference,
        description: impl Into<String>,
        title: impl Into<String>,
        unit: impl Into<String>,
        titles: Vec<String>,
        registry: &DetectorRegistry,
    ) -> Result<Self, AchievementError> {
        let badge = Self {
            badge_counts: vec![0; lower_bounds.len()],
            badge_paths,
            lower_bounds,
            detector,
            description: description.into(),
            title: title.into(),
            unit: unit.into(),
            titles,
            additional_parameters: BTreeMap::new(),
            measure: None,
        };
        badge.rehydrate(registry)
    }

    #[must_use]
    pub fn with_parameters(mut self, additional_parameters: BTreeMap<String, String>) -> Self {
        self.additional_parameters = additional_parameters;
        self
    }

    /// Validate tiers, size missing counters and re-bind the detector.
    ///
    /// # Errors
    ///
    /// Fails on an unknown detector or mismatched tier lists.
    pub fn rehydrate(mut self, registry: &DetectorRegistry) -> Result<Self, AchievementError> {
        let bounds = self.lower_bounds.len();
        let titles_ok = self.titles.is_empty() || self.titles.len() == bounds;
        if self.badge_paths.len() != bounds || !titles_ok {
            return Err(AchievementError::InvalidTiers {
                title: self.title.clone(),
                bounds,
                paths: self.badge_paths.len(),
                titles: self.titles.len(),
            });
        }
        self.badge_counts.resize(bounds, 0);
        self.measure = Some(registry.resolve_measure(&self.detector)?);
        Ok(self)
    }

    /// Measure once and award at most one badge.
    ///
    /// Returns the tier index that was incremented, if any.
    ///
    /// # Errors
    ///
    /// Propagates detector failures and fails if the badge was never resolved.
    pub fn update(
        &mut self,
        args: &DetectorArgs<'_, '_>,
    ) -> Result<Option<usize>, AchievementError> {
        let measure = self
            .measure
            .as_ref()
            .ok_or_else(|| AchievementError::Unresolved {
                title: self.title.clone(),
            })?;
        let parameters = &self.additional_parameters;
        let result = measure(&DetectorArgs {
            parameters,
            ..*args
        })?;
        let tier = self
            .lower_bounds
            .iter()
            .rposition(|bound| result > f64::from(*bound));
        if let Some(tier) = tier {
            self.badge_counts[tier] += 1;
        }
        Ok(tier)
    }

    #[must_use]
    pub fn badge_counts(&self) -> &[u32] {
        &self.badge_counts
    }

    #[must_use]
    pub fn lower_bounds(&self) -> &[u32] {
        &self.lower_bounds
    }

    #[must_use]
    pub fn badge_paths(&self) -> &[String] {
        &self.badge_paths
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

    /// Display title of a tier, falling back to the achievement title.
    #[must_use]
    pub fn tier_title(&self, tier: usize) -> &str {
        self.titles.get(tier).map_or(&self.title, String::as_str)
    }

    #[must_use]
    pub fn total_badges(&self) -> u32 {
        self.badge_counts.iter().sum()
    }

    /// A fresh copy with every counter at zero.
    #[must_use]
    pub fn unearned_copy(&self) -> Self {
        Self {
            badge_counts: vec![0; self.lower_bounds.len()],
            ..self.clone()
        }
    }

    #[must_use]
    pub fn to_xml(&self, indentation: usize) -> String {
        let counts = self
            .badge_counts
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{}<Achievement{}/>",
            xml::pad(indentation),
            xml::attributes(&[
                ("title", self.title.clone()),
                ("description", self.description.clone()),
                ("badgeCounts", format!("[{counts}]")),
            ])
        )
    }
}

impl PartialEq for BadgeAchievement {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title && self.description == other.description
    }
}

impl Eq for BadgeAchievement {}

impl Hash for BadgeAchievement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.title.hash(state);
        self.description.hash(state);
    }
}

impl fmt::Debug for BadgeAchievement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BadgeAchievement")
            .field("title", &self.title)
            .field("lower_bounds", &self.lower_bounds)
            .field("badge_counts", &self.badge_counts)
            .field("detector", &self.detector.to_string())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for BadgeAchievement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}
