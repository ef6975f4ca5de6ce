//! Achievements bound to named detectors.
//!
//! Three variants share one dispatch pattern: a serializable
//! [`DetectorReference`] plus a resolved handle that is never persisted. The
//! handle is bound at construction (unknown names fail there) and restored
//! after deserialization through an explicit `rehydrate` step.

pub mod badge;
pub mod catalog;
pub mod detector;
pub mod progress;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;

use crate::constants::{NOT_SOLVED_LABEL, SOLVED_TIME_FORMAT};
use crate::xml;

pub use badge::BadgeAchievement;
pub use catalog::AchievementCatalog;
pub use detector::{
    CheckFn, CountFn, DetectorArgs, DetectorError, DetectorKind, DetectorReference,
    DetectorRegistry, MeasureFn,
};
pub use progress::{ProgressAchievement, ProgressStep};

#[derive(Debug, Error)]
pub enum AchievementError {
    #[error("unknown detector {reference}")]
    UnknownDetector { reference: String },
    #[error("malformed detector reference {value:?}, expected namespace::name")]
    MalformedReference { value: String },
    #[error("detector {reference} returns {found:?} results, expected {expected:?}")]
    DetectorKindMismatch {
        reference: String,
        expected: DetectorKind,
        found: DetectorKind,
    },
    #[error("achievement {title:?} was evaluated before being rehydrated")]
    Unresolved { title: String },
    #[error(
        "achievement {title:?} has {bounds} tiers but {paths} badge paths and {titles} tier titles"
    )]
    InvalidTiers {
        title: String,
        bounds: usize,
        paths: usize,
        titles: usize,
    },
    #[error("achievement catalog is invalid: {0}")]
    Catalog(#[from] serde_json::Error),
    #[error(transparent)]
    Detector(#[from] DetectorError),
}

/// Human-readable solve time, e.g. `Achieved 5 Jan 2021 @ 03:04 pm`.
pub(crate) fn solved_time_label(solved_time: i64) -> String {
    if solved_time == 0 {
        return NOT_SOLVED_LABEL.to_string();
    }
    DateTime::from_timestamp_millis(solved_time).map_or_else(
        || NOT_SOLVED_LABEL.to_string(),
        |time| format!("Achieved {}", time.format(SOLVED_TIME_FORMAT)),
    )
}

/// A single-condition goal solved once its check detector returns true.
#[derive(Clone, Serialize, Deserialize)]
pub struct Achievement {
    badge_path: String,
    detector: DetectorReference,
    description: String,
    title: String,
    #[serde(default)]
    secret: bool,
    #[serde(default)]
    additional_parameters: BTreeMap<String, String>,
    #[serde(default)]
    solved_time: i64,
    #[serde(skip)]
    check: Option<Arc<CheckFn>>,
}

impl Achievement {
    /// # Errors
    ///
    /// Fails when `detector` is not registered as a check in `registry`.
    pub fn new(
        badge_path: impl Into<String>,
        detector: DetectorReference,
        description: impl Into<String>,
        title: impl Into<String>,
        secret: bool,
        additional_parameters: BTreeMap<String, String>,
        registry: &DetectorRegistry,
    ) -> Result<Self, AchievementError> {
        let check = registry.resolve_check(&detector)?;
        Ok(Self {
            badge_path: badge_path.into(),
            detector,
            description: description.into(),
            title: title.into(),
            secret,
            additional_parameters,
            solved_time: 0,
            check: Some(check),
        })
    }

    /// Re-bind the detector handle after deserialization.
    ///
    /// # Errors
    ///
    /// Fails when the stored reference is no longer registered as a check.
    pub fn rehydrate(mut self, registry: &DetectorRegistry) -> Result<Self, AchievementError> {
        self.check = Some(registry.resolve_check(&self.detector)?);
        Ok(self)
    }

    /// Run the detector; a true result stamps `solved_time` unless already set.
    ///
    /// # Errors
    ///
    /// Propagates detector failures and fails if the achievement was never resolved.
    pub fn is_solved(&mut self, args: &DetectorArgs<'_, '_>) -> Result<bool, AchievementError> {
        let check = self
            .check
            .as_ref()
            .ok_or_else(|| AchievementError::Unresolved {
                title: self.title.clone(),
            })?;
        let parameters = &self.additional_parameters;
        let solved = check(&DetectorArgs {
            parameters,
            ..*args
        })?;
        if solved && self.solved_time == 0 {
            self.solved_time = args.ctx.now;
        }
        Ok(solved)
    }

    #[must_use]
    pub fn badge_path(&self) -> &str {
        &self.badge_path
    }

    #[must_use]
    pub fn detector(&self) -> &DetectorReference {
        &self.detector
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub const fn is_secret(&self) -> bool {
        self.secret
    }

    #[must_use]
    pub fn additional_parameters(&self) -> &BTreeMap<String, String> {
        &self.additional_parameters
    }

    #[must_use]
    pub const fn solved_time(&self) -> i64 {
        self.solved_time
    }

    #[must_use]
    pub fn solved_time_label(&self) -> String {
        solved_time_label(self.solved_time)
    }

    /// A fresh, unsolved copy for a new user.
    #[must_use]
    pub fn unsolved_copy(&self) -> Self {
        Self {
            solved_time: 0,
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
                ("secret", self.secret.to_string()),
                ("solved", self.solved_time.to_string()),
            ])
        )
    }
}

impl PartialEq for Achievement {
    fn eq(&self, other: &Self) -> bool {
        self.badge_path == other.badge_path
            && self.description == other.description
            && self.title == other.title
    }
}

impl Eq for Achievement {}

impl Hash for Achievement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.badge_path.hash(state);
        self.description.hash(state);
        self.title.hash(state);
    }
}

impl fmt::Debug for Achievement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Achievement")
            .field("title", &self.title)
            .field("detector", &self.detector.to_string())
            .field("solved_time", &self.solved_time)
            .field("resolved", &self.check.is_some())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Achievement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}
