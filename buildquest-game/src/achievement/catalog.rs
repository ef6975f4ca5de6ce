//! Static achievement catalogs loaded from JSON.

use serde::de::DeserializeOwned;

use super::{
    Achievement, AchievementError, BadgeAchievement, DetectorRegistry, ProgressAchievement,
};

const DEFAULT_ACHIEVEMENTS: &str = include_str!("../../assets/achievements.json");
const DEFAULT_BADGE_ACHIEVEMENTS: &str = include_str!("../../assets/badge_achievements.json");
const DEFAULT_PROGRESS_ACHIEVEMENTS: &str =
    include_str!("../../assets/progress_achievements.json");

/// Every achievement a new participant starts with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AchievementCatalog {
    pub achievements: Vec<Achievement>,
    pub badges: Vec<BadgeAchievement>,
    pub progress: Vec<ProgressAchievement>,
}

impl AchievementCatalog {
    /// Parse three JSON lists and resolve every entry against `registry`.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or on the first entry naming an unknown detector.
    pub fn from_json(
        achievements: &str,
        badges: &str,
        progress: &str,
        registry: &DetectorRegistry,
    ) -> Result<Self, AchievementError> {
        Ok(Self {
            achievements: parse_list(achievements, |entry: Achievement| {
                entry.rehydrate(registry)
            })?,
            badges: parse_list(badges, |entry: BadgeAchievement| entry.rehydrate(registry))?,
            progress: parse_list(progress, |entry: ProgressAchievement| {
                entry.rehydrate(registry)
            })?,
        })
    }

    /// The bundled catalog, resolved against `registry`.
    ///
    /// # Errors
    ///
    /// Fails if `registry` lacks one of the built-in detectors.
    pub fn load_default(registry: &DetectorRegistry) -> Result<Self, AchievementError> {
        Self::from_json(
            DEFAULT_ACHIEVEMENTS,
            DEFAULT_BADGE_ACHIEVEMENTS,
            DEFAULT_PROGRESS_ACHIEVEMENTS,
            registry,
        )
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.achievements.len() + self.badges.len() + self.progress.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_list<T, F>(json: &str, resolve: F) -> Result<Vec<T>, AchievementError>
where
    T: DeserializeOwned,
    F: Fn(T) -> Result<T, AchievementError>,
{
    let entries: Vec<T> = serde_json::from_str(json)?;
    entries.into_iter().map(resolve).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_catalog_resolves_against_builtin_detectors() {
        let catalog = AchievementCatalog::load_default(&DetectorRegistry::with_builtin())
            .expect("bundled catalog");
        assert!(!catalog.achievements.is_empty());
        assert!(!catalog.badges.is_empty());
        assert!(!catalog.progress.is_empty());
        assert!(catalog.achievements.iter().all(|a| a.solved_time() == 0));
    }

    #[test]
    fn bundled_catalog_fails_without_detectors() {
        let err = AchievementCatalog::load_default(&DetectorRegistry::new()).unwrap_err();
        assert!(matches!(err, AchievementError::UnknownDetector { .. }));
    }

    #[test]
    fn malformed_json_is_a_catalog_error() {
        let err = AchievementCatalog::from_json("[{", "[]", "[]", &DetectorRegistry::new())
            .unwrap_err();
        assert!(matches!(err, AchievementError::Catalog(_)));
    }

    #[test]
    fn malformed_reference_is_rejected_while_parsing() {
        let json = r#"[{
            "badge_path": "/x.png",
            "detector": "solveXChallenges",
            "description": "d",
            "title": "t"
        }]"#;
        let err = AchievementCatalog::from_json(json, "[]", "[]", &DetectorRegistry::new())
            .unwrap_err();
        assert!(err.to_string().contains("namespace::name"));
    }
}
