//! Notifications emitted while goals are generated, progressed and solved.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    BuildStarted {
        build: u32,
    },
    /// `quest` is `None` when nothing could be generated.
    QuestGenerated {
        quest: Option<String>,
    },
    QuestStepSolved {
        quest: String,
        step: String,
    },
    QuestSolved {
        quest: String,
        score: u32,
    },
    QuestUnsolvable {
        quest: String,
    },
    QuestTaskGenerated {
        task: String,
    },
    QuestTaskProgress {
        task: String,
        current: i64,
        goal: u32,
    },
    QuestTaskSolved {
        task: String,
        score: u32,
    },
    AchievementSolved {
        title: String,
    },
    BadgeEarned {
        title: String,
        tier: usize,
    },
    ProgressMade {
        title: String,
        progress: i64,
        milestone: Option<i64>,
    },
}

/// An event together with where and when it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub project: String,
    pub branch: String,
    pub user: String,
    pub entry_time: i64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(
        project: impl Into<String>,
        branch: impl Into<String>,
        user: impl Into<String>,
        entry_time: i64,
        kind: EventKind,
    ) -> Self {
        Self {
            project: project.into(),
            branch: branch.into(),
            user: user.into(),
            entry_time,
            kind,
        }
    }
}

/// Receives events. Delivery is fire-and-forget: implementations must not
/// block the caller and the engine never retries.
pub trait EventSink {
    fn add_event(&self, event: Event);
}

/// In-process sink that keeps every event until the next build of the same
/// project and branch starts.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop events left over from earlier builds of `project`/`branch`.
    pub fn clear_stale(&self, project: &str, branch: &str) {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.retain(|event| event.project != project || event.branch != branch);
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for EventLog {
    fn add_event(&self, event: Event) {
        if let EventKind::BuildStarted { .. } = event.kind {
            self.clear_stale(&event.project, &event.branch);
        }
        log::debug!(
            "event for {} on {}/{}: {:?}",
            event.user,
            event.project,
            event.branch,
            event.kind
        );
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn add_event(&self, _event: Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(project: &str, branch: &str) -> Event {
        Event::new(
            project,
            branch,
            "alice",
            1,
            EventKind::QuestGenerated { quest: None },
        )
    }

    #[test]
    fn build_start_sweeps_only_matching_branch() {
        let log = EventLog::new();
        log.add_event(generated("demo", "main"));
        log.add_event(generated("demo", "feature"));
        log.add_event(generated("other", "main"));
        log.add_event(Event::new(
            "demo",
            "main",
            "alice",
            2,
            EventKind::BuildStarted { build: 7 },
        ));

        let remaining = log.events();
        assert_eq!(remaining.len(), 3);
        assert!(
            remaining
                .iter()
                .all(|event| !matches!(event.kind, EventKind::QuestGenerated { .. })
                    || event.project != "demo"
                    || event.branch != "main")
        );
    }

    #[test]
    fn events_serialize_with_a_type_tag() {
        let event = Event::new(
            "demo",
            "main",
            "alice",
            5,
            EventKind::QuestSolved {
                quest: "Lines".to_string(),
                score: 9,
            },
        );
        let json = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(json["type"], "quest_solved");
        assert_eq!(json["score"], 9);
        let back: Event = serde_json::from_value(json).expect("parse event");
        assert_eq!(back, event);
    }
}
