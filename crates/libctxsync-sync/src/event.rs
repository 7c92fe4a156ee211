use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What caused a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    EditorSwitch,
    FileSave,
    Idle,
    GitCommit,
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::EditorSwitch => "editor_switch",
            TriggerKind::FileSave => "file_save",
            TriggerKind::Idle => "idle",
            TriggerKind::GitCommit => "git_commit",
            TriggerKind::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trigger-specific payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventDetails {
    EditorSwitch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        to: String,
    },
    FileSave {
        files: Vec<String>,
    },
    Idle {
        idle_ms: u64,
    },
    GitCommit {
        hash: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous: Option<String>,
    },
    Manual {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl EventDetails {
    pub fn trigger(&self) -> TriggerKind {
        match self {
            EventDetails::EditorSwitch { .. } => TriggerKind::EditorSwitch,
            EventDetails::FileSave { .. } => TriggerKind::FileSave,
            EventDetails::Idle { .. } => TriggerKind::Idle,
            EventDetails::GitCommit { .. } => TriggerKind::GitCommit,
            EventDetails::Manual { .. } => TriggerKind::Manual,
        }
    }
}

/// One synchronization request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub trigger: TriggerKind,
    pub at: DateTime<Utc>,
    pub details: EventDetails,
}

impl SyncEvent {
    pub fn new(details: EventDetails) -> Self {
        Self {
            trigger: details.trigger(),
            at: Utc::now(),
            details,
        }
    }

    pub fn manual(reason: Option<String>) -> Self {
        Self::new(EventDetails::Manual { reason })
    }

    pub fn file_save(files: Vec<String>) -> Self {
        Self::new(EventDetails::FileSave { files })
    }

    pub fn editor_switch(from: Option<String>, to: impl Into<String>) -> Self {
        Self::new(EventDetails::EditorSwitch { from, to: to.into() })
    }

    pub fn idle(idle_ms: u64) -> Self {
        Self::new(EventDetails::Idle { idle_ms })
    }

    pub fn git_commit(hash: impl Into<String>, previous: Option<String>) -> Self {
        Self::new(EventDetails::GitCommit {
            hash: hash.into(),
            previous,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_follows_details() {
        assert_eq!(SyncEvent::manual(None).trigger, TriggerKind::Manual);
        assert_eq!(SyncEvent::file_save(vec!["a.rs".into()]).trigger, TriggerKind::FileSave);
        assert_eq!(SyncEvent::git_commit("abc", None).trigger, TriggerKind::GitCommit);
        assert_eq!(TriggerKind::EditorSwitch.to_string(), "editor_switch");
    }

    #[test]
    fn test_event_json_shape() {
        let event = SyncEvent::file_save(vec!["src/lib.rs".into()]);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["trigger"], "file_save");
        assert_eq!(json["details"]["type"], "file_save");
        assert_eq!(json["details"]["files"][0], "src/lib.rs");
    }
}
