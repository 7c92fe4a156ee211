use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::SharedContext;
use super::ids::{generate_id, ContextId, SnapshotId};

/// Why a snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotReason {
    /// Taken by the sync engine on a trigger event
    #[default]
    Auto,
    /// Explicitly requested
    Manual,
    /// Taken when work moves from one agent to another
    Handoff,
    /// Marks a notable point in the task
    Milestone,
}

impl SnapshotReason {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(SnapshotReason::Auto),
            "manual" => Some(SnapshotReason::Manual),
            "handoff" => Some(SnapshotReason::Handoff),
            "milestone" => Some(SnapshotReason::Milestone),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotReason::Auto => "auto",
            SnapshotReason::Manual => "manual",
            SnapshotReason::Handoff => "handoff",
            SnapshotReason::Milestone => "milestone",
        }
    }
}

/// Immutable point-in-time copy of a shared context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub context_id: ContextId,
    pub reason: SnapshotReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub data: SharedContext,
}

impl Snapshot {
    /// Capture `context` as it is now
    pub fn capture(context: &SharedContext, reason: SnapshotReason, label: Option<String>) -> Self {
        Self {
            id: generate_id(),
            context_id: context.id.clone(),
            reason,
            label,
            created_at: Utc::now(),
            data: context.clone(),
        }
    }

    /// Lightweight listing entry
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            id: self.id.clone(),
            reason: self.reason,
            label: self.label.clone(),
            created_at: self.created_at,
            version: self.data.version,
            goal: self.data.current_work.goal.clone(),
        }
    }
}

/// Snapshot metadata without the context payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub reason: SnapshotReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
    pub goal: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_is_independent_copy() {
        let mut ctx = SharedContext::new("/repo", "A");
        let snap = Snapshot::capture(&ctx, SnapshotReason::Manual, Some("before refactor".into()));
        ctx.current_work.goal = "B".into();
        assert_eq!(snap.data.current_work.goal, "A");
        assert_eq!(snap.context_id, ctx.id);
        assert_eq!(snap.summary().goal, "A");
    }

    #[test]
    fn test_reason_parse() {
        assert_eq!(SnapshotReason::from_str("Milestone"), Some(SnapshotReason::Milestone));
        assert_eq!(SnapshotReason::from_str("bogus"), None);
        assert_eq!(
            serde_json::to_string(&SnapshotReason::Handoff).unwrap(),
            "\"handoff\""
        );
    }
}
