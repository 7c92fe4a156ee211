use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::VectorClock;
use super::ids::{generate_id, ContextId, EntityId};

/// Lifecycle of the task described by a shared context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    #[default]
    Planning,
    InProgress,
    Blocked,
    Reviewing,
    Completed,
}

impl WorkStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "planning" => Some(WorkStatus::Planning),
            "in_progress" => Some(WorkStatus::InProgress),
            "blocked" => Some(WorkStatus::Blocked),
            "reviewing" => Some(WorkStatus::Reviewing),
            "completed" => Some(WorkStatus::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Planning => "planning",
            WorkStatus::InProgress => "in_progress",
            WorkStatus::Blocked => "blocked",
            WorkStatus::Reviewing => "reviewing",
            WorkStatus::Completed => "completed",
        }
    }
}

/// What the agents are currently working on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWork {
    pub goal: String,
    pub status: WorkStatus,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(default)]
    pub active_files: Vec<String>,
}

/// A decision taken during the task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: EntityId,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(description: impl Into<String>, rationale: Option<String>, agent: Option<String>) -> Self {
        Self {
            id: generate_id(),
            description: description.into(),
            rationale,
            agent,
            created_at: Utc::now(),
        }
    }
}

/// Result of trying an approach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproachOutcome {
    #[default]
    Tried,
    Succeeded,
    Failed,
    Abandoned,
}

impl ApproachOutcome {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tried" => Some(ApproachOutcome::Tried),
            "succeeded" => Some(ApproachOutcome::Succeeded),
            "failed" => Some(ApproachOutcome::Failed),
            "abandoned" => Some(ApproachOutcome::Abandoned),
            _ => None,
        }
    }
}

/// An approach that was attempted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approach {
    pub id: EntityId,
    pub description: String,
    pub outcome: ApproachOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Approach {
    pub fn new(description: impl Into<String>, outcome: ApproachOutcome, notes: Option<String>) -> Self {
        Self {
            id: generate_id(),
            description: description.into(),
            outcome,
            notes,
            created_at: Utc::now(),
        }
    }
}

/// Something standing in the way of progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blocker {
    pub id: EntityId,
    pub description: String,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Blocker {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            description: description.into(),
            resolved: false,
            resolution: None,
            created_at: Utc::now(),
        }
    }
}

/// A planned follow-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextStep {
    pub id: EntityId,
    pub description: String,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

impl NextStep {
    pub fn new(description: impl Into<String>, priority: u8) -> Self {
        Self {
            id: generate_id(),
            description: description.into(),
            priority,
            done: false,
            created_at: Utc::now(),
        }
    }
}

/// Ordered record of what was discussed and decided
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub approaches: Vec<Approach>,
    #[serde(default)]
    pub blockers: Vec<Blocker>,
    #[serde(default)]
    pub next_steps: Vec<NextStep>,
}

/// Summary of working-tree changes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeChanges {
    #[serde(default)]
    pub modified_files: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub uncommitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One link in the agent hand-off chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handoff {
    pub from_agent: String,
    pub to_agent: String,
    pub summary: String,
    pub at: DateTime<Utc>,
}

/// The single mutable work-context document shared by all agents of a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedContext {
    pub id: ContextId,
    pub project_path: String,
    pub current_work: CurrentWork,
    #[serde(default)]
    pub conversation: ConversationSummary,
    #[serde(default)]
    pub code_changes: CodeChanges,
    #[serde(default)]
    pub handoffs: Vec<Handoff>,
    /// Monotonic revision counter
    pub version: u64,
    /// Per-agent causal history of this revision
    #[serde(default)]
    pub clock: VectorClock,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SharedContext {
    /// Create a fresh context for a task
    pub fn new(project_path: impl Into<String>, goal: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            project_path: project_path.into(),
            current_work: CurrentWork {
                goal: goal.into(),
                status: WorkStatus::Planning,
                started_at: now,
                last_activity_at: now,
                active_files: Vec::new(),
            },
            conversation: ConversationSummary::default(),
            code_changes: CodeChanges::default(),
            handoffs: Vec::new(),
            version: 1,
            clock: VectorClock::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record one revision made by `agent`: bumps version, clock and timestamps
    pub fn touch(&mut self, agent: &str) {
        let now = Utc::now();
        self.version += 1;
        self.clock = self.clock.increment(agent);
        self.updated_at = now;
        self.current_work.last_activity_at = now;
    }

    pub fn find_decision(&self, id: &str) -> Option<&Decision> {
        self.conversation.decisions.iter().find(|d| d.id == id)
    }

    pub fn find_blocker_mut(&mut self, id: &str) -> Option<&mut Blocker> {
        self.conversation.blockers.iter_mut().find(|b| b.id == id)
    }

    /// Blockers that are still open
    pub fn open_blockers(&self) -> impl Iterator<Item = &Blocker> {
        self.conversation.blockers.iter().filter(|b| !b.resolved)
    }

    /// Agent that most recently received the work, if any
    pub fn current_owner(&self) -> Option<&str> {
        self.handoffs.last().map(|h| h.to_agent.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context() {
        let ctx = SharedContext::new("/repo", "Ship the feature");
        assert_eq!(ctx.version, 1);
        assert_eq!(ctx.current_work.goal, "Ship the feature");
        assert_eq!(ctx.current_work.status, WorkStatus::Planning);
        assert!(ctx.clock.is_empty());
        assert!(ctx.current_owner().is_none());
    }

    #[test]
    fn test_touch_advances_version_and_clock() {
        let mut ctx = SharedContext::new("/repo", "goal");
        ctx.touch("claude");
        ctx.touch("claude");
        ctx.touch("cursor");
        assert_eq!(ctx.version, 4);
        assert_eq!(ctx.clock.get("claude"), 2);
        assert_eq!(ctx.clock.get("cursor"), 1);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(WorkStatus::from_str("in-progress"), Some(WorkStatus::InProgress));
        assert_eq!(WorkStatus::from_str("BLOCKED"), Some(WorkStatus::Blocked));
        assert_eq!(WorkStatus::from_str("nope"), None);
        assert_eq!(WorkStatus::Reviewing.as_str(), "reviewing");
    }

    #[test]
    fn test_context_json_shape() {
        let mut ctx = SharedContext::new("/repo", "goal");
        ctx.touch("a");
        ctx.conversation.decisions.push(Decision::new("use sqlite", None, Some("a".into())));
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["clock"], "a:1");
        assert_eq!(json["current_work"]["status"], "planning");
        let back: SharedContext = serde_json::from_value(json).unwrap();
        assert_eq!(back, ctx);
    }

    #[test]
    fn test_open_blockers() {
        let mut ctx = SharedContext::new("/repo", "goal");
        let b1 = Blocker::new("flaky CI");
        let b2 = Blocker::new("missing creds");
        let id = b1.id.clone();
        ctx.conversation.blockers.push(b1);
        ctx.conversation.blockers.push(b2);
        ctx.find_blocker_mut(&id).unwrap().resolved = true;
        assert_eq!(ctx.open_blockers().count(), 1);
    }
}
