//! Structural diff and merge of shared context snapshots
//!
//! Identity-bearing lists (decisions, approaches, blockers) are matched by
//! entity id. Order-significant value lists (next steps, hand-offs,
//! modified files) are matched by value. Scalar fields are compared
//! directly and reported under dotted metadata paths.
//!
//! Diff and merge results are derived data and are never persisted.

mod compare;
mod markdown;
mod merge;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::ClockOrdering;
use crate::error::CoreError;
use crate::types::{Approach, Blocker, Decision, SharedContext};

pub use compare::compare;
pub use markdown::{conflicts_to_markdown, to_markdown};
pub use merge::merge;

/// Change bucket of a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Metadata,
    Decisions,
    Approaches,
    Blockers,
    NextSteps,
    Handoffs,
    ModifiedFiles,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Metadata,
        Category::Decisions,
        Category::Approaches,
        Category::Blockers,
        Category::NextSteps,
        Category::Handoffs,
        Category::ModifiedFiles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Metadata => "metadata",
            Category::Decisions => "decisions",
            Category::Approaches => "approaches",
            Category::Blockers => "blockers",
            Category::NextSteps => "next_steps",
            Category::Handoffs => "handoffs",
            Category::ModifiedFiles => "modified_files",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Category::Metadata => "Metadata",
            Category::Decisions => "Decisions",
            Category::Approaches => "Approaches",
            Category::Blockers => "Blockers",
            Category::NextSteps => "Next steps",
            Category::Handoffs => "Hand-offs",
            Category::ModifiedFiles => "Modified files",
        }
    }

    /// Path prefix of this category inside a SharedContext
    pub fn path(&self) -> &'static str {
        match self {
            Category::Metadata => "",
            Category::Decisions => "conversation.decisions",
            Category::Approaches => "conversation.approaches",
            Category::Blockers => "conversation.blockers",
            Category::NextSteps => "conversation.next_steps",
            Category::Handoffs => "handoffs",
            Category::ModifiedFiles => "code_changes.modified_files",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// Field-level difference inside a modified entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Value,
    pub new: Value,
}

/// One change record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    /// Entity id, matched value, or dotted metadata path
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldChange>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub total: usize,
}

/// Result of comparing a source context against a target context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub source_version: u64,
    pub target_version: u64,
    /// How the source clock relates to the target clock
    pub causality: ClockOrdering,
    pub metadata: Vec<Change>,
    pub decisions: Vec<Change>,
    pub approaches: Vec<Change>,
    pub blockers: Vec<Change>,
    pub next_steps: Vec<Change>,
    pub handoffs: Vec<Change>,
    pub modified_files: Vec<Change>,
    pub summary: DiffSummary,
}

impl DiffResult {
    pub fn changes(&self, category: Category) -> &[Change] {
        match category {
            Category::Metadata => &self.metadata,
            Category::Decisions => &self.decisions,
            Category::Approaches => &self.approaches,
            Category::Blockers => &self.blockers,
            Category::NextSteps => &self.next_steps,
            Category::Handoffs => &self.handoffs,
            Category::ModifiedFiles => &self.modified_files,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summary.total == 0
    }
}

/// How to combine a list category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListStrategy {
    /// Keep every distinct entry; differing id-matched entries conflict
    #[default]
    Union,
    /// Keep every distinct entry; collisions take the source side
    SourceWins,
    /// Keep every distinct entry; collisions take the target side
    TargetWins,
}

impl ListStrategy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "union" => Some(ListStrategy::Union),
            "source_wins" | "source" => Some(ListStrategy::SourceWins),
            "target_wins" | "target" => Some(ListStrategy::TargetWins),
            _ => None,
        }
    }
}

/// How to combine scalar fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarStrategy {
    #[default]
    TargetWins,
    SourceWins,
    /// Take the side with the later `updated_at` (target on ties)
    Newest,
}

impl ScalarStrategy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "target_wins" | "target" => Some(ScalarStrategy::TargetWins),
            "source_wins" | "source" => Some(ScalarStrategy::SourceWins),
            "newest" => Some(ScalarStrategy::Newest),
            _ => None,
        }
    }
}

/// Per-category merge strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    pub decisions: ListStrategy,
    pub approaches: ListStrategy,
    pub blockers: ListStrategy,
    pub next_steps: ListStrategy,
    pub handoffs: ListStrategy,
    pub modified_files: ListStrategy,
    pub metadata: ScalarStrategy,
    /// Let a strictly newer clock supersede the other side's entity
    /// instead of reporting a conflict
    pub causal: bool,
    /// Agent performing the merge; its clock entry is advanced
    pub merging_agent: Option<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            decisions: ListStrategy::Union,
            approaches: ListStrategy::Union,
            blockers: ListStrategy::Union,
            next_steps: ListStrategy::Union,
            handoffs: ListStrategy::Union,
            modified_files: ListStrategy::Union,
            metadata: ScalarStrategy::TargetWins,
            causal: true,
            merging_agent: None,
        }
    }
}

impl MergeOptions {
    /// Use one strategy for every list category
    pub fn with_lists(mut self, strategy: ListStrategy) -> Self {
        self.decisions = strategy;
        self.approaches = strategy;
        self.blockers = strategy;
        self.next_steps = strategy;
        self.handoffs = strategy;
        self.modified_files = strategy;
        self
    }

    pub fn with_scalars(mut self, strategy: ScalarStrategy) -> Self {
        self.metadata = strategy;
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.merging_agent = Some(agent.into());
        self
    }

    pub fn without_causality(mut self) -> Self {
        self.causal = false;
        self
    }

    pub fn list_strategy(&self, category: Category) -> ListStrategy {
        match category {
            Category::Decisions => self.decisions,
            Category::Approaches => self.approaches,
            Category::Blockers => self.blockers,
            Category::NextSteps => self.next_steps,
            Category::Handoffs => self.handoffs,
            Category::ModifiedFiles => self.modified_files,
            Category::Metadata => ListStrategy::Union,
        }
    }
}

/// Two id-matched entities that differ and could not be reconciled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub category: Category,
    pub key: String,
    /// Dotted path of the entity (e.g. `conversation.decisions[<id>]`)
    pub path: String,
    pub source: Value,
    pub target: Value,
    pub fields: Vec<FieldChange>,
}

/// Outcome of a merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    pub success: bool,
    pub merged: Option<SharedContext>,
    pub conflicts: Vec<Conflict>,
    pub causality: ClockOrdering,
}

impl MergeResult {
    /// Turn the result into the merged context, or a MergeConflict error
    pub fn into_context(self) -> Result<SharedContext, CoreError> {
        match self.merged {
            Some(ctx) if self.success => Ok(ctx),
            _ => Err(CoreError::MergeConflict {
                conflicts: self.conflicts,
            }),
        }
    }
}

/// Entities matched by id during diff and merge
pub(crate) trait Identified: Serialize + Clone + PartialEq {
    fn entity_id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
}

impl Identified for Decision {
    fn entity_id(&self) -> &str {
        &self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Identified for Approach {
    fn entity_id(&self) -> &str {
        &self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Identified for Blocker {
    fn entity_id(&self) -> &str {
        &self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Field-level differences between two serialized entities
pub(crate) fn field_changes(old: &Value, new: &Value) -> Vec<FieldChange> {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let mut fields: Vec<&String> = a.keys().chain(b.keys()).collect();
            fields.sort();
            fields.dedup();
            fields
                .into_iter()
                .filter(|f| f.as_str() != "id")
                .filter_map(|f| {
                    let o = a.get(f).cloned().unwrap_or(Value::Null);
                    let n = b.get(f).cloned().unwrap_or(Value::Null);
                    (o != n).then(|| FieldChange {
                        field: f.clone(),
                        old: o,
                        new: n,
                    })
                })
                .collect()
        }
        _ if old != new => vec![FieldChange {
            field: String::new(),
            old: old.clone(),
            new: new.clone(),
        }],
        _ => Vec::new(),
    }
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
