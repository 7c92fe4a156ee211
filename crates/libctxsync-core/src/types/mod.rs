pub mod context;
pub mod ids;
pub mod snapshot;

pub use context::{
    Approach, ApproachOutcome, Blocker, CodeChanges, ConversationSummary, CurrentWork, Decision,
    Handoff, NextStep, SharedContext, WorkStatus,
};
pub use ids::{ContextId, EntityId, SnapshotId};
pub use snapshot::{Snapshot, SnapshotReason, SnapshotSummary};
