pub mod clock;
pub mod config;
pub mod diff;
pub mod error;
pub mod io;
pub mod types;

pub use clock::{ClockOrdering, VectorClock};
pub use config::{load_config, save_config, SyncConfig, STATE_DIR};
pub use diff::{
    compare, conflicts_to_markdown, merge, to_markdown, DiffResult, ListStrategy, MergeOptions,
    MergeResult, ScalarStrategy,
};
pub use error::CoreError;
pub use types::{
    Approach, ApproachOutcome, Blocker, Decision, Handoff, NextStep, SharedContext, Snapshot,
    SnapshotReason, SnapshotSummary, WorkStatus,
};
