//! Automatic context sync for ctxsync
//!
//! Watchers ([`watchers`]) observe editor focus, file saves, idle time and
//! git commits. Their events flow through a single-consumer [`SyncQueue`]
//! so that at most one snapshot is being written at any time. The
//! [`SyncEngine`] wires watchers, queue and store together.

pub mod engine;
pub mod error;
pub mod event;
pub mod notifications;
pub mod queue;
pub mod watchers;

pub use engine::{SnapshotProcessor, SyncEngine};
pub use error::SyncError;
pub use event::{EventDetails, SyncEvent, TriggerKind};
pub use notifications::{EngineNotification, QueueNotification};
pub use queue::{QueueStatus, SyncProcessor, SyncQueue};
