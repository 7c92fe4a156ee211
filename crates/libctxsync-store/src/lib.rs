//! On-disk state for ctxsync
//!
//! Everything lives under `<project>/.ctxsync/`:
//! - `context.json`: the current shared context
//! - `context.lock`: advisory lock marker (see [`FileLock`])
//! - `snapshots/<id>.json`: immutable snapshots
//!
//! Every read-modify-write of `context.json` runs inside
//! [`FileLock::with_lock`]; every file is written via temp file + rename.

pub mod error;
pub mod lock;
pub mod snapshot;
pub mod store;

pub use error::{LockError, StoreError};
pub use lock::{FileLock, LockAttempt, LockInfo, LockStatus};
pub use snapshot::{GcStats, SnapshotStore};
pub use store::{ContextPersistence, FileContextStore};
