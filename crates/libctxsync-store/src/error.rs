//! Store error types

use libctxsync_core::CoreError;
use thiserror::Error;

use crate::lock::LockInfo;

/// Errors from the file lock
#[derive(Error, Debug)]
pub enum LockError {
    /// Acquisition exceeded its deadline
    #[error("timed out after {waited_ms}ms waiting for lock held by {}", holder_label(.holder))]
    Timeout {
        holder: Option<LockInfo>,
        waited_ms: u64,
    },

    /// Tried to release or refresh a lock held by someone else
    #[error("lock is held by {}", holder_label(.holder))]
    NotOwned { holder: Option<LockInfo> },

    /// Lock marker exists but cannot be decoded
    #[error("corrupt lock marker: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to place lock marker: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl LockError {
    /// Holder identity, when the error concerns one
    pub fn holder(&self) -> Option<&LockInfo> {
        match self {
            LockError::Timeout { holder, .. } | LockError::NotOwned { holder } => holder.as_ref(),
            _ => None,
        }
    }
}

pub(crate) fn holder_label(holder: &Option<LockInfo>) -> String {
    match holder {
        Some(info) => format!("agent '{}' (pid {})", info.agent_id, info.pid),
        None => "an unknown holder".to_string(),
    }
}

/// Errors from snapshot and context persistence
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No context has been created for this project yet
    #[error("no context found in {0}")]
    NoContext(String),

    #[error("snapshot '{0}' not found")]
    SnapshotNotFound(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Core(e) => e,
            StoreError::Lock(LockError::Timeout { holder: Some(h), .. })
            | StoreError::Lock(LockError::NotOwned { holder: Some(h) }) => {
                CoreError::lock_held(&h.agent_id, h.pid)
            }
            StoreError::Lock(e @ LockError::Timeout { .. }) | StoreError::Lock(e @ LockError::NotOwned { .. }) => {
                CoreError::Busy(e.to_string())
            }
            StoreError::Lock(LockError::Io(e)) | StoreError::Io(e) => CoreError::Io(e),
            StoreError::Lock(e) => CoreError::Internal(e.to_string()),
            StoreError::Json(e) => CoreError::Json(e),
            StoreError::NoContext(dir) => {
                CoreError::NotFound(format!("no context in {}", dir))
            }
            StoreError::SnapshotNotFound(id) => CoreError::snapshot_not_found(&id),
        }
    }
}
