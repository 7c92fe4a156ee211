//! Sync pipeline error types

use libctxsync_core::CoreError;
use libctxsync_store::StoreError;
use thiserror::Error;

use crate::event::TriggerKind;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The queue was cleared before this event was processed
    #[error("sync queue cleared before the event was processed")]
    QueueCleared,

    /// The consumer went away without answering
    #[error("sync queue closed")]
    QueueClosed,

    #[error("{trigger} sync failed: {message}")]
    ItemFailed { trigger: TriggerKind, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("sync engine is already running")]
    AlreadyRunning,
}

impl From<SyncError> for CoreError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Store(e) => e.into(),
            SyncError::AlreadyRunning => CoreError::Busy(err.to_string()),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_core_error() {
        let err: CoreError = SyncError::Store(StoreError::NoContext(".ctxsync".into())).into();
        assert_eq!(err.error_code(), "not_found");

        let err: CoreError = SyncError::QueueCleared.into();
        assert_eq!(err.error_code(), "internal_error");

        let err: CoreError = SyncError::AlreadyRunning.into();
        assert_eq!(err.exit_code(), 5);
    }
}
