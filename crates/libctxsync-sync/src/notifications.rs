//! Lifecycle notifications
//!
//! Published on `tokio::sync::broadcast` channels. A lagging subscriber
//! misses notifications; it never slows the pipeline down.

use serde::Serialize;

use crate::event::{SyncEvent, TriggerKind};

/// Emitted by the sync queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueNotification {
    Enqueued { trigger: TriggerKind, depth: usize },
    ProcessingStarted { trigger: TriggerKind },
    Processed { trigger: TriggerKind },
    Error { trigger: TriggerKind, message: String },
    /// The consumer drained the queue and went idle
    ProcessingCompleted { processed: usize },
}

impl QueueNotification {
    pub fn notification_type(&self) -> &'static str {
        match self {
            QueueNotification::Enqueued { .. } => "enqueued",
            QueueNotification::ProcessingStarted { .. } => "processing_started",
            QueueNotification::Processed { .. } => "processed",
            QueueNotification::Error { .. } => "error",
            QueueNotification::ProcessingCompleted { .. } => "processing_completed",
        }
    }
}

/// Emitted by the sync engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineNotification {
    Started,
    Stopped,
    Sync { event: SyncEvent },
    Error { source: String, message: String },
}

impl EngineNotification {
    pub fn notification_type(&self) -> &'static str {
        match self {
            EngineNotification::Started => "started",
            EngineNotification::Stopped => "stopped",
            EngineNotification::Sync { .. } => "sync",
            EngineNotification::Error { .. } => "error",
        }
    }
}
