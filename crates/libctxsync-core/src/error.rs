use thiserror::Error;

use crate::diff::Conflict;

/// Main error type for ctxsync operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid vector clock: {0}")]
    InvalidClock(String),

    #[error("merge conflict: {} entities differ on both sides", .conflicts.len())]
    MergeConflict { conflicts: Vec<Conflict> },

    #[error("context busy: {0}")]
    Busy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("ID parse error: {0}")]
    IdParse(#[from] crate::types::ids::IdParseError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Get the error code for JSON output
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidArgs(_) => "invalid_args",
            CoreError::NotFound(_) => "not_found",
            CoreError::InvalidClock(_) => "invalid_clock",
            CoreError::MergeConflict { .. } => "conflict",
            CoreError::Busy(_) => "busy",
            CoreError::Io(_) => "io_error",
            CoreError::Json(_) => "internal_error",
            CoreError::TomlParse(_) => "invalid_args",
            CoreError::TomlSerialize(_) => "internal_error",
            CoreError::IdParse(_) => "invalid_args",
            CoreError::Internal(_) => "internal_error",
        }
    }

    /// Get the exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::InvalidArgs(_) => 2,
            CoreError::InvalidClock(_) => 2,
            CoreError::TomlParse(_) => 2,
            CoreError::IdParse(_) => 2,
            CoreError::NotFound(_) => 3,
            CoreError::MergeConflict { .. } => 4,
            CoreError::Busy(_) => 5,
            CoreError::Io(_) => 5,
            _ => 1,
        }
    }

    /// Get actionable suggestions for fixing the error
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            CoreError::NotFound(msg) => {
                if msg.contains("snapshot") {
                    vec!["Run 'ctxsync snapshot list' to see available snapshots"]
                } else if msg.contains("context") {
                    vec!["Run 'ctxsync init' to create a work context"]
                } else {
                    vec![]
                }
            }
            CoreError::Busy(_) => vec![
                "Wait for the other agent to finish and retry",
                "Run 'ctxsync lock status' to see who holds the lock",
                "Or run 'ctxsync lock release --force' if the holder crashed",
            ],
            CoreError::MergeConflict { .. } => vec![
                "Run 'ctxsync diff' to inspect both sides",
                "Re-run the merge with '--lists source-wins' or '--lists target-wins' to pick a side",
            ],
            CoreError::IdParse(_) => vec![
                "Use 'ctxsync snapshot list' to see valid snapshot ids",
            ],
            CoreError::InvalidClock(_) => vec![
                "Clocks are written as comma-separated agent:count pairs (e.g. 'a:1,b:2')",
            ],
            _ => vec![],
        }
    }

    /// Structured data attached to the error in JSON output
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            CoreError::MergeConflict { conflicts } => {
                Some(serde_json::json!({ "conflicts": conflicts }))
            }
            _ => None,
        }
    }

    /// Create a NotFound error for a snapshot id
    pub fn snapshot_not_found(id: &str) -> Self {
        CoreError::NotFound(format!("snapshot '{}' not found", id))
    }

    /// Create a Busy error naming the current lock holder
    pub fn lock_held(agent_id: &str, pid: u32) -> Self {
        CoreError::Busy(format!(
            "context is locked by agent '{}' (pid {})",
            agent_id, pid
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CoreError::InvalidArgs("x".into()).error_code(), "invalid_args");
        assert_eq!(CoreError::MergeConflict { conflicts: vec![] }.error_code(), "conflict");
        assert_eq!(CoreError::InvalidClock("a:-1".into()).exit_code(), 2);
        assert_eq!(CoreError::MergeConflict { conflicts: vec![] }.exit_code(), 4);
        assert_eq!(CoreError::Internal("boom".into()).exit_code(), 1);
    }

    #[test]
    fn test_suggestions() {
        assert!(!CoreError::lock_held("claude", 42).suggestions().is_empty());
        assert!(!CoreError::snapshot_not_found("abc").suggestions().is_empty());
        assert!(CoreError::Internal("x".into()).suggestions().is_empty());
    }

    #[test]
    fn test_only_merge_conflicts_carry_details() {
        assert!(CoreError::Internal("x".into()).details().is_none());
        let details = CoreError::MergeConflict { conflicts: vec![] }.details().unwrap();
        assert_eq!(details["conflicts"], serde_json::json!([]));
    }

    #[test]
    fn test_lock_held_message_names_holder() {
        let err = CoreError::lock_held("cursor", 1234);
        assert!(err.to_string().contains("cursor"));
        assert!(err.to_string().contains("1234"));
    }
}
