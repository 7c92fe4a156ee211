//! Two agents syncing the same project through separate engines

use std::sync::Arc;

use libctxsync_core::{SnapshotReason, SyncConfig};
use libctxsync_store::{ContextPersistence, FileContextStore};
use libctxsync_sync::{SyncEngine, SyncError};
use tempfile::TempDir;

fn config() -> SyncConfig {
    let mut config = SyncConfig::default();
    config.triggers.editor_switch = false;
    config.triggers.file_save = false;
    config.triggers.idle = false;
    config.triggers.git_commit = false;
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_engines_share_one_history() {
    let dir = TempDir::new().unwrap();
    let claude = Arc::new(FileContextStore::open(dir.path(), "claude", config()));
    let codex = Arc::new(FileContextStore::open(dir.path(), "codex", config()));
    claude.init("ship the parser").unwrap();

    let a = Arc::new(SyncEngine::new(Arc::clone(&claude), dir.path(), config()));
    let b = Arc::new(SyncEngine::new(Arc::clone(&codex), dir.path(), config()));

    let mut tasks = Vec::new();
    for i in 0..5 {
        for engine in [Arc::clone(&a), Arc::clone(&b)] {
            tasks.push(tokio::spawn(async move {
                engine.trigger_sync(Some(format!("round {}", i))).await
            }));
        }
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let snapshots = claude.list_snapshots().unwrap();
    assert_eq!(snapshots.len(), 10);
    assert!(snapshots.iter().all(|s| s.reason == SnapshotReason::Manual));
    assert!(snapshots.iter().all(|s| s.goal == "ship the parser"));
}

#[tokio::test]
async fn test_code_changes_then_restore() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileContextStore::open(dir.path(), "claude", config()));
    store.init("A").unwrap();
    let engine = SyncEngine::new(Arc::clone(&store), dir.path(), config());

    engine.trigger_sync(None).await.unwrap();
    let baseline = store.list_snapshots().unwrap()[0].id.clone();

    store
        .update_code_changes(&["src/lib.rs".to_string()], "1 file(s) saved", true)
        .unwrap();
    let restored = store.restore_from_snapshot(&baseline).unwrap();
    assert!(restored.code_changes.modified_files.is_empty());

    // Restore keeps a safety snapshot of the state it replaced
    let snapshots = store.list_snapshots().unwrap();
    assert_eq!(snapshots.len(), 2);
}

#[tokio::test]
async fn test_sync_without_context_fails() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileContextStore::open(dir.path(), "claude", config()));
    let engine = SyncEngine::new(store, dir.path(), config());

    let err = engine.trigger_sync(None).await.unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));
}
