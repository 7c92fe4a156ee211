//! Sync engine: watchers in, serialized snapshots out
//!
//! Enabled watchers feed an mpsc channel. A pump task forwards each event
//! to the [`SyncQueue`], whose single consumer runs the
//! [`SnapshotProcessor`] against the persistence store.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use libctxsync_core::{SnapshotReason, SyncConfig};
use libctxsync_store::{ContextPersistence, StoreError};

use crate::error::SyncError;
use crate::event::{EventDetails, SyncEvent, TriggerKind};
use crate::notifications::EngineNotification;
use crate::queue::{QueueStatus, SyncProcessor, SyncQueue};
use crate::watchers::{
    ActivityTracker, CommandProbe, EditorSwitchWatcher, FileSaveWatcher, GitCommitWatcher,
    IdleWatcher, Watcher, WatcherHandle,
};

/// Snapshots the context for every event; records saved files first
pub struct SnapshotProcessor<S> {
    store: Arc<S>,
}

impl<S> SnapshotProcessor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: ContextPersistence> SyncProcessor for SnapshotProcessor<S> {
    async fn process(&self, event: &SyncEvent) -> Result<(), SyncError> {
        let store = Arc::clone(&self.store);
        let event = event.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            if let EventDetails::FileSave { files } = &event.details {
                let summary = format!("{} file(s) saved", files.len());
                store.update_code_changes(files, &summary, true)?;
            }
            let reason = match event.trigger {
                TriggerKind::Manual => SnapshotReason::Manual,
                _ => SnapshotReason::Auto,
            };
            let snapshot = store.create_snapshot(reason)?;
            debug!(trigger = %event.trigger, snapshot = %snapshot.id, "synced");
            Ok(())
        })
        .await??;
        Ok(())
    }
}

struct Running {
    watchers: Vec<WatcherHandle>,
    pump: JoinHandle<()>,
    pump_shutdown: watch::Sender<bool>,
}

pub struct SyncEngine<S: ContextPersistence> {
    project_dir: PathBuf,
    config: SyncConfig,
    queue: SyncQueue<SnapshotProcessor<S>>,
    activity: ActivityTracker,
    notify: broadcast::Sender<EngineNotification>,
    running: Mutex<Option<Running>>,
}

impl<S: ContextPersistence> SyncEngine<S> {
    pub fn new(store: Arc<S>, project_dir: impl Into<PathBuf>, config: SyncConfig) -> Self {
        let (notify, _) = broadcast::channel(256);
        Self {
            project_dir: project_dir.into(),
            config,
            queue: SyncQueue::new(SnapshotProcessor::new(store)),
            activity: ActivityTracker::new(),
            notify,
            running: Mutex::new(None),
        }
    }

    /// Start the watchers enabled in the trigger config
    pub fn start(&self) -> Result<(), SyncError> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            return Err(SyncError::AlreadyRunning);
        }

        let t = &self.config.triggers;
        let (tx, rx) = mpsc::channel(64);
        let mut watchers = Vec::new();
        if t.editor_switch {
            let probe = CommandProbe::platform_default(ms(t.command_timeout_ms));
            watchers.push(EditorSwitchWatcher::new(probe, ms(t.editor_poll_ms)).start(tx.clone()));
        }
        if t.file_save {
            watchers.push(
                FileSaveWatcher::new(
                    self.project_dir.clone(),
                    &t.watch_patterns,
                    &t.ignore_patterns,
                    ms(t.file_poll_ms),
                    ms(t.debounce_ms),
                )
                .start(tx.clone()),
            );
        }
        if t.idle {
            watchers.push(
                IdleWatcher::new(self.activity.clone(), ms(t.idle_threshold_ms), ms(t.idle_poll_ms))
                    .start(tx.clone()),
            );
        }
        if t.git_commit {
            watchers.push(
                GitCommitWatcher::new(self.project_dir.clone(), ms(t.git_poll_ms), ms(t.command_timeout_ms))
                    .start(tx.clone()),
            );
        }
        drop(tx);

        let (pump_shutdown, shutdown_rx) = watch::channel(false);
        let pump = tokio::spawn(pump(
            rx,
            shutdown_rx,
            self.queue.clone(),
            self.activity.clone(),
            self.notify.clone(),
        ));

        info!(
            project = %self.project_dir.display(),
            watchers = ?watchers.iter().map(|w| w.name()).collect::<Vec<_>>(),
            "sync engine started"
        );
        *running = Some(Running {
            watchers,
            pump,
            pump_shutdown,
        });
        let _ = self.notify.send(EngineNotification::Started);
        Ok(())
    }

    /// Stop all watchers and wait for them; pending events are rejected
    pub async fn stop(&self) {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(running) = running else {
            return;
        };

        for watcher in running.watchers {
            watcher.stop().await;
        }
        let _ = running.pump_shutdown.send(true);
        if let Err(e) = running.pump.await {
            warn!(error = %e, "sync pump task failed");
        }
        let dropped = self.queue.clear();
        info!(dropped, "sync engine stopped");
        let _ = self.notify.send(EngineNotification::Stopped);
    }

    /// Enqueue a manual sync and wait for it to be processed
    pub async fn trigger_sync(&self, reason: Option<String>) -> Result<(), SyncError> {
        let event = SyncEvent::manual(reason);
        self.activity.record();
        let _ = self.notify.send(EngineNotification::Sync { event: event.clone() });
        let result = self.queue.enqueue(event).await;
        if let Err(e) = &result {
            let _ = self.notify.send(EngineNotification::Error {
                source: TriggerKind::Manual.to_string(),
                message: e.to_string(),
            });
        }
        result
    }

    /// Note user activity; resets the idle timer
    pub fn record_activity(&self) {
        self.activity.record();
    }

    pub fn is_active(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineNotification> {
        self.notify.subscribe()
    }
}

/// Forward watcher events into the queue until shut down
async fn pump<S: ContextPersistence>(
    mut rx: mpsc::Receiver<SyncEvent>,
    mut shutdown: watch::Receiver<bool>,
    queue: SyncQueue<SnapshotProcessor<S>>,
    activity: ActivityTracker,
    notify: broadcast::Sender<EngineNotification>,
) {
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let trigger = event.trigger;
                if trigger != TriggerKind::Idle {
                    activity.record();
                }
                let _ = notify.send(EngineNotification::Sync { event: event.clone() });
                let done = queue.enqueue(event);
                let notify = notify.clone();
                // Report the outcome without holding up the next event
                tokio::spawn(async move {
                    if let Err(e) = done.await {
                        let _ = notify.send(EngineNotification::Error {
                            source: trigger.to_string(),
                            message: e.to_string(),
                        });
                    }
                });
            }
            _ = shutdown.changed() => break,
        }
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use libctxsync_store::FileContextStore;
    use tempfile::TempDir;

    fn quiet_config() -> SyncConfig {
        let mut config = SyncConfig::default();
        config.triggers.editor_switch = false;
        config.triggers.file_save = false;
        config.triggers.idle = false;
        config.triggers.git_commit = false;
        config
    }

    fn setup(config: SyncConfig) -> (TempDir, Arc<FileContextStore>, SyncEngine<FileContextStore>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileContextStore::open(dir.path(), "claude", config.clone()));
        store.init("A").unwrap();
        let engine = SyncEngine::new(Arc::clone(&store), dir.path(), config);
        (dir, store, engine)
    }

    #[tokio::test]
    async fn test_manual_trigger_creates_manual_snapshot() {
        let (_dir, store, engine) = setup(quiet_config());
        engine.trigger_sync(Some("checkpoint".into())).await.unwrap();

        let snapshots = store.list_snapshots().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].reason, SnapshotReason::Manual);
        assert_eq!(engine.queue_status().depth, 0);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let (_dir, _store, engine) = setup(quiet_config());
        let mut rx = engine.subscribe();

        assert!(!engine.is_active());
        engine.start().unwrap();
        assert!(engine.is_active());
        assert!(matches!(engine.start(), Err(SyncError::AlreadyRunning)));

        engine.stop().await;
        assert!(!engine.is_active());
        // Stopping twice is harmless
        engine.stop().await;

        assert_eq!(rx.recv().await.unwrap(), EngineNotification::Started);
        assert_eq!(rx.recv().await.unwrap(), EngineNotification::Stopped);
    }

    #[tokio::test]
    async fn test_failed_sync_reports_error() {
        let dir = TempDir::new().unwrap();
        // No context was ever created, so snapshotting fails
        let store = Arc::new(FileContextStore::open(dir.path(), "claude", quiet_config()));
        let engine = SyncEngine::new(store, dir.path(), quiet_config());
        let mut rx = engine.subscribe();

        let err = engine.trigger_sync(None).await.unwrap_err();
        assert!(matches!(err, SyncError::Store(StoreError::NoContext(_))));

        assert_eq!(rx.recv().await.unwrap().notification_type(), "sync");
        match rx.recv().await.unwrap() {
            EngineNotification::Error { source, .. } => assert_eq!(source, "manual"),
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_save_updates_code_changes() {
        let mut config = quiet_config();
        config.triggers.file_save = true;
        config.triggers.file_poll_ms = 20;
        config.triggers.debounce_ms = 50;
        let (dir, store, engine) = setup(config);
        let mut rx = engine.subscribe();

        engine.start().unwrap();
        // Let the watcher record its baseline
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Ok(EngineNotification::Sync { event }) = rx.recv().await {
                    return event;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(event.trigger, TriggerKind::FileSave);

        // Wait for the queue to finish the snapshot
        tokio::time::timeout(Duration::from_secs(10), async {
            while store.list_snapshots().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        engine.stop().await;

        let ctx = store.require_context().unwrap();
        assert_eq!(ctx.code_changes.modified_files, vec!["main.rs"]);
        assert_eq!(ctx.code_changes.summary, "1 file(s) saved");
        let snapshots = store.list_snapshots().unwrap();
        assert_eq!(snapshots[0].reason, SnapshotReason::Auto);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_steady_saves_hold_off_idle() {
        let mut config = quiet_config();
        config.triggers.file_save = true;
        config.triggers.file_poll_ms = 20;
        config.triggers.debounce_ms = 20;
        config.triggers.idle = true;
        config.triggers.idle_threshold_ms = 1000;
        config.triggers.idle_poll_ms = 20;
        let (dir, _store, engine) = setup(config);
        let mut rx = engine.subscribe();

        engine.start().unwrap();
        for i in 0..40 {
            std::fs::write(dir.path().join("main.rs"), format!("// {}", i)).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        engine.stop().await;

        let mut saves = 0;
        let mut idles = 0;
        while let Ok(n) = rx.try_recv() {
            if let EngineNotification::Sync { event } = n {
                match event.trigger {
                    TriggerKind::FileSave => saves += 1,
                    TriggerKind::Idle => idles += 1,
                    _ => {}
                }
            }
        }
        assert!(saves > 0);
        assert_eq!(idles, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_idle_fires_after_activity_stops() {
        let mut config = quiet_config();
        config.triggers.idle = true;
        config.triggers.idle_threshold_ms = 100;
        config.triggers.idle_poll_ms = 20;
        let (_dir, _store, engine) = setup(config);
        let mut rx = engine.subscribe();

        engine.start().unwrap();
        let event = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Ok(EngineNotification::Sync { event }) = rx.recv().await {
                    return event;
                }
            }
        })
        .await
        .unwrap();
        engine.stop().await;
        assert_eq!(event.trigger, TriggerKind::Idle);
    }
}
