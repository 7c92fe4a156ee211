//! Trigger watchers
//!
//! Each watcher polls one external condition on a fixed interval and emits
//! [`SyncEvent`]s into an mpsc channel. Watchers are independent: each runs
//! on its own task and is stopped through its [`WatcherHandle`].

mod editor;
mod file_save;
mod git_commit;
mod idle;

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::event::SyncEvent;

pub use editor::{classify_editor, CommandProbe, EditorSwitchWatcher, ProcessProbe, UNKNOWN_APP};
pub use file_save::FileSaveWatcher;
pub use git_commit::{head_commit, GitCommitWatcher};
pub use idle::{ActivityTracker, IdleWatcher};

/// A polled source of sync events
pub trait Watcher: Send + Sized + 'static {
    fn name(&self) -> &'static str;

    fn period(&self) -> Duration;

    /// Check the condition once; `Some` when an event should be emitted
    fn poll(&mut self) -> impl Future<Output = Option<SyncEvent>> + Send;

    /// Run the poll loop on a new task until the handle is stopped
    fn start(mut self, tx: mpsc::Sender<SyncEvent>) -> WatcherHandle {
        let name = self.name();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(watcher = name, "watcher started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Some(event) = self.poll().await {
                            debug!(watcher = name, trigger = %event.trigger, "watcher fired");
                            if tx.send(event).await.is_err() {
                                // Receiver gone, nothing left to feed
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!(watcher = name, "watcher stopped");
        });
        WatcherHandle {
            name,
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Running watcher
#[derive(Debug)]
pub struct WatcherHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the watcher and wait for its task to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(watcher = self.name, error = %e, "watcher task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        n: u64,
    }

    impl Watcher for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn period(&self) -> Duration {
            Duration::from_millis(10)
        }

        async fn poll(&mut self) -> Option<SyncEvent> {
            self.n += 1;
            (self.n % 2 == 0).then(|| SyncEvent::idle(self.n))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_emits_until_stopped() {
        let (tx, mut rx) = mpsc::channel(16);
        let handle = Counter { n: 0 }.start(tx);
        assert_eq!(handle.name(), "counter");

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first, SyncEvent { at: first.at, ..SyncEvent::idle(2) });
        assert!(matches!(second.details, crate::event::EventDetails::Idle { idle_ms: 4 }));

        handle.stop().await;
        // Sender dropped with the task
        while rx.recv().await.is_some() {}
    }
}
