use std::future::Future;
use std::sync::Arc;

use libctxsync_core::types::ids::short_id;
use libctxsync_core::{CoreError, SnapshotSummary};
use libctxsync_sync::{EngineNotification, EventDetails, SyncEngine, SyncError};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::context::CtxContext;
use crate::output::{output_success, print_human, print_json_line};

#[derive(Serialize)]
struct WatchOutput {
    stopped: bool,
}

/// Run the sync engine until Ctrl-C or SIGTERM
pub fn run(cli: &Cli) -> Result<(), CoreError> {
    let ctx = CtxContext::resolve(cli)?;
    let store = Arc::new(ctx.open_store());
    // Fail early instead of erroring on every trigger
    store.require_context()?;

    let runtime = runtime()?;
    runtime.block_on(async {
        let engine = SyncEngine::new(Arc::clone(&store), &ctx.project_dir, ctx.config.clone());
        let mut rx = engine.subscribe();
        engine.start()?;
        print_human(
            cli,
            &format!("Watching {} as '{}' (Ctrl-C to stop)", ctx.project_dir.display(), ctx.agent_id),
        );

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                notification = rx.recv() => match notification {
                    Ok(n) => report(cli, &n),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "dropped engine notifications"),
                    Err(RecvError::Closed) => break,
                },
                _ = &mut shutdown => {
                    info!("received shutdown signal");
                    break;
                }
            }
        }

        engine.stop().await;
        Ok::<(), SyncError>(())
    })?;

    output_success(cli, WatchOutput { stopped: true }, |_| "Stopped".to_string());
    Ok(())
}

/// Run a single manual sync and report the snapshot it produced
pub fn run_once(cli: &Cli, reason: Option<String>) -> Result<(), CoreError> {
    let ctx = CtxContext::resolve(cli)?;
    let store = Arc::new(ctx.open_store());

    let runtime = runtime()?;
    runtime.block_on(async {
        let engine = SyncEngine::new(Arc::clone(&store), &ctx.project_dir, ctx.config.clone());
        engine.trigger_sync(reason).await
    })?;

    let latest: Option<SnapshotSummary> = store
        .snapshots()
        .latest()
        .map_err(CoreError::from)?
        .map(|s| s.summary());
    let snapshot = latest.ok_or_else(|| CoreError::Internal("sync finished without a snapshot".to_string()))?;
    output_success(cli, snapshot, |s| {
        format!("Synced: snapshot {} (v{})", short_id(&s.id), s.version)
    });
    Ok(())
}

fn report(cli: &Cli, notification: &EngineNotification) {
    if cli.json {
        print_json_line(notification);
        return;
    }
    let line = match notification {
        EngineNotification::Started => "sync engine started".to_string(),
        EngineNotification::Stopped => "sync engine stopped".to_string(),
        EngineNotification::Sync { event } => match &event.details {
            EventDetails::EditorSwitch { from, to } => format!(
                "editor switch: {} -> {}",
                from.as_deref().unwrap_or("?"),
                to
            ),
            EventDetails::FileSave { files } => format!("saved {} file(s)", files.len()),
            EventDetails::Idle { idle_ms } => format!("idle for {}s", idle_ms / 1000),
            EventDetails::GitCommit { hash, .. } => format!("commit {}", short_id(hash)),
            EventDetails::Manual { reason } => {
                format!("manual sync{}", reason.as_ref().map(|r| format!(": {}", r)).unwrap_or_default())
            }
        },
        EngineNotification::Error { source, message } => format!("{} sync failed: {}", source, message),
    };
    print_human(cli, &format!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), line));
}

fn runtime() -> Result<tokio::runtime::Runtime, CoreError> {
    Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?)
}

fn shutdown_signal() -> impl Future<Output = ()> {
    async {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
    }
}
