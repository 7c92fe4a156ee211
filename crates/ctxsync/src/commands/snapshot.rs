use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};
use libctxsync_core::types::ids::short_id;
use libctxsync_core::{CoreError, SnapshotReason, SnapshotSummary};
use libctxsync_store::{ContextPersistence, GcStats};
use serde::Serialize;

use crate::cli::{Cli, SnapshotCommand};
use crate::context::CtxContext;
use crate::output::output_success;

#[derive(Serialize)]
struct SnapshotListOutput {
    snapshots: Vec<SnapshotSummary>,
    total: usize,
}

#[derive(Serialize)]
struct RestoreOutput {
    snapshot_id: String,
    version: u64,
}

pub fn run(cli: &Cli, cmd: SnapshotCommand) -> Result<(), CoreError> {
    let ctx = CtxContext::resolve(cli)?;
    let store = ctx.open_store();

    match cmd {
        SnapshotCommand::Create { reason, label } => {
            let reason = SnapshotReason::from_str(&reason).ok_or_else(|| {
                CoreError::InvalidArgs(format!(
                    "unknown reason '{}' (expected auto, manual, handoff, milestone)",
                    reason
                ))
            })?;
            let snapshot = store.snapshot(reason, label)?;
            output_success(cli, snapshot.summary(), |s| {
                format!("Created {} snapshot {} (v{})", s.reason.as_str(), short_id(&s.id), s.version)
            });
        }
        SnapshotCommand::List => {
            let snapshots = store.list_snapshots()?;
            let total = snapshots.len();
            output_success(cli, SnapshotListOutput { snapshots, total }, |o| render_list(&o.snapshots));
        }
        SnapshotCommand::Show { id } => {
            let snapshot = store.get_snapshot(&id)?;
            output_success(cli, snapshot, |s| {
                let mut out = format!(
                    "Snapshot {} ({}) taken {}\n",
                    s.id,
                    s.reason.as_str(),
                    s.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                if let Some(label) = &s.label {
                    out.push_str(&format!("Label:   {}\n", label));
                }
                out.push_str(&format!("Goal:    {}\n", s.data.current_work.goal));
                out.push_str(&format!("Version: {} ({})\n", s.data.version, s.data.clock));
                out
            });
        }
        SnapshotCommand::Restore { id } => {
            let full_id = store.snapshots().resolve(&id)?;
            let restored = store.restore_from_snapshot(&full_id)?;
            let output = RestoreOutput {
                snapshot_id: full_id,
                version: restored.version,
            };
            output_success(cli, output, |o| {
                format!("Restored snapshot {} as v{}", short_id(&o.snapshot_id), o.version)
            });
        }
        SnapshotCommand::Gc { keep } => {
            let keep = keep.unwrap_or(ctx.config.snapshots.max_snapshots);
            let stats: GcStats = store.gc_snapshots(keep)?;
            output_success(cli, stats, |s| {
                format!("Deleted {} snapshot(s), kept {}", s.deleted, s.kept)
            });
        }
    }
    Ok(())
}

fn render_list(snapshots: &[SnapshotSummary]) -> String {
    if snapshots.is_empty() {
        return "No snapshots".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["ID", "Reason", "Version", "Created", "Label"]);
    for s in snapshots {
        table.add_row(vec![
            short_id(&s.id).to_string(),
            s.reason.as_str().to_string(),
            s.version.to_string(),
            s.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            s.label.clone().unwrap_or_default(),
        ]);
    }
    table.to_string()
}
