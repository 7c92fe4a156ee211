use libctxsync_core::types::ids::short_id;
use libctxsync_core::{ApproachOutcome, CoreError, SharedContext, WorkStatus};
use libctxsync_store::ContextPersistence;
use serde::Serialize;

use crate::cli::{Cli, ContextCommand};
use crate::context::CtxContext;
use crate::output::output_success;

#[derive(Serialize)]
struct EntityOutput<T: Serialize> {
    version: u64,
    entity: T,
}

#[derive(Serialize)]
struct HandoffOutput {
    from: String,
    to: String,
    snapshot_id: String,
    version: u64,
}

pub fn run(cli: &Cli, cmd: ContextCommand) -> Result<(), CoreError> {
    let ctx = CtxContext::resolve(cli)?;
    let store = ctx.open_store();

    match cmd {
        ContextCommand::Show => {
            let context = store.require_context()?;
            output_success(cli, context, render_context);
        }
        ContextCommand::Goal { goal } => {
            let context = store.set_goal(&goal)?;
            output_success(cli, context, |c| format!("Goal set (v{})", c.version));
        }
        ContextCommand::Status { status } => {
            let status = WorkStatus::from_str(&status).ok_or_else(|| {
                CoreError::InvalidArgs(format!(
                    "unknown status '{}' (expected planning, in-progress, blocked, reviewing, completed)",
                    status
                ))
            })?;
            let context = store.set_status(status)?;
            output_success(cli, context, |c| {
                format!("Status set to {} (v{})", c.current_work.status.as_str(), c.version)
            });
        }
        ContextCommand::Decide {
            description,
            rationale,
        } => {
            let decision = store.add_decision(&description, rationale)?;
            let version = store.require_context()?.version;
            output_success(cli, EntityOutput { version, entity: decision }, |o| {
                format!("Recorded decision {}", short_id(&o.entity.id))
            });
        }
        ContextCommand::Approach {
            description,
            outcome,
            notes,
        } => {
            let outcome = ApproachOutcome::from_str(&outcome).ok_or_else(|| {
                CoreError::InvalidArgs(format!(
                    "unknown outcome '{}' (expected tried, succeeded, failed, abandoned)",
                    outcome
                ))
            })?;
            let approach = store.add_approach(&description, outcome, notes)?;
            let version = store.require_context()?.version;
            output_success(cli, EntityOutput { version, entity: approach }, |o| {
                format!("Recorded approach {}", short_id(&o.entity.id))
            });
        }
        ContextCommand::Block { description } => {
            let blocker = store.add_blocker(&description)?;
            let version = store.require_context()?.version;
            output_success(cli, EntityOutput { version, entity: blocker }, |o| {
                format!("Recorded blocker {}", short_id(&o.entity.id))
            });
        }
        ContextCommand::Unblock { id, resolution } => {
            let blocker = store.resolve_blocker(&id, resolution)?;
            let version = store.require_context()?.version;
            output_success(cli, EntityOutput { version, entity: blocker }, |o| {
                format!("Resolved blocker {}", short_id(&o.entity.id))
            });
        }
        ContextCommand::Next {
            description,
            priority,
        } => {
            let step = store.add_next_step(&description, priority)?;
            let version = store.require_context()?.version;
            output_success(cli, EntityOutput { version, entity: step }, |o| {
                format!("Added next step {}", short_id(&o.entity.id))
            });
        }
        ContextCommand::Handoff { to, summary } => {
            let (context, snapshot) = store.record_handoff(&to, &summary)?;
            let output = HandoffOutput {
                from: ctx.agent_id.clone(),
                to,
                snapshot_id: snapshot.id,
                version: context.version,
            };
            output_success(cli, output, |o| {
                format!(
                    "Handed off from {} to {} (snapshot {})",
                    o.from,
                    o.to,
                    short_id(&o.snapshot_id)
                )
            });
        }
        ContextCommand::Files {
            files,
            summary,
            committed,
        } => {
            let summary = if summary.is_empty() {
                format!("{} file(s) modified", files.len())
            } else {
                summary
            };
            let context = store.update_code_changes(&files, &summary, !committed)?;
            output_success(cli, context, |c| {
                format!(
                    "Tracking {} modified file(s) (v{})",
                    c.code_changes.modified_files.len(),
                    c.version
                )
            });
        }
    }
    Ok(())
}

fn render_context(c: &SharedContext) -> String {
    let mut out = String::new();
    let work = &c.current_work;
    out.push_str(&format!("Goal:    {}\n", if work.goal.is_empty() { "(none)" } else { &work.goal }));
    out.push_str(&format!("Status:  {}\n", work.status.as_str()));
    out.push_str(&format!("Version: {} ({})\n", c.version, c.clock));
    out.push_str(&format!("Updated: {}\n", c.updated_at.format("%Y-%m-%d %H:%M:%S UTC")));
    if let Some(owner) = c.current_owner() {
        out.push_str(&format!("Owner:   {}\n", owner));
    }

    let conv = &c.conversation;
    if !conv.decisions.is_empty() {
        out.push_str("\nDecisions:\n");
        for d in &conv.decisions {
            out.push_str(&format!("  [{}] {}", short_id(&d.id), d.description));
            if let Some(r) = &d.rationale {
                out.push_str(&format!(" ({})", r));
            }
            out.push('\n');
        }
    }
    if !conv.approaches.is_empty() {
        out.push_str("\nApproaches:\n");
        for a in &conv.approaches {
            out.push_str(&format!("  [{}] {} - {:?}\n", short_id(&a.id), a.description, a.outcome));
        }
    }
    if !conv.blockers.is_empty() {
        out.push_str("\nBlockers:\n");
        for b in &conv.blockers {
            let mark = if b.resolved { "x" } else { " " };
            out.push_str(&format!("  [{}] [{}] {}\n", mark, short_id(&b.id), b.description));
        }
    }
    if !conv.next_steps.is_empty() {
        out.push_str("\nNext steps:\n");
        let mut steps: Vec<_> = conv.next_steps.iter().collect();
        steps.sort_by(|a, b| b.priority.cmp(&a.priority));
        for s in steps {
            out.push_str(&format!("  (p{}) [{}] {}\n", s.priority, short_id(&s.id), s.description));
        }
    }
    let changes = &c.code_changes;
    if !changes.modified_files.is_empty() {
        out.push_str(&format!(
            "\nModified files{}:\n",
            if changes.uncommitted { " (uncommitted)" } else { "" }
        ));
        for f in &changes.modified_files {
            out.push_str(&format!("  {}\n", f));
        }
    }
    out
}
