use libctxsync_core::{conflicts_to_markdown, CoreError, ListStrategy, MergeOptions, ScalarStrategy};
use serde::Serialize;

use crate::cli::Cli;
use crate::context::CtxContext;
use crate::output::{output_success, print_human};

#[derive(Serialize)]
struct MergeOutput {
    applied: bool,
    version: u64,
    causality: String,
}

pub fn run(
    cli: &Cli,
    snapshot: &str,
    apply: bool,
    lists: &str,
    scalars: &str,
    no_causal: bool,
) -> Result<(), CoreError> {
    let lists = ListStrategy::from_str(lists).ok_or_else(|| {
        CoreError::InvalidArgs(format!(
            "unknown list strategy '{}' (expected union, source-wins, target-wins)",
            lists
        ))
    })?;
    let scalars = ScalarStrategy::from_str(scalars).ok_or_else(|| {
        CoreError::InvalidArgs(format!(
            "unknown scalar strategy '{}' (expected target-wins, source-wins, newest)",
            scalars
        ))
    })?;

    let ctx = CtxContext::resolve(cli)?;
    let store = ctx.open_store();

    let mut options = MergeOptions::default()
        .with_lists(lists)
        .with_scalars(scalars)
        .with_agent(ctx.agent_id.clone());
    if no_causal {
        options = options.without_causality();
    }

    let result = store.merge_snapshot(snapshot, &options, apply)?;
    if !result.success {
        if !cli.quiet && !cli.json {
            eprint!("{}", conflicts_to_markdown(&result.conflicts));
        }
        return Err(CoreError::MergeConflict {
            conflicts: result.conflicts,
        });
    }

    let causality = result.causality.as_str().to_string();
    let merged = result.into_context()?;
    if !apply {
        print_human(cli, "Preview only; re-run with --apply to write the merge");
    }
    let output = MergeOutput {
        applied: apply,
        version: merged.version,
        causality,
    };
    output_success(cli, output, |o| {
        if o.applied {
            format!("Merged into v{} ({})", o.version, o.causality)
        } else {
            format!("Merge would produce v{} ({})", o.version, o.causality)
        }
    });
    Ok(())
}
