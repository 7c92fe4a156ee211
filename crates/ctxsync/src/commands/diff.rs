use libctxsync_core::{to_markdown, CoreError};

use crate::cli::Cli;
use crate::context::CtxContext;
use crate::output::output_success;

pub fn run(cli: &Cli, from: &str, to: Option<&str>, markdown: bool) -> Result<(), CoreError> {
    let ctx = CtxContext::resolve(cli)?;
    let store = ctx.open_store();

    let diff = store.diff(from, to)?;
    output_success(cli, diff, |d| {
        if markdown {
            return to_markdown(d);
        }
        if d.is_empty() {
            return format!("No changes (v{} → v{})", d.source_version, d.target_version);
        }
        format!(
            "v{} → v{}: {} added, {} removed, {} modified ({})",
            d.source_version,
            d.target_version,
            d.summary.added,
            d.summary.removed,
            d.summary.modified,
            d.causality.as_str()
        )
    });
    Ok(())
}
