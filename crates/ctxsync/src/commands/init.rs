use libctxsync_core::types::ids::short_id;
use libctxsync_core::{save_config, CoreError, STATE_DIR};
use serde::Serialize;

use crate::cli::Cli;
use crate::context::{AgentSource, CtxContext};
use crate::output::output_success;

#[derive(Serialize)]
struct InitOutput {
    context_id: String,
    agent_id: String,
    state_dir: String,
    created: bool,
    version: u64,
}

pub fn run(cli: &Cli, goal: &str) -> Result<(), CoreError> {
    let ctx = CtxContext::resolve(cli)?;
    let state_dir = ctx.project_dir.join(STATE_DIR);

    // First init writes the config, pinning an explicitly chosen agent
    if !state_dir.join("config.toml").exists() {
        let mut config = ctx.config.clone();
        if ctx.agent_source == AgentSource::Flag {
            config.agent_id = Some(ctx.agent_id.clone());
        }
        save_config(&state_dir, &config)?;
    }

    let store = ctx.open_store();
    let (context, created) = store.init(goal)?;

    let output = InitOutput {
        context_id: context.id.clone(),
        agent_id: ctx.agent_id.clone(),
        state_dir: state_dir.display().to_string(),
        created,
        version: context.version,
    };
    output_success(cli, output, |o| {
        if o.created {
            format!("Initialized context {} in {}", short_id(&o.context_id), o.state_dir)
        } else {
            format!("Context {} already exists (v{})", short_id(&o.context_id), o.version)
        }
    });
    Ok(())
}
