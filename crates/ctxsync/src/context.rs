use std::path::PathBuf;

use libctxsync_core::{load_config, CoreError, SyncConfig, STATE_DIR};
use libctxsync_store::FileContextStore;
use tracing::debug;

use crate::cli::Cli;

/// Agent id used when neither the flag, the environment nor the config names one
pub const DEFAULT_AGENT: &str = "agent";

/// Where the agent id came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentSource {
    /// `--agent` or `CTXSYNC_AGENT`
    Flag,
    Config,
    Default,
}

impl AgentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentSource::Flag => "flag",
            AgentSource::Config => "config",
            AgentSource::Default => "default",
        }
    }
}

/// Resolved settings for one ctxsync invocation
pub struct CtxContext {
    pub project_dir: PathBuf,
    pub agent_id: String,
    pub agent_source: AgentSource,
    pub config: SyncConfig,
}

impl CtxContext {
    pub fn resolve(cli: &Cli) -> Result<Self, CoreError> {
        let project_dir = match &cli.project {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        if !project_dir.is_dir() {
            return Err(CoreError::NotFound(format!(
                "project directory '{}'",
                project_dir.display()
            )));
        }
        let project_dir = project_dir.canonicalize()?;
        let config = load_config(&project_dir.join(STATE_DIR))?;

        let (agent_id, agent_source) = match (&cli.agent, &config.agent_id) {
            (Some(agent), _) => (agent.clone(), AgentSource::Flag),
            (None, Some(agent)) => (agent.clone(), AgentSource::Config),
            (None, None) => (DEFAULT_AGENT.to_string(), AgentSource::Default),
        };
        validate_agent(&agent_id)?;
        debug!(agent = %agent_id, source = agent_source.as_str(), "resolved agent");

        Ok(Self {
            project_dir,
            agent_id,
            agent_source,
            config,
        })
    }

    pub fn open_store(&self) -> FileContextStore {
        FileContextStore::open(&self.project_dir, &self.agent_id, self.config.clone())
    }
}

fn validate_agent(agent: &str) -> Result<(), CoreError> {
    if agent.trim().is_empty() {
        return Err(CoreError::InvalidArgs("agent id must not be empty".to_string()));
    }
    if agent.contains(':') || agent.contains(',') {
        return Err(CoreError::InvalidArgs(format!(
            "agent id '{}' must not contain ':' or ','",
            agent
        )));
    }
    Ok(())
}
