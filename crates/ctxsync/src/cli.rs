use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ctxsync", about = "Shared work context for coding agents", version)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress human-readable output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Project directory (defaults to the current directory)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    /// Agent id used for locks, clocks and handoffs
    #[arg(long, global = true, env = "CTXSYNC_AGENT")]
    pub agent: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the shared context for this project
    Init {
        /// What the agents are working towards
        #[arg(long, default_value = "")]
        goal: String,
    },

    /// Read and edit the shared context
    Context {
        #[command(subcommand)]
        cmd: ContextCommand,
    },

    /// Snapshot management
    Snapshot {
        #[command(subcommand)]
        cmd: SnapshotCommand,
    },

    /// Compare a snapshot with another snapshot or the current context
    Diff {
        /// Snapshot id or unique prefix
        from: String,

        /// Snapshot id to compare against (defaults to the current context)
        to: Option<String>,

        /// Render the diff as markdown
        #[arg(long)]
        markdown: bool,
    },

    /// Merge a snapshot into the current context
    Merge {
        /// Snapshot id or unique prefix
        snapshot: String,

        /// Write the merged context back (otherwise preview only)
        #[arg(long)]
        apply: bool,

        /// List strategy: union, source-wins, target-wins
        #[arg(long, default_value = "union")]
        lists: String,

        /// Scalar strategy: target-wins, source-wins, newest
        #[arg(long, default_value = "target-wins")]
        scalars: String,

        /// Report every differing pair as a conflict, ignoring clocks
        #[arg(long)]
        no_causal: bool,
    },

    /// Run one manual sync
    Sync {
        /// Why the sync was requested
        #[arg(long)]
        reason: Option<String>,
    },

    /// Context lock management
    Lock {
        #[command(subcommand)]
        cmd: LockCommand,
    },

    /// Watch for editor, file, idle and git triggers until interrupted
    Watch,
}

#[derive(Clone, Subcommand)]
pub enum ContextCommand {
    /// Show the current context
    Show,

    /// Replace the goal
    Goal { goal: String },

    /// Set the work status (planning, in-progress, blocked, reviewing, completed)
    Status { status: String },

    /// Record a decision
    Decide {
        description: String,

        #[arg(long)]
        rationale: Option<String>,
    },

    /// Record an approach and how it went
    Approach {
        description: String,

        /// tried, succeeded, failed, abandoned
        #[arg(long, default_value = "tried")]
        outcome: String,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Record a blocker
    Block { description: String },

    /// Resolve a blocker
    Unblock {
        /// Blocker id or unique prefix
        id: String,

        #[arg(long)]
        resolution: Option<String>,
    },

    /// Add a next step
    Next {
        description: String,

        #[arg(long, default_value = "0")]
        priority: u8,
    },

    /// Hand the work to another agent
    Handoff {
        /// Receiving agent
        to: String,

        #[arg(long, default_value = "")]
        summary: String,
    },

    /// Record modified files
    Files {
        #[arg(required = true)]
        files: Vec<String>,

        #[arg(long, default_value = "")]
        summary: String,

        /// The changes are already committed
        #[arg(long)]
        committed: bool,
    },
}

#[derive(Clone, Subcommand)]
pub enum SnapshotCommand {
    /// Snapshot the current context
    Create {
        /// auto, manual, handoff, milestone
        #[arg(long, default_value = "manual")]
        reason: String,

        #[arg(long)]
        label: Option<String>,
    },

    /// List snapshots, newest first
    List,

    /// Show one snapshot
    Show { id: String },

    /// Replace the current context with a snapshot
    Restore { id: String },

    /// Delete old snapshots
    Gc {
        /// Snapshots to keep (defaults to the configured maximum)
        #[arg(long)]
        keep: Option<usize>,
    },
}

#[derive(Clone, Subcommand)]
pub enum LockCommand {
    /// Show who holds the context lock
    Status,

    /// Take the context lock
    Acquire {
        /// Give up after this many milliseconds (defaults to the configured timeout)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Release the context lock
    Release {
        /// Remove the lock whoever holds it
        #[arg(long)]
        force: bool,
    },
}
