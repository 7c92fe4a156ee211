mod cli;
mod commands;
mod context;
mod output;

use clap::Parser;
use cli::{Cli, Command};
use libctxsync_core::CoreError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = run_command(&cli) {
        output::output_error(&cli, &e);
        std::process::exit(e.exit_code());
    }
}

fn run_command(cli: &Cli) -> Result<(), CoreError> {
    match &cli.command {
        Command::Init { goal } => commands::init::run(cli, goal),
        Command::Context { cmd } => commands::context::run(cli, cmd.clone()),
        Command::Snapshot { cmd } => commands::snapshot::run(cli, cmd.clone()),
        Command::Diff { from, to, markdown } => commands::diff::run(cli, from, to.as_deref(), *markdown),
        Command::Merge {
            snapshot,
            apply,
            lists,
            scalars,
            no_causal,
        } => commands::merge::run(cli, snapshot, *apply, lists, scalars, *no_causal),
        Command::Sync { reason } => commands::watch::run_once(cli, reason.clone()),
        Command::Lock { cmd } => commands::lock::run(cli, cmd.clone()),
        Command::Watch => commands::watch::run(cli),
    }
}

/// Logs go to stderr so stdout stays parseable
fn init_logging(cli: &Cli) {
    let default_level = match cli.command {
        Command::Watch => "info",
        _ => "warn",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(cli.log_level.as_deref().unwrap_or(default_level)))
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
