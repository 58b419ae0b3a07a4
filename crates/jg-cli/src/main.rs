//! judgify-sim: run workflows step by step and browse their history.

mod commands;
mod config;
mod state;

use clap::{Parser, Subcommand};
use config::AppConfig;
use state::AppState;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about, propagate_version = true)]
struct Opts {
    /// Config file; defaults to `<data_dir>/config.json` when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a workflow to completion and record the run.
    Run {
        /// Workflow JSON file (`{id, name, nodes, edges}`).
        workflow: PathBuf,

        /// JSON object used as the run's initial data.
        #[arg(long)]
        data: Option<PathBuf>,

        /// Step service base URL; overrides `remote.base_url`.
        #[arg(long)]
        remote: Option<String>,

        /// Do not save a history record.
        #[arg(long)]
        no_save: bool,
    },

    /// Browse and manage saved runs.
    #[command(subcommand)]
    History(HistoryCommand),
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// Most recent runs.
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// One run with its step log.
    Show { id: String },
    /// Most recent runs of one workflow.
    Workflow {
        workflow_id: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    Delete { id: String },
    /// Delete every saved run.
    Clear,
    /// Counts by status.
    Stats,
    /// Most recent runs as a JSON array.
    Export {
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opts = Opts::parse();
    let config = AppConfig::load(opts.config.as_deref())?;
    let state = AppState::open(config)?;

    let output = match opts.command {
        Command::Run {
            workflow,
            data,
            remote,
            no_save,
        } => {
            commands::run::run(&state, &workflow, data.as_deref(), remote.as_deref(), !no_save)
                .await?
        }
        Command::History(cmd) => history(&state, cmd)?,
    };
    print!("{output}");
    Ok(())
}

fn history(state: &AppState, cmd: HistoryCommand) -> anyhow::Result<String> {
    use commands::history as h;

    let store = &state.history;
    let config = &state.config;
    match cmd {
        HistoryCommand::List { limit } => h::list(store, limit.unwrap_or(config.list_limit)),
        HistoryCommand::Show { id } => h::show(store, &id),
        HistoryCommand::Workflow { workflow_id, limit } => h::by_workflow(
            store,
            &workflow_id,
            limit.unwrap_or(config.workflow_list_limit),
        ),
        HistoryCommand::Delete { id } => h::delete(store, &id),
        HistoryCommand::Clear => h::clear(store),
        HistoryCommand::Stats => h::stats(store),
        HistoryCommand::Export { limit } => h::export(store, limit.unwrap_or(config.list_limit)),
    }
}
