//! treemirror - keep a destination tree mirrored from watched source trees
//!
//! Configuration comes from the environment (optionally loaded from a
//! `.env` file); see `treemirror --help` for the keys.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use treemirror::{Config, Error as MirrorError, Supervisor};

/// treemirror - mirror watched folders onto a network folder
///
/// Settings are read from the environment, after loading `.env` from the
/// working directory (or the file given with --env-file):
///
///   LOCAL_FOLDER           ;-separated absolute source folders
///   NETWORK_FOLDER         absolute destination folder (required)
///   SYNC_LOG               absolute activity log path (required)
///   SYNC_WATCH_DEPTH       max depth for live events (default 20)
///   SYNC_WATCH_BACKEND     native | poll (default native)
///   SYNC_POLL_INTERVAL_MS  poll interval (default 2000)
///   SYNC_DELETE_GUARD      conservative | direct (default conservative)
///   SYNC_RECONCILE         additive | prune (default additive)
///   SYNC_LAYOUT            shared | per-root (default shared)
///   SYNC_ON_CONFLICT       overwrite | update-newer (default overwrite)
///   SYNC_PARALLEL          parallel copies per directory (default 16)
///   SYNC_FSYNC             fsync before rename (default true)
#[derive(Parser, Debug)]
#[command(name = "treemirror", version, about, long_about = None, verbatim_doc_comment)]
struct Args {
    /// Load settings from this file instead of ./.env
    #[arg(long, value_name = "PATH", global = true)]
    env_file: Option<PathBuf>,

    /// What to do (default: watch)
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, Default)]
enum Command {
    /// Reconcile every folder, then watch for changes until terminated
    #[default]
    Watch,
    /// Reconcile every folder once and exit
    Reconcile,
}

type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
enum CliError {
    #[error("Failed to load env file: {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[source] MirrorError),

    #[error("{0}")]
    Mirror(#[source] MirrorError),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::EnvFile { .. } | Self::Config(_) => 2,
            Self::Mirror(_) => 1,
        }
    }
}

impl From<MirrorError> for CliError {
    fn from(error: MirrorError) -> Self {
        if error.is_configuration() {
            Self::Config(error)
        } else {
            Self::Mirror(error)
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .with_target(false)
        .init();

    if let Err(error) = run(args).await {
        eprintln!("error: {error}");
        std::process::exit(error.exit_code());
    }
}

async fn run(args: Args) -> CliResult<()> {
    match &args.env_file {
        Some(path) => {
            dotenvy::from_path(path).map_err(|source| CliError::EnvFile {
                path: path.clone(),
                source,
            })?;
        }
        // A missing .env is normal
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let config = Config::from_env()?;
    tracing::debug!(?config, "configuration loaded");

    let supervisor = Supervisor::start(config).await?;
    let summary = supervisor.reconcile().await;
    tracing::debug!(
        roots = summary.reports.len(),
        failed_roots = summary.failed_roots.len(),
        pruned = summary.pruned,
        "reconciliation finished"
    );

    match args.command.unwrap_or_default() {
        Command::Reconcile => Ok(()),
        Command::Watch => {
            supervisor.watch().await;
            Ok(())
        }
    }
}
