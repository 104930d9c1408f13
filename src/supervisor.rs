//! Startup sequence and process lifetime.
//!
//! [`Supervisor::start`] opens the activity log, reports the configuration,
//! prepares the destination and binds every accepted root. Reconciliation
//! and watching are separate steps so the one-shot `reconcile` command can
//! stop after the first.

use crate::activity::ActivityLog;
use crate::config::{Config, RootLayout};
use crate::error::Result;
use crate::mapper::{RootBinding, find_collisions};
use crate::mirror::Mirror;
use crate::reconcile::{ReconcileSummary, reconcile};
use crate::watch::WatchSession;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;

/// Owns the validated configuration and everything built from it.
#[derive(Debug)]
pub struct Supervisor {
    config: Config,
    mirror: Mirror,
    bindings: Vec<RootBinding>,
    rejected: Vec<RootBinding>,
}

fn join_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "(none)".to_owned();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Supervisor {
    /// Open the log and prepare every root.
    ///
    /// Rejected roots and an unusable destination are logged and leave the
    /// affected roots inert.
    ///
    /// # Errors
    ///
    /// Fails only if the activity log cannot be created or its first append
    /// fails.
    pub async fn start(config: Config) -> Result<Self> {
        let log = ActivityLog::open(&config.log_file).await?;
        let mirror = Mirror::new(config.copy.clone(), config.delete_guard, log);

        mirror
            .log()
            .record(&format!(
                "Watching local folders: {}",
                join_paths(&config.source_roots)
            ))
            .await?;
        mirror
            .note(&format!(
                "Syncing to network folder: {}",
                config.destination_root.display()
            ))
            .await;

        for rejected in &config.rejected_roots {
            mirror
                .note(&format!(
                    "ERROR source folder {} ignored: {}",
                    rejected.path.display(),
                    rejected.reason
                ))
                .await;
        }

        let destination = &config.destination_root;
        let rejected: Vec<RootBinding> = config
            .rejected_roots
            .iter()
            .map(|r| RootBinding::new(&r.path, destination, config.layout))
            .collect();

        let bindings = match prepare_destination(destination).await {
            Ok(()) => config
                .source_roots
                .iter()
                .map(|root| RootBinding::new(root, destination, config.layout))
                .collect(),
            Err(e) => {
                mirror
                    .note(&format!(
                        "ERROR network folder {} unavailable, nothing will be synced: {e}",
                        destination.display()
                    ))
                    .await;
                Vec::new()
            }
        };

        if config.layout == RootLayout::Shared {
            for collision in find_collisions(&bindings) {
                mirror
                    .note(&format!(
                        "COLLISION: {} exists in {}; the last writer wins",
                        collision.destination.display(),
                        join_paths(&collision.roots)
                    ))
                    .await;
            }
        }

        Ok(Self {
            config,
            mirror,
            bindings,
            rejected,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    /// Roots that will be reconciled and watched.
    pub fn bindings(&self) -> &[RootBinding] {
        &self.bindings
    }

    /// Run the startup reconciliation across every root.
    pub async fn reconcile(&self) -> ReconcileSummary {
        reconcile(
            &self.mirror,
            &self.bindings,
            self.config.reconcile_mode,
            &self.rejected,
        )
        .await
    }

    /// Start one watch session per root and keep them running.
    ///
    /// Never returns; the process ends by external termination.
    pub async fn watch(self) {
        let mut sessions = JoinSet::new();

        for binding in &self.bindings {
            let root = binding.source_root().to_path_buf();
            match WatchSession::start(
                binding.clone(),
                self.mirror.clone(),
                self.config.watch_depth,
                self.config.watch_backend,
            ) {
                Ok(session) => {
                    self.mirror
                        .note(&format!(
                            "Real-time watching started for: {} ({})",
                            root.display(),
                            session.backend()
                        ))
                        .await;
                    sessions.spawn(session.run());
                }
                Err(e) => {
                    self.mirror
                        .note(&format!("ERROR watching {}: {e}", root.display()))
                        .await;
                }
            }
        }

        self.mirror
            .note(&format!(
                "Watching all folders ({} deletion guard)...",
                self.config.delete_guard
            ))
            .await;

        while let Some(ended) = sessions.join_next().await {
            if let Err(e) = ended {
                tracing::error!("watch session stopped: {e}");
            }
        }

        // Nothing left to watch; stay up until terminated
        std::future::pending::<()>().await;
    }

    /// Reconcile, then watch forever.
    ///
    /// # Errors
    ///
    /// Same as [`Supervisor::start`].
    pub async fn run(config: Config) -> Result<()> {
        let supervisor = Self::start(config).await?;
        supervisor.reconcile().await;
        supervisor.watch().await;
        Ok(())
    }
}

async fn prepare_destination(destination: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(destination).await?;
    let meta = tokio::fs::metadata(destination).await?;
    if meta.is_dir() {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            "not a directory",
        ))
    }
}
