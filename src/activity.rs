//! Append-only activity log.
//!
//! Every action and failure ends up here as one line,
//! `[<timestamp>] <message>`, and is echoed to the console through
//! `tracing`. The log is the only audit trail, so a failed append is never
//! swallowed: the message and the cause go to stderr and the error is
//! returned to the caller.

use crate::error::{Error, Result};
use crate::mirror::{MirrorAction, MirrorOutcome};
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Handle to the activity log. Cheap to clone; clones share one writer.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    // Canonical form, for recognising the log among watched paths
    resolved: PathBuf,
    // Serializes appends so concurrent sessions never interleave inside a line
    write: Mutex<()>,
}

impl ActivityLog {
    /// Create the log file (and its parent directories) if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LogSink`] if the file cannot be created or opened
    /// for appending.
    pub async fn open(path: &Path) -> Result<Self> {
        let sink_error = |source| Error::LogSink {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(sink_error)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(sink_error)?;
        let resolved = fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf());

        Ok(Self {
            inner: Arc::new(Inner {
                path: path.to_path_buf(),
                resolved,
                write: Mutex::new(()),
            }),
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Whether `path` names the log file itself.
    ///
    /// Mirroring the log would append a line, which changes the log again.
    pub fn is_log_file(&self, path: &Path) -> bool {
        path == self.inner.path || path == self.inner.resolved
    }

    /// Append `message` with the current time and echo it to the console.
    ///
    /// The file is reopened for every append so an external rotation is
    /// picked up without a restart.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LogSink`] if the append fails. The message is still
    /// printed to stderr in that case.
    pub async fn record(&self, message: &str) -> Result<()> {
        let line = format_entry(Utc::now(), message);

        let written = {
            let _guard = self.inner.write.lock().await;
            append(&self.inner.path, line.as_bytes()).await
        };

        match written {
            Ok(()) => {
                tracing::info!("{message}");
                Ok(())
            }
            Err(source) => {
                eprintln!(
                    "activity log {} unavailable ({source}): {message}",
                    self.inner.path.display()
                );
                Err(Error::LogSink {
                    path: self.inner.path.clone(),
                    source,
                })
            }
        }
    }

    /// Render and record a mirror outcome. Silent outcomes write nothing.
    pub async fn record_outcome(&self, outcome: &MirrorOutcome) -> Result<()> {
        match render(outcome) {
            Some(message) => self.record(&message).await,
            None => {
                tracing::debug!(?outcome, "no activity line for outcome");
                Ok(())
            }
        }
    }
}

async fn append(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(bytes).await?;
    file.flush().await
}

/// One log line: `[<RFC 3339 UTC with milliseconds>] <message>\n`.
pub fn format_entry(timestamp: DateTime<Utc>, message: &str) -> String {
    format!(
        "[{}] {}\n",
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        message
    )
}

/// Text for an outcome, or `None` for outcomes that are not actions.
pub fn render(outcome: &MirrorOutcome) -> Option<String> {
    match outcome {
        MirrorOutcome::Synced { root, relative } => Some(format!(
            "SYNCED: ({}) {}",
            root.display(),
            relative.display()
        )),
        MirrorOutcome::Removed { root, relative } => Some(format!(
            "REMOVED: ({}) {}",
            root.display(),
            relative.display()
        )),
        MirrorOutcome::Guarded { source } => Some(format!(
            "SKIPPED deletion (parent folder missing locally): {}",
            source.display()
        )),
        MirrorOutcome::Pruned { destination } => {
            Some(format!("PRUNED: {}", destination.display()))
        }
        MirrorOutcome::Failed(failure) => {
            let verb = match failure.action {
                MirrorAction::Sync => "syncing",
                MirrorAction::Remove => "removing",
                MirrorAction::Prune => "pruning",
            };
            Some(format!(
                "ERROR {} {}: {}",
                verb,
                failure.path.display(),
                failure.error
            ))
        }
        MirrorOutcome::Unchanged { .. } | MirrorOutcome::Absent { .. } => None,
    }
}
