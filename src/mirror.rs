//! Mirror operations: replicate and retract.
//!
//! Both operations are idempotent and fault-isolated. They never return an
//! error to the watch loop or the reconciler; instead every call produces a
//! [`MirrorOutcome`], and the [`ActivityLog`] is the one place that turns
//! outcomes into text.
//!
//! Operations on the same destination path are serialized through a shared
//! [`PathLocks`] table, whichever session or pass issued them.

use crate::activity::ActivityLog;
use crate::config::DeleteGuard;
use crate::copy::{self, copy_dir, copy_file};
use crate::error::{Error, Result};
use crate::mapper::RootBinding;
use crate::options::CopyOptions;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// Which operation an outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorAction {
    /// Replicate
    Sync,
    /// Retract on a live deletion
    Remove,
    /// Retract during a pruning reconciliation
    Prune,
}

/// A failed operation, with the path it was about and why.
#[derive(Debug)]
pub struct MirrorFailure {
    /// Operation that failed
    pub action: MirrorAction,
    /// Source path for syncs, source path for removes, destination for prunes
    pub path: PathBuf,
    /// Underlying cause
    pub error: Error,
}

/// Result of one mirror operation.
#[derive(Debug)]
pub enum MirrorOutcome {
    /// Source content now present at the destination
    Synced { root: PathBuf, relative: PathBuf },
    /// Destination already held identical content (update-newer mode)
    Unchanged { root: PathBuf, relative: PathBuf },
    /// Destination entry deleted after a source deletion
    Removed { root: PathBuf, relative: PathBuf },
    /// Nothing to delete at the destination
    Absent { destination: PathBuf },
    /// Deletion vetoed by the guard
    Guarded { source: PathBuf },
    /// Stale destination entry deleted by a pruning reconciliation
    Pruned { destination: PathBuf },
    /// The operation failed; nothing else was affected
    Failed(MirrorFailure),
}

impl MirrorOutcome {
    pub(crate) fn failed(action: MirrorAction, path: &Path, error: Error) -> Self {
        Self::Failed(MirrorFailure {
            action,
            path: path.to_path_buf(),
            error,
        })
    }

    /// Whether the operation failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// What a successful replicate did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replicated {
    /// Whether anything was written
    pub changed: bool,
    /// Bytes of file content written
    pub bytes: u64,
}

/// Copy the file or directory tree at `source` onto `destination`.
///
/// The destination's parent directories are created first. Directories are
/// merged recursively; files are replaced atomically. The copy itself runs
/// on the blocking pool.
pub async fn replicate(source: &Path, destination: &Path, options: &CopyOptions) -> Result<Replicated> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let source = source.to_path_buf();
    let destination = destination.to_path_buf();
    let options = options.clone();

    tokio::task::spawn_blocking(move || -> Result<Replicated> {
        let meta = std::fs::metadata(&source)?;
        if meta.is_dir() {
            let stats = copy_dir(&source, &destination, &options)?;
            Ok(Replicated {
                changed: stats.files_copied + stats.dirs_created + stats.symlinks_copied > 0,
                bytes: stats.bytes_copied,
            })
        } else {
            let changed = copy_file(&source, &destination, &options)?;
            Ok(Replicated {
                changed,
                bytes: if changed { meta.len() } else { 0 },
            })
        }
    })
    .await?
}

/// Delete the file, symlink or directory tree at `destination`.
///
/// Returns `Ok(false)` when there was nothing to delete.
pub async fn retract(destination: &Path) -> Result<bool> {
    let meta = match tokio::fs::symlink_metadata(destination).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let destination = destination.to_path_buf();
    let removed = tokio::task::spawn_blocking(move || copy::remove_existing(&destination, &meta)).await?;
    match removed {
        Ok(()) => Ok(true),
        // Someone else got there first
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Whether `guard` trusts the deletion of `source`.
///
/// The conservative guard requires the parent of the removed path to still
/// exist; a stat that errors counts as "gone".
pub async fn deletion_permitted(guard: DeleteGuard, source: &Path) -> bool {
    match guard {
        DeleteGuard::Direct => true,
        DeleteGuard::Conservative => match source.parent() {
            Some(parent) => tokio::fs::try_exists(parent).await.unwrap_or(false),
            None => false,
        },
    }
}

/// Table of per-destination-path locks.
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    table: Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>,
}

/// Held while an operation on one destination path runs.
#[derive(Debug)]
pub struct PathGuard {
    locks: PathLocks,
    path: PathBuf,
    held: Option<OwnedMutexGuard<()>>,
}

impl PathLocks {
    /// Wait until no other operation holds `path`, then hold it.
    pub async fn lock(&self, path: &Path) -> PathGuard {
        let slot = self
            .table
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .clone();
        let held = slot.lock_owned().await;
        PathGuard {
            locks: self.clone(),
            path: path.to_path_buf(),
            held: Some(held),
        }
    }

    /// Number of paths currently held or waited on.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether no path is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        drop(self.held.take());
        let mut table = self.locks.table.lock();
        if let Some(slot) = table.get(&self.path) {
            // Only the table itself still references the slot
            if Arc::strong_count(slot) == 1 {
                table.remove(&self.path);
            }
        }
    }
}

/// Mirror operations bound to one destination policy and activity log.
///
/// Shared by every watch session and the reconciler.
#[derive(Debug, Clone)]
pub struct Mirror {
    copy: CopyOptions,
    guard: DeleteGuard,
    log: ActivityLog,
    locks: PathLocks,
}

impl Mirror {
    pub fn new(copy: CopyOptions, guard: DeleteGuard, log: ActivityLog) -> Self {
        Self {
            copy,
            guard,
            log,
            locks: PathLocks::default(),
        }
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn guard(&self) -> DeleteGuard {
        self.guard
    }

    pub fn locks(&self) -> &PathLocks {
        &self.locks
    }

    /// Replicate `source` (inside `binding`'s root) to its mapped path.
    pub async fn replicate(&self, binding: &RootBinding, source: &Path) -> MirrorOutcome {
        let destination = binding.map(source);
        let root = binding.source_root().to_path_buf();
        let relative = binding.relative(source).to_path_buf();

        let _held = self.locks.lock(&destination).await;
        match replicate(source, &destination, &self.copy).await {
            Ok(done) if done.changed => MirrorOutcome::Synced { root, relative },
            Ok(_) => MirrorOutcome::Unchanged { root, relative },
            Err(e) => MirrorOutcome::failed(MirrorAction::Sync, source, e),
        }
    }

    /// Retract the mapped path of a removed `source`, if the guard allows.
    pub async fn retract(&self, binding: &RootBinding, source: &Path) -> MirrorOutcome {
        if !deletion_permitted(self.guard, source).await {
            return MirrorOutcome::Guarded {
                source: source.to_path_buf(),
            };
        }

        let destination = binding.map(source);
        let _held = self.locks.lock(&destination).await;
        match retract(&destination).await {
            Ok(true) => MirrorOutcome::Removed {
                root: binding.source_root().to_path_buf(),
                relative: binding.relative(source).to_path_buf(),
            },
            Ok(false) => MirrorOutcome::Absent { destination },
            Err(e) => MirrorOutcome::failed(MirrorAction::Remove, source, e),
        }
    }

    /// Retract a destination entry found stale by a pruning pass.
    pub async fn prune(&self, destination: &Path) -> MirrorOutcome {
        let _held = self.locks.lock(destination).await;
        match retract(destination).await {
            Ok(true) => MirrorOutcome::Pruned {
                destination: destination.to_path_buf(),
            },
            Ok(false) => MirrorOutcome::Absent {
                destination: destination.to_path_buf(),
            },
            Err(e) => MirrorOutcome::failed(MirrorAction::Prune, destination, e),
        }
    }

    /// Write an outcome to the activity log.
    ///
    /// A sink failure has already been echoed to stderr with the message by
    /// the log itself; the operation's own result stands.
    pub async fn record(&self, outcome: &MirrorOutcome) {
        if let Err(e) = self.log.record_outcome(outcome).await {
            tracing::error!("{e}");
        }
    }

    /// Write a free-form line to the activity log, same failure policy as
    /// [`Mirror::record`].
    pub async fn note(&self, message: &str) {
        if let Err(e) = self.log.record(message).await {
            tracing::error!("{e}");
        }
    }
}
