//! Startup reconciliation.
//!
//! Each source root is brought into agreement with the destination one at a
//! time: every top-level entry is replicated (directories recursively). The
//! default pass only adds and overwrites; [`ReconcileMode::Prune`]
//! additionally retracts destination entries that no source root has.

use crate::config::ReconcileMode;
use crate::error::Result;
use crate::mapper::RootBinding;
use crate::mirror::{Mirror, MirrorAction, MirrorOutcome};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Counts for one reconciled root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootReport {
    pub root: PathBuf,
    /// Top-level entries now matching the source
    pub synced: usize,
    /// Top-level entries that failed
    pub failed: usize,
}

/// Result of a whole reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileSummary {
    /// Roots that were enumerated, in order
    pub reports: Vec<RootReport>,
    /// Roots whose listing failed
    pub failed_roots: Vec<PathBuf>,
    /// Destination entries retracted by pruning
    pub pruned: usize,
}

/// Replicate every top-level entry of `binding`'s root.
///
/// A child that cannot be read is recorded once and counted as failed; the
/// remaining children are still processed. The activity log is skipped if
/// it sits directly in the root.
///
/// # Errors
///
/// Returns an error only if the root itself cannot be listed.
pub async fn reconcile_root(mirror: &Mirror, binding: &RootBinding) -> Result<RootReport> {
    let root = binding.source_root();
    mirror
        .note(&format!("Initial sync started for: {}", root.display()))
        .await;

    let mut children = Vec::new();
    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        children.push(entry.path());
    }
    children.sort();

    let mut report = RootReport {
        root: root.to_path_buf(),
        synced: 0,
        failed: 0,
    };

    for child in children {
        if mirror.log().is_log_file(&child) {
            tracing::debug!(path = %child.display(), "skipping activity log");
            continue;
        }
        let outcome = match tokio::fs::metadata(&child).await {
            Ok(meta) if meta.is_dir() || meta.is_file() => mirror.replicate(binding, &child).await,
            Ok(_) => {
                tracing::debug!(path = %child.display(), "skipping special file");
                continue;
            }
            Err(e) => MirrorOutcome::failed(MirrorAction::Sync, &child, e.into()),
        };

        if outcome.is_failure() {
            report.failed += 1;
        } else {
            report.synced += 1;
        }
        mirror.record(&outcome).await;
    }

    mirror
        .note(&format!(
            "Initial sync completed for: {} ({} synced, {} failed)",
            root.display(),
            report.synced,
            report.failed
        ))
        .await;

    Ok(report)
}

/// Reconcile every binding in order, then prune if `mode` asks for it.
///
/// `rejected` holds the bindings rejected roots would have had; a
/// destination directory one of them projects onto is never pruned.
pub async fn reconcile(
    mirror: &Mirror,
    bindings: &[RootBinding],
    mode: ReconcileMode,
    rejected: &[RootBinding],
) -> ReconcileSummary {
    let mut summary = ReconcileSummary::default();

    for binding in bindings {
        match reconcile_root(mirror, binding).await {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                let root = binding.source_root();
                mirror
                    .record(&MirrorOutcome::failed(MirrorAction::Sync, root, e))
                    .await;
                summary.failed_roots.push(root.to_path_buf());
            }
        }
    }

    if mode == ReconcileMode::Prune {
        for (destination, group) in group_by_destination(bindings) {
            let unavailable = rejected
                .iter()
                .find(|b| b.destination() == destination)
                .or_else(|| {
                    group
                        .iter()
                        .copied()
                        .find(|b| summary.failed_roots.iter().any(|r| r == b.source_root()))
                })
                .map(|b| b.source_root().to_path_buf());
            if let Some(root) = unavailable {
                mirror
                    .note(&format!(
                        "SKIPPED pruning {} (source folder unavailable: {})",
                        destination.display(),
                        root.display()
                    ))
                    .await;
                continue;
            }

            let sources: Vec<PathBuf> = group.iter().map(|b| b.source_root().to_path_buf()).collect();
            match prune(mirror, &destination, &sources).await {
                Ok(n) => summary.pruned += n,
                Err(e) => {
                    mirror
                        .record(&MirrorOutcome::failed(MirrorAction::Prune, &destination, e))
                        .await;
                }
            }
        }
    }

    mirror
        .note("Initial full sync completed for all folders.")
        .await;
    summary
}

fn group_by_destination(bindings: &[RootBinding]) -> BTreeMap<PathBuf, Vec<&RootBinding>> {
    let mut groups: BTreeMap<PathBuf, Vec<&RootBinding>> = BTreeMap::new();
    for binding in bindings {
        groups
            .entry(binding.destination().to_path_buf())
            .or_default()
            .push(binding);
    }
    groups
}

/// Retract every entry under `destination` that none of `sources` has.
///
/// The activity log file is never pruned, even when it lives inside the
/// destination tree. Returns the number of entries retracted.
///
/// # Errors
///
/// Returns an error if the destination tree cannot be walked.
pub async fn prune(mirror: &Mirror, destination: &Path, sources: &[PathBuf]) -> Result<usize> {
    let walk_root = destination.to_path_buf();
    let walk_sources = sources.to_vec();
    let keep = mirror.log().path().to_path_buf();
    let stale =
        tokio::task::spawn_blocking(move || stale_entries(&walk_root, &walk_sources, &keep)).await??;

    let mut pruned = 0;
    for path in stale {
        let outcome = mirror.prune(&path).await;
        if matches!(outcome, MirrorOutcome::Pruned { .. }) {
            pruned += 1;
        }
        mirror.record(&outcome).await;
    }
    Ok(pruned)
}

/// Destination entries with no counterpart in any source.
///
/// A stale directory is reported once; its contents are not listed.
fn stale_entries(destination: &Path, sources: &[PathBuf], keep: &Path) -> io::Result<Vec<PathBuf>> {
    let mut stale = Vec::new();
    let mut pending = vec![PathBuf::new()];

    while let Some(relative) = pending.pop() {
        let dir = destination.join(&relative);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        let mut names = entries
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<io::Result<Vec<_>>>()?;
        names.sort();

        for name in names {
            let relative = relative.join(&name);
            let path = destination.join(&relative);
            if keep.starts_with(&path) && path != keep {
                pending.push(relative);
                continue;
            }
            if path == keep {
                continue;
            }

            let counterparts: Vec<fs::Metadata> = sources
                .iter()
                .filter_map(|root| fs::symlink_metadata(root.join(&relative)).ok())
                .collect();

            if counterparts.is_empty() {
                stale.push(path);
            } else if counterparts.iter().any(fs::Metadata::is_dir)
                && fs::symlink_metadata(&path)?.is_dir()
            {
                pending.push(relative);
            }
        }
    }

    Ok(stale)
}
