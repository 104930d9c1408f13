//! # treemirror
//!
//! Mirror one or more watched source trees onto a single destination tree.
//!
//! ## Core Features
//!
//! - **Startup reconciliation**: every top-level entry of every source root is
//!   replicated once at startup, optionally pruning destination-only entries
//! - **Live watching**: one `notify` subscription per root, native with poll
//!   fallback, bounded by a configurable depth
//! - **Deletion guard**: a vanished parent directory vetoes a deletion, so a
//!   dismounted share never wipes the mirror
//! - **Atomic writes**: temp file + rename, with parallel directory copies
//!   tuned for network destinations
//! - **Per-path serialization**: operations on the same destination path
//!   never overlap, across sessions and the reconciler
//! - **Audit trail**: every action and failure is appended to a timestamped
//!   activity log
//!
//! ## Quick Start
//!
//! ```no_run
//! use treemirror::{Config, Supervisor};
//!
//! # async fn run() -> treemirror::Result<()> {
//! let config = Config::from_env()?;
//! let supervisor = Supervisor::start(config).await?;
//! let summary = supervisor.reconcile().await;
//! println!("{} roots reconciled", summary.reports.len());
//! supervisor.watch().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Mirror Operations
//!
//! [`Mirror`] is the single entry point for destination side effects. Its
//! operations never fail; they return a [`MirrorOutcome`] which the
//! [`ActivityLog`] renders.
//!
//! ```no_run
//! use std::path::Path;
//! use treemirror::{ActivityLog, CopyOptions, DeleteGuard, Mirror, RootBinding, RootLayout};
//!
//! # async fn run() -> treemirror::Result<()> {
//! let log = ActivityLog::open(Path::new("/var/log/treemirror.log")).await?;
//! let mirror = Mirror::new(CopyOptions::default(), DeleteGuard::Conservative, log);
//! let binding = RootBinding::new(Path::new("/data/a"), Path::new("/mirror"), RootLayout::Shared);
//!
//! let outcome = mirror.replicate(&binding, Path::new("/data/a/notes.txt")).await;
//! mirror.record(&outcome).await;
//! # Ok(())
//! # }
//! ```

mod activity;
mod config;
mod copy;
mod error;
mod mapper;
mod mirror;
mod options;
mod reconcile;
mod supervisor;
mod watch;

pub use activity::{ActivityLog, format_entry, render};
pub use config::{
    Config, DEFAULT_POLL_INTERVAL, DEFAULT_WATCH_DEPTH, DeleteGuard, ROOT_SEPARATOR,
    ReconcileMode, RejectedRoot, RootLayout, RootRejection, WatchBackend, validate_roots,
};
pub use copy::{CopyStats, copy_dir, copy_file};
pub use error::{Error, Result, is_no_space_error};
pub use mapper::{Collision, RootBinding, find_collisions, map_path};
pub use mirror::{
    Mirror, MirrorAction, MirrorFailure, MirrorOutcome, PathGuard, PathLocks, Replicated,
    deletion_permitted, replicate, retract,
};
pub use options::{CopyOptions, OnConflict};
pub use reconcile::{ReconcileSummary, RootReport, prune, reconcile, reconcile_root};
pub use supervisor::Supervisor;
pub use watch::{ActiveBackend, Change, WatchSession, classify};

/// Setting keys read by [`Config::from_env`].
pub mod keys {
    pub use crate::config::{
        LOCAL_FOLDER, NETWORK_FOLDER, SYNC_DELETE_GUARD, SYNC_FSYNC, SYNC_LAYOUT, SYNC_LOG,
        SYNC_ON_CONFLICT, SYNC_PARALLEL, SYNC_POLL_INTERVAL_MS, SYNC_RECONCILE,
        SYNC_WATCH_BACKEND, SYNC_WATCH_DEPTH,
    };
}
