//! Startup configuration.
//!
//! Settings arrive as environment-style key/value pairs and are validated
//! once into a [`Config`]; nothing downstream re-parses strings.
//!
//! # Keys
//!
//! | Key | Meaning | Default |
//! |-----|---------|---------|
//! | `LOCAL_FOLDER` | `;`-separated absolute source roots | empty |
//! | `NETWORK_FOLDER` | absolute destination root | required |
//! | `SYNC_LOG` | absolute activity log path | required |
//! | `SYNC_WATCH_DEPTH` | recursion depth for live events | 20 |
//! | `SYNC_WATCH_BACKEND` | `native` or `poll` | `native` |
//! | `SYNC_POLL_INTERVAL_MS` | poll interval | 2000 |
//! | `SYNC_DELETE_GUARD` | `conservative` or `direct` | `conservative` |
//! | `SYNC_RECONCILE` | `additive` or `prune` | `additive` |
//! | `SYNC_LAYOUT` | `shared` or `per-root` | `shared` |
//! | `SYNC_ON_CONFLICT` | `overwrite` or `update-newer` | `overwrite` |
//! | `SYNC_PARALLEL` | parallel copies per directory | 16 |
//! | `SYNC_FSYNC` | fsync before rename | `true` |
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use treemirror::Config;
//!
//! let env = HashMap::from([
//!     ("NETWORK_FOLDER", "/mirror"),
//!     ("SYNC_LOG", "/var/log/treemirror.log"),
//! ]);
//! let config = Config::from_lookup(|key| env.get(key).map(|v| v.to_string()))?;
//! assert!(config.source_roots.is_empty());
//! # Ok::<(), treemirror::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::options::{CopyOptions, OnConflict};
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const LOCAL_FOLDER: &str = "LOCAL_FOLDER";
pub const NETWORK_FOLDER: &str = "NETWORK_FOLDER";
pub const SYNC_LOG: &str = "SYNC_LOG";
pub const SYNC_WATCH_DEPTH: &str = "SYNC_WATCH_DEPTH";
pub const SYNC_WATCH_BACKEND: &str = "SYNC_WATCH_BACKEND";
pub const SYNC_POLL_INTERVAL_MS: &str = "SYNC_POLL_INTERVAL_MS";
pub const SYNC_DELETE_GUARD: &str = "SYNC_DELETE_GUARD";
pub const SYNC_RECONCILE: &str = "SYNC_RECONCILE";
pub const SYNC_LAYOUT: &str = "SYNC_LAYOUT";
pub const SYNC_ON_CONFLICT: &str = "SYNC_ON_CONFLICT";
pub const SYNC_PARALLEL: &str = "SYNC_PARALLEL";
pub const SYNC_FSYNC: &str = "SYNC_FSYNC";

/// Separator between entries of [`LOCAL_FOLDER`].
pub const ROOT_SEPARATOR: char = ';';

/// Default for [`SYNC_WATCH_DEPTH`].
pub const DEFAULT_WATCH_DEPTH: usize = 20;

/// Default for [`SYNC_POLL_INTERVAL_MS`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Which safety predicate gates deletions coming from live events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteGuard {
    /// Only retract when the removed path's parent still exists in the source.
    ///
    /// A vanished parent usually means the source itself went away (a
    /// dismounted share), and deleting the mirror on that signal would be
    /// irreversible.
    #[default]
    Conservative,
    /// Retract whenever the destination path exists.
    Direct,
}

/// What the startup reconciliation does about destination-only entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileMode {
    /// Add and overwrite only; stale destination entries stay.
    #[default]
    Additive,
    /// Additionally retract destination entries with no source counterpart.
    Prune,
}

/// How source roots are laid out under the destination root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootLayout {
    /// Every root projects onto the destination root itself.
    #[default]
    Shared,
    /// Each root projects onto `destination/<root directory name>`.
    PerRoot,
}

/// Which notification source a watch session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchBackend {
    /// Platform watcher, falling back to polling if it cannot be set up.
    #[default]
    Native,
    /// Periodic scan at the given interval.
    Poll(Duration),
}

macro_rules! setting_enum {
    ($ty:ty, $expected:literal, { $($text:literal => $variant:path),+ $(,)? }) => {
        impl $ty {
            /// Setting value for this variant.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($variant => $text,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = &'static str;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($variant),)+
                    _ => Err($expected),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

setting_enum!(DeleteGuard, "conservative or direct", {
    "conservative" => DeleteGuard::Conservative,
    "direct" => DeleteGuard::Direct,
});

setting_enum!(ReconcileMode, "additive or prune", {
    "additive" => ReconcileMode::Additive,
    "prune" => ReconcileMode::Prune,
});

setting_enum!(RootLayout, "shared or per-root", {
    "shared" => RootLayout::Shared,
    "per-root" => RootLayout::PerRoot,
});

/// Why a configured source root was left inert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootRejection {
    /// Not an absolute path
    NotAbsolute,
    /// Does not exist
    Missing,
    /// Exists but is not a directory
    NotADirectory,
    /// Could not be resolved
    Unreadable(String),
    /// Same directory as an earlier root
    Duplicate,
    /// Contains, or is contained by, the destination root
    OverlapsDestination,
    /// Would share a per-root destination directory with an earlier root
    NamespaceTaken,
    /// The activity log file lives inside it, so every append would be
    /// mirrored and logged again
    ContainsLog,
}

impl fmt::Display for RootRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAbsolute => f.write_str("not an absolute path"),
            Self::Missing => f.write_str("does not exist"),
            Self::NotADirectory => f.write_str("not a directory"),
            Self::Unreadable(cause) => write!(f, "cannot be resolved: {cause}"),
            Self::Duplicate => f.write_str("duplicate of an earlier root"),
            Self::OverlapsDestination => f.write_str("overlaps the destination folder"),
            Self::NamespaceTaken => {
                f.write_str("directory name already used by an earlier root (per-root layout)")
            }
            Self::ContainsLog => f.write_str("contains the activity log file"),
        }
    }
}

/// A configured source root that will not be reconciled or watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRoot {
    /// Path as configured
    pub path: PathBuf,
    /// Why it was rejected
    pub reason: RootRejection,
}

/// Validated startup configuration. Read-only after construction.
#[derive(Debug, Clone)]
pub struct Config {
    /// Canonical, distinct, existing source roots in configuration order
    pub source_roots: Vec<PathBuf>,
    /// Roots that failed validation
    pub rejected_roots: Vec<RejectedRoot>,
    /// Destination root (created at startup if absent)
    pub destination_root: PathBuf,
    /// Activity log file (created at startup if absent)
    pub log_file: PathBuf,
    /// Live events deeper than this below a root are dropped. The native
    /// backend also stops subscribing directories past this depth.
    pub watch_depth: usize,
    /// Notification source
    pub watch_backend: WatchBackend,
    /// Deletion safety predicate
    pub delete_guard: DeleteGuard,
    /// Startup reconciliation policy
    pub reconcile_mode: ReconcileMode,
    /// Destination layout
    pub layout: RootLayout,
    /// Copy engine settings
    pub copy: CopyOptions,
}

impl Config {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup.
    ///
    /// # Errors
    ///
    /// Fails on a missing or relative destination/log path and on an
    /// optional setting that cannot be parsed. Bad source roots never fail;
    /// they end up in [`Config::rejected_roots`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let destination_root = required_path(NETWORK_FOLDER, get(NETWORK_FOLDER))?;
        let log_file = required_path(SYNC_LOG, get(SYNC_LOG))?;

        let watch_depth = parse_or(SYNC_WATCH_DEPTH, get(SYNC_WATCH_DEPTH), DEFAULT_WATCH_DEPTH, |v| {
            v.parse::<usize>().map_err(|_| "a non-negative integer")
        })?;

        let poll_interval = parse_or(
            SYNC_POLL_INTERVAL_MS,
            get(SYNC_POLL_INTERVAL_MS),
            DEFAULT_POLL_INTERVAL,
            |v| match v.parse::<u64>() {
                Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
                _ => Err("a positive number of milliseconds"),
            },
        )?;

        let watch_backend = parse_or(
            SYNC_WATCH_BACKEND,
            get(SYNC_WATCH_BACKEND),
            WatchBackend::Native,
            |v| match v.to_ascii_lowercase().as_str() {
                "native" => Ok(WatchBackend::Native),
                "poll" => Ok(WatchBackend::Poll(poll_interval)),
                _ => Err("native or poll"),
            },
        )?;

        let delete_guard = parse_or(SYNC_DELETE_GUARD, get(SYNC_DELETE_GUARD), DeleteGuard::default(), str::parse)?;
        let reconcile_mode = parse_or(SYNC_RECONCILE, get(SYNC_RECONCILE), ReconcileMode::default(), str::parse)?;
        let layout = parse_or(SYNC_LAYOUT, get(SYNC_LAYOUT), RootLayout::default(), str::parse)?;

        let on_conflict = parse_or(SYNC_ON_CONFLICT, get(SYNC_ON_CONFLICT), OnConflict::default(), |v| {
            v.parse::<OnConflict>().map_err(|()| "overwrite or update-newer")
        })?;
        let parallel = parse_or(SYNC_PARALLEL, get(SYNC_PARALLEL), CopyOptions::default().parallel, |v| {
            match v.parse::<usize>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err("a positive integer"),
            }
        })?;
        let fsync = parse_or(SYNC_FSYNC, get(SYNC_FSYNC), true, parse_bool)?;

        let mut copy = CopyOptions::default()
            .with_parallel(parallel)
            .with_on_conflict(on_conflict);
        if !fsync {
            copy = copy.without_fsync();
        }

        let (source_roots, rejected_roots) = validate_roots(
            get(LOCAL_FOLDER).as_deref().unwrap_or(""),
            &destination_root,
            &log_file,
            layout,
        );

        Ok(Self {
            source_roots,
            rejected_roots,
            destination_root,
            log_file,
            watch_depth,
            watch_backend,
            delete_guard,
            reconcile_mode,
            layout,
            copy,
        })
    }
}

fn required_path(key: &'static str, value: Option<String>) -> Result<PathBuf> {
    let path = PathBuf::from(value.ok_or(Error::MissingSetting(key))?);
    if !path.is_absolute() {
        return Err(Error::NotAbsolute { key, path });
    }
    Ok(path)
}

fn parse_or<T, F>(key: &'static str, value: Option<String>, default: T, parse: F) -> Result<T>
where
    F: FnOnce(&str) -> std::result::Result<T, &'static str>,
{
    match value {
        None => Ok(default),
        Some(value) => parse(&value).map_err(|expected| Error::InvalidSetting {
            key,
            value,
            expected,
        }),
    }
}

fn parse_bool(value: &str) -> std::result::Result<bool, &'static str> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err("true or false"),
    }
}

/// Split and validate the configured source roots.
///
/// A root holding `log_file` is rejected. Accepted roots are canonicalized; everything else is returned with the
/// reason, in configuration order.
pub fn validate_roots(
    raw: &str,
    destination_root: &Path,
    log_file: &Path,
    layout: RootLayout,
) -> (Vec<PathBuf>, Vec<RejectedRoot>) {
    let mut accepted: Vec<PathBuf> = Vec::new();
    let mut rejected: Vec<RejectedRoot> = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut namespaces: HashSet<std::ffi::OsString> = HashSet::new();

    let destination = destination_root
        .canonicalize()
        .unwrap_or_else(|_| destination_root.to_path_buf());
    let log_file = resolve_file(log_file);

    for entry in raw.split(ROOT_SEPARATOR).map(str::trim).filter(|e| !e.is_empty()) {
        let path = PathBuf::from(entry);
        let reject = |reason| RejectedRoot {
            path: path.clone(),
            reason,
        };

        if !path.is_absolute() {
            rejected.push(reject(RootRejection::NotAbsolute));
            continue;
        }

        let canonical = match path.canonicalize() {
            Ok(canonical) => canonical,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                rejected.push(reject(RootRejection::Missing));
                continue;
            }
            Err(e) => {
                rejected.push(reject(RootRejection::Unreadable(e.to_string())));
                continue;
            }
        };

        if !canonical.is_dir() {
            rejected.push(reject(RootRejection::NotADirectory));
            continue;
        }
        if canonical.starts_with(&destination) || destination.starts_with(&canonical) {
            rejected.push(reject(RootRejection::OverlapsDestination));
            continue;
        }
        if log_file.starts_with(&canonical) {
            rejected.push(reject(RootRejection::ContainsLog));
            continue;
        }
        if !seen.insert(canonical.clone()) {
            rejected.push(reject(RootRejection::Duplicate));
            continue;
        }
        if layout == RootLayout::PerRoot {
            let name = canonical.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            if !namespaces.insert(name) {
                rejected.push(reject(RootRejection::NamespaceTaken));
                continue;
            }
        }

        accepted.push(canonical);
    }

    (accepted, rejected)
}

/// Canonical form of a file that may not exist yet: the nearest existing
/// ancestor is resolved and the rest is appended.
fn resolve_file(path: &Path) -> PathBuf {
    let mut missing = Vec::new();
    let mut ancestor = path;
    loop {
        if let Ok(resolved) = ancestor.canonicalize() {
            return missing.iter().rev().fold(resolved, |acc, name| acc.join(name));
        }
        match (ancestor.parent(), ancestor.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                ancestor = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}
