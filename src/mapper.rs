//! Mapping of source paths onto the destination tree.
//!
//! A [`RootBinding`] ties one source root to the destination directory it
//! projects onto. Under the shared layout every binding projects onto the
//! destination root itself; under the per-root layout each binding gets its
//! own subdirectory named after the source root.

use crate::config::RootLayout;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One source root and the destination directory it is mirrored into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootBinding {
    source_root: PathBuf,
    destination: PathBuf,
}

impl RootBinding {
    /// Bind `source_root` to `destination_root` according to `layout`.
    pub fn new(source_root: &Path, destination_root: &Path, layout: RootLayout) -> Self {
        let destination = match layout {
            RootLayout::Shared => destination_root.to_path_buf(),
            RootLayout::PerRoot => match source_root.file_name() {
                Some(name) => destination_root.join(name),
                None => destination_root.to_path_buf(),
            },
        };
        Self {
            source_root: source_root.to_path_buf(),
            destination,
        }
    }

    /// The watched source root.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// The directory this root's relative structure lands in.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Whether `path` is the root itself or lies beneath it.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.source_root)
    }

    /// Path of `path` relative to the source root.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not inside the source root. Callers filter
    /// foreign paths with [`RootBinding::contains`] first.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        match path.strip_prefix(&self.source_root) {
            Ok(relative) => relative,
            Err(_) => panic!(
                "{} is outside source root {}",
                path.display(),
                self.source_root.display()
            ),
        }
    }

    /// Map a source path onto the destination tree.
    ///
    /// # Panics
    ///
    /// Same contract as [`RootBinding::relative`].
    pub fn map(&self, path: &Path) -> PathBuf {
        map_path(&self.source_root, &self.destination, path)
    }

    /// How many directories below the root `path` sits.
    ///
    /// Direct children of the root are depth 0; `None` for the root itself.
    pub fn depth_of(&self, path: &Path) -> Option<usize> {
        self.relative(path).components().count().checked_sub(1)
    }
}

/// Join the part of `path` below `root` onto `destination`.
///
/// # Panics
///
/// Panics if `path` is neither `root` nor a descendant of it; that is a
/// caller bug, not a runtime condition.
pub fn map_path(root: &Path, destination: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(relative) if relative.as_os_str().is_empty() => destination.to_path_buf(),
        Ok(relative) => destination.join(relative),
        Err(_) => panic!(
            "{} is outside source root {}",
            path.display(),
            root.display()
        ),
    }
}

/// A top-level name that more than one root projects onto the same place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    /// Destination path both roots write to
    pub destination: PathBuf,
    /// Roots containing the entry, in configuration order
    pub roots: Vec<PathBuf>,
}

/// Find top-level entries that two or more bindings would write to the same
/// destination path.
///
/// Roots that cannot be listed are skipped; the reconciler reports those.
pub fn find_collisions(bindings: &[RootBinding]) -> Vec<Collision> {
    let mut owners: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();

    for binding in bindings {
        let Ok(names) = top_level_names(binding.source_root()) else {
            continue;
        };
        for name in names {
            owners
                .entry(binding.destination().join(name))
                .or_default()
                .push(binding.source_root().to_path_buf());
        }
    }

    owners
        .into_iter()
        .filter(|(_, roots)| roots.len() > 1)
        .map(|(destination, roots)| Collision { destination, roots })
        .collect()
}

fn top_level_names(root: &Path) -> io::Result<Vec<std::ffi::OsString>> {
    fs::read_dir(root)?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect()
}
