//! Common test utilities for integration tests.

#![allow(dead_code)]

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use treemirror::keys;

const ALL_KEYS: [&str; 12] = [
    keys::LOCAL_FOLDER,
    keys::NETWORK_FOLDER,
    keys::SYNC_LOG,
    keys::SYNC_WATCH_DEPTH,
    keys::SYNC_WATCH_BACKEND,
    keys::SYNC_POLL_INTERVAL_MS,
    keys::SYNC_DELETE_GUARD,
    keys::SYNC_RECONCILE,
    keys::SYNC_LAYOUT,
    keys::SYNC_ON_CONFLICT,
    keys::SYNC_PARALLEL,
    keys::SYNC_FSYNC,
];

/// Source roots, a destination folder and a log file under one temp dir.
pub struct TestFixture {
    pub work: TempDir,
    pub roots: Vec<PathBuf>,
    pub mirror: PathBuf,
    pub log: PathBuf,
}

impl TestFixture {
    /// Create one source root per name, plus an empty work area.
    ///
    /// The destination folder itself is not created; the binary does that.
    pub fn new(root_names: &[&str]) -> Self {
        let work = TempDir::new().expect("Failed to create temp work dir");
        let base = work.path().canonicalize().expect("Failed to resolve temp dir");

        let roots = root_names
            .iter()
            .map(|name| {
                let root = base.join("local").join(name);
                fs::create_dir_all(&root).expect("Failed to create source root");
                root
            })
            .collect();

        Self {
            mirror: base.join("network"),
            log: base.join("logs").join("sync.log"),
            roots,
            work,
        }
    }

    pub fn root(&self, index: usize) -> &Path {
        &self.roots[index]
    }

    /// Write `content` at `relative` inside root `index`, creating parents.
    pub fn write(&self, index: usize, relative: &str, content: &str) {
        let path = self.root(index).join(relative);
        fs::create_dir_all(path.parent().expect("relative path has a parent"))
            .expect("Failed to create directory");
        fs::write(path, content).expect("Failed to write file");
    }

    /// `;`-separated list of every root, as `LOCAL_FOLDER` expects.
    pub fn local_folder(&self) -> String {
        self.roots
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(";")
    }

    /// The binary running `subcommand`; see [`TestFixture::bare_command`].
    pub fn command(&self, subcommand: &str) -> Command {
        let mut cmd = self.bare_command();
        cmd.arg(subcommand);
        cmd
    }

    /// The binary without a subcommand, isolated from the caller's
    /// environment and `.env`, with the three core settings pointing into
    /// this fixture.
    pub fn bare_command(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("treemirror");
        cmd.current_dir(self.work.path()).env_remove("RUST_LOG");
        for key in ALL_KEYS {
            cmd.env_remove(key);
        }
        cmd.env(keys::LOCAL_FOLDER, self.local_folder())
            .env(keys::NETWORK_FOLDER, &self.mirror)
            .env(keys::SYNC_LOG, &self.log)
            .env(keys::SYNC_FSYNC, "false");
        cmd
    }

    /// Full text of the activity log.
    pub fn log_text(&self) -> String {
        fs::read_to_string(&self.log).expect("Failed to read activity log")
    }

    /// Activity log lines containing `needle`.
    pub fn log_lines_with(&self, needle: &str) -> Vec<String> {
        self.log_text()
            .lines()
            .filter(|l| l.contains(needle))
            .map(str::to_owned)
            .collect()
    }

    /// Check if a file exists and has the expected content.
    pub fn assert_file_content(&self, path: &Path, expected: &str) {
        assert!(path.exists(), "File does not exist: {:?}", path);
        let actual = fs::read_to_string(path).expect("Failed to read file");
        assert_eq!(actual, expected, "File content mismatch");
    }
}
