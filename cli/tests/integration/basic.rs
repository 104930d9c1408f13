//! Basic reconciliation tests for the treemirror CLI.

#[path = "../common/mod.rs"]
mod common;

use common::TestFixture;
use predicates::prelude::*;
use std::fs;

#[test]
fn test_reconcile_mirrors_files_and_directories() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");
    fx.write(0, "img/photo.png", "png");
    fx.write(0, "img/raw/2024/photo.cr2", "raw");

    fx.command("reconcile")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initial full sync completed for all folders."));

    fx.assert_file_content(&fx.mirror.join("notes.txt"), "hello");
    fx.assert_file_content(&fx.mirror.join("img/photo.png"), "png");
    fx.assert_file_content(&fx.mirror.join("img/raw/2024/photo.cr2"), "raw");

    let root = fx.root(0).display().to_string();
    assert_eq!(fx.log_lines_with(&format!("SYNCED: ({root})")).len(), 2);
    assert_eq!(
        fx.log_lines_with(&format!("Initial sync completed for: {root} (2 synced, 0 failed)"))
            .len(),
        1
    );
}

#[test]
fn test_log_lines_are_timestamped() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");

    fx.command("reconcile").assert().success();

    for line in fx.log_text().lines() {
        let (stamp, message) = line.split_once("] ").expect("line has a timestamp");
        assert!(stamp.starts_with('['), "bad line: {line}");
        assert!(stamp.ends_with('Z'), "not UTC: {line}");
        assert!(!message.is_empty());
    }
    let first = fx.log_text().lines().next().map(str::to_owned).unwrap_or_default();
    assert!(first.contains("Watching local folders: "));
}

#[test]
fn test_multiple_roots_share_destination() {
    let fx = TestFixture::new(&["a", "b"]);
    fx.write(0, "docs/a.txt", "from a");
    fx.write(1, "docs/b.txt", "from b");

    fx.command("reconcile").assert().success();

    fx.assert_file_content(&fx.mirror.join("docs/a.txt"), "from a");
    fx.assert_file_content(&fx.mirror.join("docs/b.txt"), "from b");
}

#[test]
fn test_reconcile_twice_appends_and_keeps_content() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");

    fx.command("reconcile").assert().success();
    let first_len = fx.log_text().lines().count();
    fx.command("reconcile").assert().success();

    fx.assert_file_content(&fx.mirror.join("notes.txt"), "hello");
    assert_eq!(fx.log_text().lines().count(), first_len * 2);
}

#[test]
fn test_update_newer_skips_unchanged_entries() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");
    fx.write(0, "img/photo.png", "png");

    fx.command("reconcile")
        .env("SYNC_ON_CONFLICT", "update-newer")
        .assert()
        .success();
    let synced_after_first = fx.log_lines_with("SYNCED: ").len();

    fx.command("reconcile")
        .env("SYNC_ON_CONFLICT", "update-newer")
        .assert()
        .success();

    assert_eq!(synced_after_first, 2);
    assert_eq!(fx.log_lines_with("SYNCED: ").len(), 2);
    assert_eq!(fx.log_lines_with("(2 synced, 0 failed)").len(), 2);
}

#[test]
fn test_settings_from_env_file() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");
    let env_file = fx.work.path().join("mirror.env");
    fs::write(&env_file, "SYNC_LAYOUT=per-root\n").unwrap();

    fx.command("reconcile")
        .arg("--env-file")
        .arg(&env_file)
        .assert()
        .success();

    fx.assert_file_content(&fx.mirror.join("a/notes.txt"), "hello");
}

#[test]
fn test_dotenv_in_working_directory() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");
    fs::write(fx.work.path().join(".env"), "SYNC_LAYOUT=per-root\n").unwrap();

    fx.command("reconcile").assert().success();

    assert!(fx.mirror.join("a/notes.txt").is_file());
}

#[test]
fn test_process_env_wins_over_env_file() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");
    fs::write(fx.work.path().join(".env"), "SYNC_LAYOUT=per-root\n").unwrap();

    fx.command("reconcile")
        .env("SYNC_LAYOUT", "shared")
        .assert()
        .success();

    assert!(fx.mirror.join("notes.txt").is_file());
}
