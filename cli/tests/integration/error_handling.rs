//! Error handling integration tests for the treemirror CLI.
//!
//! Only configuration and log-sink problems stop the process. Everything
//! else is written to the activity log and the run carries on.

#[path = "../common/mod.rs"]
mod common;

use common::TestFixture;
use predicates::prelude::*;
use std::fs;

#[test]
fn test_missing_destination_setting_exits_2() {
    let fx = TestFixture::new(&["a"]);

    fx.command("reconcile")
        .env_remove("NETWORK_FOLDER")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("missing required setting NETWORK_FOLDER"));

    assert!(!fx.log.exists());
}

#[test]
fn test_relative_log_path_exits_2() {
    let fx = TestFixture::new(&["a"]);

    fx.command("reconcile")
        .env("SYNC_LOG", "logs/sync.log")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("SYNC_LOG must be an absolute path"));
}

#[test]
fn test_invalid_policy_value_exits_2() {
    let fx = TestFixture::new(&["a"]);

    fx.command("reconcile")
        .env("SYNC_DELETE_GUARD", "yolo")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("expected conservative or direct"));
}

#[test]
fn test_missing_env_file_exits_2() {
    let fx = TestFixture::new(&["a"]);

    fx.command("reconcile")
        .arg("--env-file")
        .arg(fx.work.path().join("nope.env"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to load env file"));
}

#[test]
fn test_unwritable_log_is_fatal() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");
    let blocker = fx.work.path().join("blocker");
    fs::write(&blocker, "file").unwrap();

    fx.command("reconcile")
        .env("SYNC_LOG", blocker.join("sync.log"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot write activity log"));

    assert!(!fx.mirror.join("notes.txt").exists());
}

#[test]
fn test_no_subcommand_runs_watch() {
    let fx = TestFixture::new(&["a"]);

    // Reaches configuration loading instead of stopping at a usage error
    fx.bare_command()
        .env_remove("NETWORK_FOLDER")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing required setting NETWORK_FOLDER"))
        .stderr(predicate::str::contains("Usage").not());

    let blocker = fx.work.path().join("blocker");
    fs::write(&blocker, "file").unwrap();
    fx.bare_command()
        .env("SYNC_LOG", blocker.join("sync.log"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot write activity log"));
}

#[test]
fn test_missing_root_is_logged_not_fatal() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");
    let missing = fx.work.path().join("local/offline");

    fx.command("reconcile")
        .env("LOCAL_FOLDER", format!("{};{}", missing.display(), fx.local_folder()))
        .assert()
        .success();

    let ignored = fx.log_lines_with("ERROR source folder");
    assert_eq!(ignored.len(), 1);
    assert!(ignored[0].contains(&format!("{} ignored: does not exist", missing.display())));
    fx.assert_file_content(&fx.mirror.join("notes.txt"), "hello");
}

#[test]
fn test_relative_and_duplicate_roots_are_rejected() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");

    fx.command("reconcile")
        .env(
            "LOCAL_FOLDER",
            format!("relative/dir;{};{}", fx.local_folder(), fx.local_folder()),
        )
        .assert()
        .success();

    assert_eq!(fx.log_lines_with("ignored: not an absolute path").len(), 1);
    assert_eq!(fx.log_lines_with("ignored: duplicate of an earlier root").len(), 1);
    assert!(fx.mirror.join("notes.txt").is_file());
}

#[test]
fn test_empty_root_list_degrades_to_nothing() {
    let fx = TestFixture::new(&[]);

    fx.command("reconcile")
        .env("LOCAL_FOLDER", " ; ")
        .assert()
        .success();

    assert!(fx.log_text().contains("Watching local folders: (none)"));
    assert!(fx.log_text().contains("Initial full sync completed for all folders."));
}

#[cfg(unix)]
#[test]
fn test_unreadable_entry_fails_once_and_others_sync() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "a.txt", "a");
    fx.write(0, "b.txt", "b");
    std::os::unix::fs::symlink(fx.root(0).join("missing-target"), fx.root(0).join("dangling"))
        .unwrap();

    fx.command("reconcile").assert().success();

    fx.assert_file_content(&fx.mirror.join("a.txt"), "a");
    fx.assert_file_content(&fx.mirror.join("b.txt"), "b");
    let errors = fx.log_lines_with("ERROR syncing");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("dangling"));
    assert_eq!(fx.log_lines_with("(2 synced, 1 failed)").len(), 1);
}

#[test]
fn test_destination_occupied_by_file_leaves_roots_inert() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");
    fs::write(&fx.mirror, "not a folder").unwrap();

    fx.command("reconcile").assert().success();

    assert_eq!(fs::read_to_string(&fx.mirror).unwrap(), "not a folder");
    assert_eq!(fx.log_lines_with("nothing will be synced").len(), 1);
    assert!(fx.log_lines_with("Initial sync started").is_empty());
}
