//! Layout and reconciliation policy tests for the treemirror CLI.

#[path = "../common/mod.rs"]
mod common;

use common::TestFixture;
use std::fs;

#[test]
fn test_shared_layout_reports_collisions() {
    let fx = TestFixture::new(&["a", "b"]);
    fx.write(0, "readme.txt", "from a");
    fx.write(1, "readme.txt", "from b");
    fx.write(1, "only-b.txt", "b");

    fx.command("reconcile").assert().success();

    let collisions = fx.log_lines_with("COLLISION: ");
    assert_eq!(collisions.len(), 1);
    assert!(collisions[0].contains(&fx.mirror.join("readme.txt").display().to_string()));
    assert!(collisions[0].contains(&format!(
        "{}, {}",
        fx.root(0).display(),
        fx.root(1).display()
    )));
    // Roots are processed in order, so the later one wins
    fx.assert_file_content(&fx.mirror.join("readme.txt"), "from b");
}

#[test]
fn test_per_root_layout_namespaces_roots() {
    let fx = TestFixture::new(&["a", "b"]);
    fx.write(0, "readme.txt", "from a");
    fx.write(1, "readme.txt", "from b");

    fx.command("reconcile")
        .env("SYNC_LAYOUT", "per-root")
        .assert()
        .success();

    fx.assert_file_content(&fx.mirror.join("a/readme.txt"), "from a");
    fx.assert_file_content(&fx.mirror.join("b/readme.txt"), "from b");
    assert!(!fx.mirror.join("readme.txt").exists());
    assert!(fx.log_lines_with("COLLISION").is_empty());
}

#[test]
fn test_per_root_layout_rejects_clashing_names() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "readme.txt", "first");
    let other = fx.work.path().canonicalize().unwrap().join("elsewhere/a");
    fs::create_dir_all(&other).unwrap();
    fs::write(other.join("readme.txt"), "second").unwrap();

    fx.command("reconcile")
        .env("SYNC_LAYOUT", "per-root")
        .env(
            "LOCAL_FOLDER",
            format!("{};{}", fx.local_folder(), other.display()),
        )
        .assert()
        .success();

    fx.assert_file_content(&fx.mirror.join("a/readme.txt"), "first");
    assert_eq!(fx.log_lines_with("directory name already used").len(), 1);
}

#[test]
fn test_root_inside_destination_is_rejected() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");
    let nested = fx.mirror.join("inner");
    fs::create_dir_all(&nested).unwrap();

    fx.command("reconcile")
        .env(
            "LOCAL_FOLDER",
            format!("{};{}", fx.local_folder(), nested.display()),
        )
        .assert()
        .success();

    assert_eq!(fx.log_lines_with("overlaps the destination folder").len(), 1);
    assert!(fx.mirror.join("notes.txt").is_file());
}

#[test]
fn test_additive_reconcile_keeps_stale_entries() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");
    fs::create_dir_all(fx.mirror.join("old")).unwrap();
    fs::write(fx.mirror.join("old/stale.txt"), "stale").unwrap();

    fx.command("reconcile").assert().success();

    assert!(fx.mirror.join("old/stale.txt").exists());
    assert!(fx.log_lines_with("PRUNED").is_empty());
}

#[test]
fn test_prune_reconcile_removes_stale_entries() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");
    fx.write(0, "img/photo.png", "png");
    fs::create_dir_all(fx.mirror.join("old")).unwrap();
    fs::write(fx.mirror.join("old/stale.txt"), "stale").unwrap();
    fs::create_dir_all(fx.mirror.join("img")).unwrap();
    fs::write(fx.mirror.join("img/deleted.png"), "stale").unwrap();

    fx.command("reconcile")
        .env("SYNC_RECONCILE", "prune")
        .assert()
        .success();

    assert!(!fx.mirror.join("old").exists());
    assert!(!fx.mirror.join("img/deleted.png").exists());
    fx.assert_file_content(&fx.mirror.join("img/photo.png"), "png");
    fx.assert_file_content(&fx.mirror.join("notes.txt"), "hello");
    assert_eq!(fx.log_lines_with("PRUNED: ").len(), 2);
}

#[test]
fn test_prune_skipped_while_a_root_is_missing() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");
    fs::create_dir_all(&fx.mirror).unwrap();
    fs::write(fx.mirror.join("from-offline.txt"), "keep").unwrap();
    let offline = fx.work.path().join("local/offline");

    fx.command("reconcile")
        .env("SYNC_RECONCILE", "prune")
        .env(
            "LOCAL_FOLDER",
            format!("{};{}", fx.local_folder(), offline.display()),
        )
        .assert()
        .success();

    assert!(fx.mirror.join("from-offline.txt").exists());
    assert_eq!(fx.log_lines_with("SKIPPED pruning").len(), 1);
}

#[test]
fn test_prune_spares_log_inside_destination() {
    let fx = TestFixture::new(&["a"]);
    fx.write(0, "notes.txt", "hello");
    let log = fx.mirror.join(".treemirror/sync.log");

    fx.command("reconcile")
        .env("SYNC_RECONCILE", "prune")
        .env("SYNC_LOG", &log)
        .assert()
        .success();

    let text = fs::read_to_string(&log).unwrap();
    assert!(text.contains("Initial full sync completed for all folders."));
    assert!(!text.contains("PRUNED"));
}

#[test]
fn test_root_holding_the_log_is_rejected() {
    let fx = TestFixture::new(&["a", "b"]);
    fx.write(0, "notes.txt", "hello");
    fx.write(1, "other.txt", "other");
    let log = fx.root(1).join("logs/sync.log");

    fx.command("reconcile")
        .env("SYNC_LOG", &log)
        .assert()
        .success();

    let text = fs::read_to_string(&log).unwrap();
    let rejected: Vec<&str> = text
        .lines()
        .filter(|l| l.contains("contains the activity log file"))
        .collect();
    assert_eq!(rejected.len(), 1);
    assert!(rejected[0].contains(&fx.root(1).display().to_string()));
    fx.assert_file_content(&fx.mirror.join("notes.txt"), "hello");
    assert!(!fx.mirror.join("other.txt").exists());
    assert!(!fx.mirror.join("logs").exists());
}
