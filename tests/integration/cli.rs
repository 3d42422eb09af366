//! Integration tests for the statewire binary

use super::common::fixtures::{component, pause_now};
use assert_cmd::Command;
use predicates::prelude::*;
use statewire::{Document, Heap, Root, Subscriber, Value};
use std::path::Path;

fn statewire(data_dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_statewire"));
    cmd.arg("--data-dir").arg(data_dir);
    cmd
}

/// Writes the state of a paused counter app and returns its path.
fn write_counter_snapshot(dir: &Path) -> std::path::PathBuf {
    let mut heap = Heap::new();
    let count = heap.signal(Value::from(0));
    let host = component(&mut heap, "Counter");
    heap.subscribe(count, Subscriber::Host { host });
    let root = heap.object([("count", Value::Object(count))]);

    let snapshot = pause_now(&mut heap, &mut Document::new("div"), &[Root::new(root)]).unwrap();
    let path = dir.join("state.json");
    std::fs::write(&path, &snapshot.state).unwrap();
    path
}

#[test]
fn test_inspect_lists_cells() {
    let tmp = tempfile::tempdir().unwrap();
    let state = write_counter_snapshot(tmp.path());

    statewire(tmp.path())
        .arg("inspect")
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("signal"))
        .stdout(predicate::str::contains("component"))
        .stdout(predicate::str::contains("roots:"));
}

#[test]
fn test_stats_counts_cells() {
    let tmp = tempfile::tempdir().unwrap();
    let state = write_counter_snapshot(tmp.path());

    statewire(tmp.path())
        .arg("stats")
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("cells"))
        .stdout(predicate::str::is_match(r"subscribed\s+1").unwrap());
}

#[test]
fn test_inspect_rejects_non_snapshot_file() {
    let tmp = tempfile::tempdir().unwrap();
    let bogus = tmp.path().join("bogus.json");
    std::fs::write(&bogus, "not json").unwrap();

    statewire(tmp.path())
        .arg("inspect")
        .arg(&bogus)
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not snapshot state JSON"));
}

#[test]
fn test_config_example_prints_bundled_file() {
    let tmp = tempfile::tempdir().unwrap();

    statewire(tmp.path())
        .args(["config", "--example"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[snapshot]"))
        .stdout(predicate::str::contains("long_string_threshold"));
}

#[test]
fn test_config_reads_explicit_file() {
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("custom.toml");
    std::fs::write(&config, "[snapshot]\ndev_mode = true\nlong_string_threshold = 4\n").unwrap();

    statewire(tmp.path())
        .arg("--config")
        .arg(&config)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("dev_mode = true"))
        .stdout(predicate::str::contains("long_string_threshold = 4"));
}

#[test]
fn test_config_defaults_without_file() {
    let tmp = tempfile::tempdir().unwrap();

    statewire(tmp.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("dev_mode = false"))
        .stdout(predicate::str::contains("long_string_threshold = 10"));
}
