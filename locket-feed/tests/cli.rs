//! End-to-end tests for the locket-feed binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

#[path = "../../liblocket/tests/common/mod.rs"]
mod common;

use common::{Reply, StubServer};

/// Serve `(status, body)` responses in order, repeating the last one
fn serve(responses: Vec<(u16, &str)>) -> String {
    let replies = responses
        .into_iter()
        .map(|(status, body)| Reply::text(status, body))
        .collect();
    StubServer::start(replies).base_url
}

/// Write a config file so the user's own config is never read
fn config_file(content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    (dir, path)
}

const PAGE_ONE: &str = r#"{"captions":[{"id":"a","caption":"first"},{"id":"b","caption":"second"}],"next_token":"t1"}"#;
const PAGE_TWO: &str = r#"{"captions":[{"id":"c","caption":"third"}],"next_token":null}"#;

#[test]
fn test_help_describes_formats() {
    Command::cargo_bin("locket-feed")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("OUTPUT FORMATS"))
        .stdout(predicate::str::contains("--manual-retries"));
}

#[test]
fn test_invalid_format_is_rejected() {
    Command::cargo_bin("locket-feed")
        .unwrap()
        .args(["--format", "xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_missing_url_is_config_error() {
    let (_dir, path) = config_file("");

    Command::cargo_bin("locket-feed")
        .unwrap()
        .env("LOCKET_CONFIG", &path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("feed.url"));
}

#[test]
fn test_first_page_only_by_default() {
    let base_url = serve(vec![(200, PAGE_ONE), (200, PAGE_TWO)]);
    let (_dir, path) = config_file("");

    Command::cargo_bin("locket-feed")
        .unwrap()
        .env("LOCKET_CONFIG", &path)
        .args(["--url", &format!("{}/captions", base_url)])
        .assert()
        .success()
        .stdout("a | first\nb | second\n");
}

#[test]
fn test_all_pages_as_jsonl() {
    let base_url = serve(vec![(200, PAGE_ONE), (200, PAGE_TWO)]);
    let (_dir, path) = config_file(&format!("[feed]\nurl = \"{}/captions\"\n", base_url));

    let output = Command::cargo_bin("locket-feed")
        .unwrap()
        .env("LOCKET_CONFIG", &path)
        .args(["--all", "--format", "jsonl"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let ids: Vec<String> = stdout
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["id"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn test_exhausted_retries_exit_with_feed_error() {
    let base_url = serve(vec![(500, "{}")]);
    let (_dir, path) = config_file(&format!(
        "[feed]\nurl = \"{}/captions\"\nbase_delay_ms = 10\n",
        base_url
    ));

    Command::cargo_bin("locket-feed")
        .unwrap()
        .env("LOCKET_CONFIG", &path)
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains(
            "Error: Feed error: Feed source unavailable: Could not load the feed. Please try again.",
        ))
        .stderr(predicate::function(|err: &str| {
            err.matches("Feed source unavailable").count() == 1
        }));
}

#[test]
fn test_manual_retry_recovers() {
    let base_url = serve(vec![
        (500, "{}"),
        (500, "{}"),
        (500, "{}"),
        (500, "{}"),
        (200, PAGE_TWO),
    ]);
    let (_dir, path) = config_file(&format!(
        "[feed]\nurl = \"{}/captions\"\nbase_delay_ms = 10\n",
        base_url
    ));

    Command::cargo_bin("locket-feed")
        .unwrap()
        .env("LOCKET_CONFIG", &path)
        .args(["--manual-retries", "1"])
        .assert()
        .success()
        .stdout("c | third\n");
}
