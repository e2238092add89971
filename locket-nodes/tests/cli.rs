//! End-to-end tests for the locket-nodes binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

#[path = "../../liblocket/tests/common/mod.rs"]
mod common;

use common::{Reply, StubServer};

/// A node that always answers with `status` and `body`
fn node(status: u16, body: &str) -> String {
    StubServer::start(vec![Reply::text(status, body)]).base_url
}

fn empty_config() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "").unwrap();
    (dir, path)
}

fn locket_nodes(config: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("locket-nodes").unwrap();
    cmd.env("LOCKET_CONFIG", config);
    cmd
}

#[test]
fn test_help_lists_exit_codes() {
    Command::cargo_bin("locket-nodes")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_watch_rejects_zero_interval() {
    let (_dir, config) = empty_config();
    let api = node(200, "{}");

    locket_nodes(&config)
        .args(["--node", &api, "--watch", "--interval", "0s"])
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("must be greater than zero"));
}

#[test]
fn test_no_nodes_is_invalid_input() {
    let (_dir, config) = empty_config();

    locket_nodes(&config)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No nodes to check"));
}

#[test]
fn test_all_nodes_up() {
    let (_dir, config) = empty_config();
    let api = node(200, r#"{"version":"1.4.2","uptime":0}"#);

    locket_nodes(&config)
        .args(["--node", &api])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Node 1"))
        .stdout(predicate::str::contains("version 1.4.2"));
}

#[test]
fn test_down_node_fails_the_check() {
    let (_dir, config) = empty_config();
    let up = node(200, "{}");
    let down = node(503, "");

    locket_nodes(&config)
        .args(["--node", &up, "--node", &down])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("✗ Node 2"))
        .stderr(predicate::str::contains("1 node(s) down"));
}

#[test]
fn test_json_report() {
    let (_dir, config) = empty_config();
    let api = node(200, "{}");
    let db = node(200, r#"{"version":"db-7"}"#);

    let output = locket_nodes(&config)
        .args(["--node", &api, "--database", &db, "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["api"][0]["name"], "Node 1");
    assert_eq!(report["api"][0]["kind"], "api");
    assert_eq!(report["api"][0]["is_up"], true);
    assert_eq!(report["database"]["kind"], "db");
    assert_eq!(report["database"]["version"], "db-7");
    assert!(report["custom"].is_null());
}

#[test]
fn test_verify_rejects_malformed_url() {
    let (_dir, config) = empty_config();

    locket_nodes(&config)
        .args(["--verify", "ftp://example.com"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("http or https"));
}

#[test]
fn test_verify_accepts_live_backend() {
    let (_dir, config) = empty_config();
    let backend = node(200, "");

    locket_nodes(&config)
        .args(["--verify", &backend])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Custom Node"));
}

#[test]
fn test_verify_refuses_down_backend() {
    let (_dir, config) = empty_config();
    let backend = node(500, "");

    locket_nodes(&config)
        .args(["--verify", &backend])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("not responding"));
}
