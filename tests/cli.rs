//! CLI behavior tests over the compiled binary.
//!
//! Covers argument validation and the offline commands; everything that
//! would reach the network is exercised in the library tests instead.

#![allow(clippy::panic, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn docent() -> Command {
    let mut cmd = Command::cargo_bin("docent-rs").unwrap();
    cmd.env_remove("DOCENT_DOCS_DIR")
        .env_remove("DOCENT_DATA_DIR")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    docent()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("query"))
        .stdout(predicate::str::contains("tools"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("init-prompts"));
}

#[test]
fn test_missing_docs_dir_fails() {
    docent()
        .arg("ingest")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[command]"))
        .stderr(predicate::str::contains("docs directory is required"));
}

#[test]
fn test_unknown_format_rejected() {
    docent()
        .args(["--format", "yaml", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown output format 'yaml'"));
}

#[test]
fn test_unknown_mode_rejected() {
    let docs = tempfile::tempdir().unwrap();
    docent()
        .arg("--docs-dir")
        .arg(docs.path())
        .args(["query", "anything", "--mode", "hybrid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown query mode 'hybrid'"));
}

#[test]
fn test_init_prompts_writes_templates() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("prompts");

    docent()
        .arg("init-prompts")
        .arg("--dir")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("prompt template(s) to:"));

    assert!(target.join("qa.md").exists());
    assert!(target.join("top_agent.md").exists());
    assert!(target.join("rerank.md").exists());

    // A second run leaves existing templates alone.
    docent()
        .arg("init-prompts")
        .arg("--dir")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 0 prompt template(s)"))
        .stdout(predicate::str::contains("already exist"));
}

#[test]
fn test_init_prompts_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("prompts");

    let output = docent()
        .args(["--format", "json", "init-prompts", "--dir"])
        .arg(&target)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["count"], 7);
    assert!(value["directory"].as_str().unwrap().ends_with("prompts"));
}

#[test]
fn test_query_requires_an_argument() {
    docent().arg("query").assert().failure().code(2);
}
