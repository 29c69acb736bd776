//! CLI Integration Tests for Replybank
//!
//! Runs the `replybank` binary against scratch training-data files.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn replybank(data_file: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_replybank"))
        .arg("--data-file")
        .arg(data_file)
        .args(["--seed", "7"])
        .args(args)
        .env_remove("DATA_FILE")
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run replybank")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_ask_prints_response_and_persists() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data.json");

    let output = replybank(&data, &["ask", "How do I cancel my ticket?"]);
    assert!(
        output.status.success(),
        "ask failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(!stdout(&output).trim().is_empty());

    let stats = replybank(&data, &["stats"]);
    assert!(stats.status.success());
    assert!(stdout(&stats).contains("Corpus size:         1"));
}

#[test]
fn test_ask_json() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data.json");

    let output = replybank(&data, &["ask", "--json", "Where is my bus?"]);
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["query"], "Where is my bus?");
    assert_eq!(value["status"], "Success");
}

#[test]
fn test_ask_empty_query_fails() {
    let dir = TempDir::new().unwrap();
    let output = replybank(&dir.path().join("data.json"), &["ask", "   "]);
    assert!(!output.status.success());
}

#[test]
fn test_classify() {
    let dir = TempDir::new().unwrap();
    let output = replybank(&dir.path().join("data.json"), &["classify", "I want to cancel"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Intent:   cancellation"), "{}", text);
    assert!(text.contains("Category: cancellation"), "{}", text);
}

#[test]
fn test_categories_lists_builtin_bank() {
    let dir = TempDir::new().unwrap();
    let output = replybank(&dir.path().join("data.json"), &["categories"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("cancellation"));
    assert!(text.contains("request_feedback"));
}

#[test]
fn test_reset_requires_confirmation() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data.json");
    replybank(&data, &["ask", "refund status"]);

    assert!(!replybank(&data, &["reset"]).status.success());
    assert!(replybank(&data, &["reset", "--yes"]).status.success());

    let stats = replybank(&data, &["stats"]);
    assert!(stdout(&stats).contains("Corpus size:         0"));
}

#[test]
fn test_chat_reads_stdin() {
    use std::io::Write;
    use std::process::Stdio;

    let dir = TempDir::new().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_replybank"))
        .arg("--data-file")
        .arg(dir.path().join("data.json"))
        .arg("chat")
        .env_remove("DATA_FILE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"hello\nwhere is my bus\nquit\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).lines().count() >= 3);
}
