//! Integration tests for the `healthdoc` binary.
//!
//! Only the paths that need no model service are exercised: `inspect`,
//! argument and config errors, and the missing-credential startup failure.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn healthdoc_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_healthdoc"))
}

fn setup_docs() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(docs.join("labs")).unwrap();
    fs::write(
        docs.join("visit.txt"),
        "Visit note.\n\nPatient reports improved sleep. Blood pressure 124/80.",
    )
    .unwrap();
    fs::write(
        docs.join("labs").join("lipids.txt"),
        "LDL 110 mg/dL. HDL 52 mg/dL.",
    )
    .unwrap();
    fs::write(docs.join("photo.jpg"), [0xffu8, 0xd8, 0xff]).unwrap();
    tmp
}

/// Run the binary in `dir` with a clean credential environment.
fn run(dir: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(healthdoc_binary())
        .current_dir(dir)
        .env_remove("OPENAI_API_KEY")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run healthdoc: {}", e));

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn inspect_walks_directories() {
    let tmp = setup_docs();
    let (stdout, stderr, ok) = run(tmp.path(), &["inspect", "docs"]);

    assert!(ok, "inspect failed: {}", stderr);
    assert!(stdout.contains("visit.txt"));
    assert!(stdout.contains("lipids.txt"));
    assert!(!stdout.contains("photo.jpg"));
    assert!(stdout.contains("Chunks:      1"));
}

#[test]
fn inspect_json_reports_failures_per_file() {
    let tmp = setup_docs();
    let (stdout, stderr, ok) = run(
        tmp.path(),
        &[
            "--output",
            "json",
            "inspect",
            "docs/visit.txt",
            "docs/photo.jpg",
        ],
    );

    assert!(ok, "inspect failed: {}", stderr);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let files = report["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["ok"], true);
    assert_eq!(files[1]["ok"], false);
    assert!(files[1]["error"].as_str().unwrap().contains("unsupported"));
    assert_eq!(report["chunks"], 1);
}

#[test]
fn inspect_honours_chunking_config() {
    let tmp = setup_docs();
    fs::write(
        tmp.path().join("small.toml"),
        "[chunking]\nchunk_size = 40\nchunk_overlap = 10\n",
    )
    .unwrap();

    let (stdout, stderr, ok) = run(
        tmp.path(),
        &[
            "--config",
            "small.toml",
            "--output",
            "json",
            "inspect",
            "docs",
        ],
    );

    assert!(ok, "inspect failed: {}", stderr);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(report["chunks"].as_u64().unwrap() > 1);
    assert!(report["max_chunk_chars"].as_u64().unwrap() <= 40);
}

#[test]
fn invalid_config_is_fatal() {
    let tmp = setup_docs();
    fs::write(
        tmp.path().join("healthdoc.toml"),
        "[chunking]\nchunk_size = 100\nchunk_overlap = 150\n",
    )
    .unwrap();

    let (_, stderr, ok) = run(tmp.path(), &["inspect", "docs"]);

    assert!(!ok);
    assert!(stderr.contains("chunk_overlap"));
}

#[test]
fn chat_without_credential_fails_at_startup() {
    let tmp = setup_docs();
    let (_, stderr, ok) = run(tmp.path(), &["chat", "docs"]);

    assert!(!ok);
    assert!(stderr.contains("OPENAI_API_KEY not found"));
}

#[test]
fn missing_path_is_reported() {
    let tmp = setup_docs();
    let (_, stderr, ok) = run(tmp.path(), &["inspect", "nowhere"]);

    assert!(!ok);
    assert!(stderr.contains("No such file or directory"));
}
