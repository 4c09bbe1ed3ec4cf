use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(
        data_dir.join("knowledge.json"),
        include_str!("fixtures/knowledge.json"),
    )
    .unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = r#"[dataset]
path = "../data/knowledge.json"

[retrieval]
top_n_docs = 3

[server]
bind = "127.0.0.1:7341"
log_level = "warn"
"#;
    let config_path = config_dir.join("ambient.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ambient(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_ambient"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("ANTHROPIC_API_KEY")
        .output()
        .expect("failed to run ambient binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_index_prints_stats() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_ambient(&config, &["index"]);
    assert!(success, "index failed: {}", stderr);
    assert!(stdout.contains("items:      5"), "stdout: {}", stdout);
    assert!(stdout.contains("digest:"));
}

#[test]
fn test_search_ranks_billing_doc_first() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_ambient(&config, &["search", "billing migration rollback"]);
    assert!(success, "search failed: {}", stderr);
    let first = stdout.lines().next().unwrap_or_default();
    assert!(
        first.starts_with("1. [") && first.contains("Billing Database Migration"),
        "stdout: {}",
        stdout
    );
    assert!(stdout.contains("chunks: proj-billing-migration#"));
}

#[test]
fn test_search_no_results() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_ambient(&config, &["search", "quasar nebula"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_suggest_prints_json_card() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_ambient(
        &config,
        &[
            "suggest",
            "is the billing migration rollback plan ready?",
            "--recipient",
            "user-priya",
        ],
    );
    assert!(success, "suggest failed: {}", stderr);
    let card: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(card["servingTier"], "retrieval");
    assert_eq!(card["sources"][0]["id"], "proj-billing-migration");
}

#[test]
fn test_suggest_rejects_unknown_recipient() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_ambient(
        &config,
        &["suggest", "billing migration", "--recipient", "user-nobody"],
    );
    assert!(!success);
    assert!(stderr.contains("Invalid recipientId"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_ambient(&tmp.path().join("nope.toml"), &["index"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
