use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn shelf_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("shelf");
    path
}

/// Config whose every upstream points at a closed local port.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[server]
bind = "127.0.0.1:7332"

[db]
path = "{}/data/shelf.sqlite"

[search]
timeout_secs = 2
tavily_endpoint = "http://127.0.0.1:9/search"
exa_endpoint = "http://127.0.0.1:9/search"
duckduckgo_endpoint = "http://127.0.0.1:9/html/"

[curation]
enabled = false
"#,
        root.display()
    );

    let config_path = config_dir.join("shelf.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_shelf(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = shelf_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("TAVILY_API_KEY")
        .env_remove("EXA_API_KEY")
        .env_remove("AWS_ACCESS_KEY_ID")
        .env_remove("AWS_SECRET_ACCESS_KEY")
        .env_remove("S3_BUCKET")
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run shelf binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_shelf(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(tmp.path().join("data/shelf.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config) = setup_test_env();
    let (_, _, first) = run_shelf(&config, &["init"]);
    let (_, stderr, second) = run_shelf(&config, &["init"]);
    assert!(first);
    assert!(second, "second init failed: {}", stderr);
}

#[test]
fn test_init_requires_config_file() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let (_, stderr, success) = run_shelf(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config) = setup_test_env();
    let content = fs::read_to_string(&config).unwrap();
    fs::write(&config, content.replace("timeout_secs = 2", "cache_max = 0")).unwrap();
    let (_, stderr, success) = run_shelf(&config, &["vibe"]);
    assert!(!success);
    assert!(stderr.contains("cache_max"));
}

#[test]
fn test_vibe_reports_fallback_backend() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_shelf(&config, &["vibe"]);
    assert!(success, "vibe failed: {}", stderr);
    assert!(stdout.contains("duckduckgo"));
    assert!(stdout.contains("query cache:   0/200"));
    assert!(stdout.contains("result cache:  off"));
    assert!(stdout.contains("curation:      off"));
    assert!(stdout.contains("DuckDuckGo fallback is active."));
}

#[test]
fn test_search_empty_topic() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_shelf(&config, &["search", "  "]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_unreachable_backend_prints_placeholder() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_shelf(&config, &["search", "recursion", "--limit", "3"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("backend: duckduckgo"));
    assert!(stdout.contains("1. [0.00] article / Error"));
    assert!(!stdout.contains("2. "));
}

#[test]
fn test_bookshelf_unreachable_backend_prints_one_placeholder_per_topic() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_shelf(&config, &["bookshelf", "arrays", "linked lists"]);
    assert!(success, "bookshelf failed: {}", stderr);
    assert!(stdout.contains("1. [0.00] article / Error"));
    assert!(stdout.contains("2. [0.00] article / Error"));
    assert!(!stdout.contains("topic:"));
}

#[test]
fn test_bookshelf_content_type_filter() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_shelf(&config, &["bookshelf", "arrays", "--content-type", "video"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_bookshelf_requires_topics() {
    let (_tmp, config) = setup_test_env();
    let (_, _, success) = run_shelf(&config, &["bookshelf"]);
    assert!(!success);
}

#[test]
fn test_prewarm_remote_unreachable_fails() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_shelf(&config, &["prewarm", "--remote", "http://127.0.0.1:9"]);
    assert!(!success);
    assert!(stdout.contains("binary search, sorting algorithms, recursion, arrays, linked lists"));
    assert!(stderr.contains("Failed to reach http://127.0.0.1:9/bookshelf/prewarm"));
}

#[test]
fn test_prewarm_local_demo_topics() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_shelf(&config, &["prewarm"]);
    assert!(success, "prewarm failed: {}", stderr);
    assert!(stdout.contains("OK: 5 resources cached."));
    assert!(stdout.contains("Sample: Error ..."));
}

#[test]
fn test_missing_config_falls_back_for_vibe() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("absent.toml");
    let (stdout, _, success) = run_shelf(&missing, &["vibe"]);
    assert!(success);
    assert!(stdout.contains("backend:"));
}
