//! Integration tests for the `wpl` CLI binary.

use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Test context with an isolated wpl home.
struct TestContext {
    _temp_dir: TempDir,
    wpl_home: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let wpl_home = temp_dir.path().join(".wpl");
        std::fs::create_dir_all(&wpl_home).expect("failed to create wpl home");
        Self {
            _temp_dir: temp_dir,
            wpl_home,
        }
    }

    fn wpl(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_wpl"))
            .args(args)
            .env("WPL_HOME", &self.wpl_home)
            .env_remove("WPL_CACHE_DIR")
            .env_remove("WPL_DATA_DIR")
            .env_remove("WPL_INDEX_URL")
            .env_remove("WPL_PYTHON")
            .env_remove("WPL_LOG")
            .output()
            .expect("failed to run wpl")
    }
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.wpl(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    for command in ["solve", "install", "pool", "links", "cache"] {
        assert!(stdout.contains(command), "help should mention {command}");
    }
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let output = ctx.wpl(&["--version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("wpl "));
}

#[test]
fn test_cache_list_empty() {
    let ctx = TestContext::new();
    let output = ctx.wpl(&["cache", "list"]);
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_cache_list_sorted() {
    let ctx = TestContext::new();
    let dir = ctx.wpl_home.join("cache").join("distributions");
    std::fs::create_dir_all(&dir).unwrap();
    for name in ["six-1.16.0-py2.py3-none-any.whl", "attrs-23.1.0.tar.gz", ".lock"] {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    let output = ctx.wpl(&["cache", "list"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "attrs-23.1.0.tar.gz\nsix-1.16.0-py2.py3-none-any.whl\n"
    );
}

#[test]
fn test_cache_dir_flag_overrides_home() {
    let ctx = TestContext::new();
    let custom = ctx.wpl_home.join("elsewhere");
    std::fs::create_dir_all(custom.join("distributions")).unwrap();
    std::fs::write(custom.join("distributions").join("demo-1.0.zip"), b"").unwrap();

    let output = ctx.wpl(&["cache", "list", "--cache-dir", custom.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "demo-1.0.zip\n");
}

#[test]
fn test_argument_errors_exit_two() {
    let ctx = TestContext::new();
    assert_eq!(ctx.wpl(&[]).status.code(), Some(2));
    assert_eq!(ctx.wpl(&["pool", "remove"]).status.code(), Some(2));
    assert_eq!(ctx.wpl(&["solve"]).status.code(), Some(2));

    let output = ctx.wpl(&["install"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("nothing to install"));
}

#[test]
fn test_invalid_config_is_a_runtime_failure() {
    let ctx = TestContext::new();
    std::fs::write(ctx.wpl_home.join("config.toml"), "unknown_key = 1\n").unwrap();
    let output = ctx.wpl(&["cache", "list"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[test]
fn test_missing_interpreter_is_a_runtime_failure() {
    let ctx = TestContext::new();
    let missing = ctx.wpl_home.join("no-such-python");
    let output = ctx.wpl(&["solve", "demo", "--python", missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
}
