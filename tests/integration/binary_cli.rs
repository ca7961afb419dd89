//! Integration tests for the `actionmap` binary: exit codes, output and log files.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct Install {
    temp_dir: TempDir,
    config: PathBuf,
}

impl Install {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let config = root.join("actionmap.toml");
        fs::write(
            &config,
            format!(
                r#"
[paths]
data_dir = "{root}/data"
cache_dir = "{root}/cache"
runtime_dir = "{root}/run"

[lock]
poll_interval_ms = 20

[logging]
level = "info"
output = "file"
file = "{root}/logs/actionmap.log"
"#,
                root = root.display()
            ),
        )
        .unwrap();
        fs::create_dir_all(root.join("home")).unwrap();
        Self { temp_dir, config }
    }

    fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_actionmap"))
            .env("HOME", self.root().join("home"))
            .env("XDG_CONFIG_HOME", self.root())
            .env_remove("ACTIONMAP_PASSWORD")
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .output()
            .unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_first_run_installs_demo_and_logs_to_file() {
    let install = Install::new();
    let output = install.run(&["--output-as", "json", "widget", "list"]);

    assert!(
        output.status.success(),
        "widget list should succeed: stderr={:?}",
        stderr(&output)
    );
    assert_eq!(stdout(&output).trim(), r#"{"widgets":[]}"#);
    assert!(install.root().join("data/actionsmap/demo.yml").exists());

    let log = fs::read_to_string(install.root().join("logs/actionmap.log")).unwrap();
    assert!(
        log.contains("Actionmap CLI starting"),
        "log file should contain a startup message; got: {}",
        log.lines().next().unwrap_or("")
    );
    assert!(log.contains("processing action"));
}

#[test]
fn test_create_prints_plain_result() {
    let install = Install::new();
    let output = install.run(&[
        "--output-as",
        "plain",
        "--password",
        "demo",
        "widget",
        "create",
        "bolt",
        "-c",
        "red",
    ]);

    assert!(output.status.success(), "stderr={:?}", stderr(&output));
    assert!(stdout(&output).starts_with("#name\nbolt\n#color\nred"));
    assert!(stderr(&output).contains("Success! Widget created 'bolt'"));
}

#[test]
fn test_password_from_environment() {
    let install = Install::new();
    let output = Command::new(env!("CARGO_BIN_EXE_actionmap"))
        .env("HOME", install.root().join("home"))
        .env("XDG_CONFIG_HOME", install.root())
        .env("ACTIONMAP_PASSWORD", "wrong")
        .arg("--config")
        .arg(&install.config)
        .args(["widget", "create", "bolt", "-c", "red"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(77));
    assert!(stderr(&output).starts_with("Error:"));
}

#[test]
fn test_exit_codes() {
    let install = Install::new();

    let output = install.run(&["widget", "polish"]);
    assert_eq!(output.status.code(), Some(2), "usage errors exit 2");

    let output = install.run(&["widget", "show", "missing"]);
    assert_eq!(output.status.code(), Some(1), "action failures exit 1");
    assert!(stderr(&output).contains("not found"));

    // No password and no terminal to ask on.
    let output = install.run(&["widget", "create", "bolt", "-c", "red"]);
    assert_eq!(output.status.code(), Some(77));

    let output = Command::new(env!("CARGO_BIN_EXE_actionmap"))
        .env("HOME", install.root().join("home"))
        .env("XDG_CONFIG_HOME", install.root())
        .arg("--config")
        .arg(install.root().join("absent.toml"))
        .args(["widget", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(78), "bad configuration exits 78");
}

#[test]
fn test_help_lists_the_tree() {
    let install = Install::new();
    let output = install.run(&["widget", "--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for action in ["list", "show", "create", "delete", "part"] {
        assert!(text.contains(action), "help should list '{}': {}", action, text);
    }
}
