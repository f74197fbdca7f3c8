//! Command-line tests against the built binary
//!
//! None of these reach a cluster: they stop at argument parsing, catalog
//! loading, the uninstall confirmation, or a kubeconfig pointing nowhere.

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn plinth() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_plinth"));
    cmd.env_remove("PLINTH_CONFIG")
        .env_remove("PLINTH_TIMEOUT_MULTIPLIER")
        .env("NO_COLOR", "1");
    cmd
}

fn run(args: &[&str]) -> Output {
    plinth().args(args).output().expect("failed to run plinth")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_help_lists_commands() {
    let output = run(&["--help"]);
    assert!(output.status.success());
    let help = stdout(&output);
    for command in ["install", "upgrade", "uninstall", "info"] {
        assert!(help.contains(command), "missing {command} in:\n{help}");
    }
}

#[test]
fn test_version() {
    let output = run(&["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_install_help_shows_catalog_options() {
    let output = run(&["install", "--help"]);
    assert!(output.status.success());
    let help = stdout(&output);
    assert!(help.contains("Platform options"));
    assert!(help.contains("--system-domain"));
    assert!(help.contains("--email"));
    assert!(help.contains("--skip-registry"));
    assert!(help.contains("--interactive"));
}

#[test]
fn test_uninstall_has_no_option_flags() {
    let output = run(&["uninstall", "--help"]);
    assert!(output.status.success());
    let help = stdout(&output);
    assert!(help.contains("--yes"));
    assert!(!help.contains("--system-domain"));
}

#[test]
fn test_custom_catalog_drives_flags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("platform.yaml");
    std::fs::write(
        &path,
        r#"
units:
  - id: app
    chart: plinth/app
    options:
      - name: replica_count
        kind: integer
        default: 2
        description: Number of app replicas
"#,
    )
    .unwrap();

    let output = run(&["--config", path.to_str().unwrap(), "install", "--help"]);
    assert!(output.status.success());
    let help = stdout(&output);
    assert!(help.contains("--replica-count"));
    assert!(help.contains("Number of app replicas"));
    assert!(!help.contains("--system-domain"));
}

#[test]
fn test_invalid_catalog_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("platform.yaml");
    std::fs::write(
        &path,
        "units:\n  - id: app\n    chart: a\n  - id: app\n    chart: b\n",
    )
    .unwrap();

    let output = run(&["--config", path.to_str().unwrap(), "info"]);
    assert_eq!(output.status.code(), Some(6));
    assert!(stderr(&output).contains("duplicate unit id 'app'"));
}

#[test]
fn test_missing_catalog_exit_code() {
    let output = run(&["--config", "/nonexistent/platform.yaml", "info"]);
    assert_eq!(output.status.code(), Some(6));
}

#[test]
fn test_help_and_version_survive_a_broken_catalog() {
    let output = plinth()
        .env("PLINTH_CONFIG", "/nonexistent/platform.yaml")
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("install"));

    let output = plinth()
        .env("PLINTH_CONFIG", "/nonexistent/platform.yaml")
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());

    let output = plinth()
        .env("PLINTH_CONFIG", "/nonexistent/platform.yaml")
        .args(["install", "--system-domain", "example.org"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(6));
}

#[test]
fn test_info_lists_units_without_a_cluster() {
    let dir = tempfile::tempdir().unwrap();
    let kubeconfig = dir.path().join("config");
    std::fs::write(
        &kubeconfig,
        r#"apiVersion: v1
kind: Config
clusters:
  - name: nowhere
    cluster:
      server: https://127.0.0.1:1
contexts:
  - name: nowhere
    context:
      cluster: nowhere
      user: nowhere
current-context: nowhere
users:
  - name: nowhere
    user:
      token: none
"#,
    )
    .unwrap();

    let output = plinth()
        .env("KUBECONFIG", &kubeconfig)
        .arg("info")
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr:\n{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Cluster unreachable"));
    for unit in ["traefik", "cert-manager", "gitea", "registry", "tekton-pipelines"] {
        assert!(out.contains(unit), "missing {unit} in:\n{out}");
    }
}

#[test]
fn test_unknown_option_flag_is_usage_error() {
    let output = run(&["install", "--no-such-option", "x"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_uninstall_declined_changes_nothing() {
    let mut child = plinth()
        .arg("uninstall")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(b"n\n").unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    assert!(stdout(&output).contains("Cancelled"));
}
