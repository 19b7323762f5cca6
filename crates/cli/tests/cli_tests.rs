//! CLI integration tests

use std::process::Command;

fn scalectl(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "scalectl", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = scalectl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Replica Autoscaler"), "Should show app name");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("metrics"), "Should show metrics command");
    assert!(stdout.contains("history"), "Should show history command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = scalectl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("scalectl"), "Should show binary name");
}

/// Test history subcommand help
#[test]
fn test_history_help() {
    let output = scalectl(&["history", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "History help should succeed");
    assert!(stdout.contains("--service"), "Should show service option");
    assert!(stdout.contains("--limit"), "Should show limit option");
}

/// Test format and api-url options
#[test]
fn test_global_options() {
    let output = scalectl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("table"), "Should show table format");
    assert!(stdout.contains("json"), "Should show json format");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("SCALECTL_API_URL"), "Should show env var");
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = scalectl(&["scale-up"]);

    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}

/// Test invalid limit value
#[test]
fn test_invalid_limit() {
    let output = scalectl(&["history", "--limit", "many"]);

    assert!(!output.status.success(), "Non-numeric limit should fail");
}

/// Test unreachable API reports an error
#[test]
fn test_unreachable_api() {
    let output = scalectl(&["--api-url", "http://127.0.0.1:9", "status"]);

    assert!(!output.status.success(), "Unreachable API should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to send request"));
}
