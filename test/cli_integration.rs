//! CLI Integration Tests for tagcall
//!
//! Runs the `tagcall` binary end to end against the fixture library.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

/// Get the path to the tagcall binary
fn tagcall_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tagcall"))
}

/// Get a temp directory for test outputs
fn temp_dir(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("tagcall_cli_{}_{}", name, std::process::id()));
    fs::create_dir_all(&path).ok();
    path
}

fn run(args: &[&str]) -> Output {
    Command::new(tagcall_binary())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run tagcall")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_tags_listing() {
    let output = run(&["tags"]);
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(text.contains(" 0  void"));
    assert!(text.contains(" 1  int32"));
    assert!(text.contains(" 7  unknown"));
}

#[test]
fn test_call_add_ints() {
    let Some(lib) = option_env!("TAGCALL_FIXTURE_LIB") else {
        return;
    };

    let output = run(&["call", lib, "add_ints", "int32:2", "int32:3"]);
    assert!(
        output.status.success(),
        "tagcall call failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(stdout(&output).trim(), "5 (int32)");
}

#[test]
fn test_call_json_output() {
    let Some(lib) = option_env!("TAGCALL_FIXTURE_LIB") else {
        return;
    };

    let output = run(&["call", lib, "greet", "string:cli", "--json"]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(json["tag"], "string");
    assert_eq!(json["value"], "hello, cli");
}

#[test]
fn test_resolve_symbols() {
    let Some(lib) = option_env!("TAGCALL_FIXTURE_LIB") else {
        return;
    };

    let output = run(&["resolve", lib, "add_ints", "free_int"]);
    assert!(output.status.success());

    let text = stdout(&output);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("add_ints 0x"));
    assert!(lines[1].starts_with("free_int 0x"));

    let output = run(&["resolve", lib, "missing_symbol"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing_symbol"));
}

#[test]
fn test_call_invalid_library() {
    let output = run(&["call", "/no/such/libnothing.so", "add_ints"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to open"));
}

#[test]
fn test_bad_argument_rejected() {
    let output = run(&["call", "irrelevant", "sym", "int32:not_a_number"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Bad argument"));
}

#[test]
fn test_config_search_path() {
    let Some(lib) = option_env!("TAGCALL_FIXTURE_LIB") else {
        return;
    };
    let lib = PathBuf::from(lib);
    let dir = temp_dir("config");
    let config = dir.join("tagcall.toml");
    fs::write(
        &config,
        format!(
            "[loader]\nsearch_paths = [{:?}]\nbinding = \"now\"\n",
            lib.parent().unwrap().display().to_string()
        ),
    )
    .unwrap();

    let output = run(&[
        "--config",
        config.to_str().unwrap(),
        "call",
        "tagcall_fixture",
        "echo",
        "int64:-12",
    ]);
    assert!(
        output.status.success(),
        "tagcall call failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(stdout(&output).trim(), "-12 (int64)");

    fs::remove_dir_all(&dir).ok();
}
