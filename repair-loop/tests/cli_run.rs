//! CLI tests for `repair-loop run` and `repair-loop batch`.
//!
//! Spawns the binary against a scratch project whose tools are `/bin/sh`
//! scripts and checks exit codes and JSON output.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use repair_loop::exit_codes;
use repair_loop::io::config::{RepairConfig, ToolSpec, ToolsConfig, write_config};
use serde_json::Value;

const CLEAN_REPORT: &str = r#"echo '{"totals":{"errors":0,"file_errors":0},"files":{}}'"#;
const DIRTY_REPORT: &str = r#"echo '{"files":{"a.php":{"messages":[{"message":"Undefined variable $x.","line":5}]}}}'; exit 1"#;

fn sh(script: &str) -> ToolSpec {
    ToolSpec {
        binary: PathBuf::from("/bin/sh"),
        args: vec![
            "-c".to_string(),
            script.to_string(),
            "tool".to_string(),
            "{target}".to_string(),
        ],
    }
}

/// Scratch project with a config pointing every tool at `/bin/sh`.
fn project(analyzer: &str) -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = RepairConfig {
        process_timeout_secs: 30,
        tools: ToolsConfig {
            rewriter: sh("exit 0"),
            analyzer: sh(analyzer),
            tests: sh("exit 0"),
            dry_run_flag: "--dry-run".to_string(),
        },
        ..RepairConfig::default()
    };
    write_config(&temp.path().join("repair-loop.toml"), &config).expect("write config");
    fs::write(temp.path().join("Order.php"), "<?php\n").expect("write target");
    temp
}

fn repair_loop(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_repair-loop"))
        .current_dir(root)
        .env_remove("ANTHROPIC_API_KEY")
        .env("RUST_LOG", "off")
        .args(args)
        .output()
        .expect("spawn repair-loop")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is json")
}

#[test]
fn clean_target_exits_ok_with_json_result() {
    let temp = project(CLEAN_REPORT);
    let output = repair_loop(
        temp.path(),
        &["run", "Order.php", "--dry-run", "--output", "json"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let json = stdout_json(&output);
    assert_eq!(json["success"], true);
    assert_eq!(json["iterations"], 1);
    assert_eq!(json["history"][0]["static_errors"], 0);
}

#[test]
fn unconverging_dry_run_exits_exhausted() {
    let temp = project(DIRTY_REPORT);
    let output = repair_loop(
        temp.path(),
        &[
            "run",
            "Order.php",
            "--dry-run",
            "--output",
            "json",
            "--max-iterations",
            "2",
        ],
    );

    assert_eq!(output.status.code(), Some(exit_codes::EXHAUSTED));
    let json = stdout_json(&output);
    assert_eq!(json["success"], false);
    assert_eq!(json["iterations"], 2);
    assert_eq!(json["final_errors"], 1);
    assert_eq!(fs::read_to_string(temp.path().join("Order.php")).expect("read"), "<?php\n");
}

#[test]
fn missing_target_prints_json_error() {
    let temp = project(CLEAN_REPORT);
    let output = repair_loop(
        temp.path(),
        &["run", "Missing.php", "--dry-run", "--output", "json"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let json = stdout_json(&output);
    assert_eq!(json["success"], false);
    assert!(
        json["error"]
            .as_str()
            .is_some_and(|e| e.contains("does not exist"))
    );
}

#[test]
fn live_run_requires_api_key() {
    let temp = project(CLEAN_REPORT);
    let output = repair_loop(temp.path(), &["run", "Order.php"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ANTHROPIC_API_KEY"));
}

#[test]
fn text_output_lists_history() {
    let temp = project(DIRTY_REPORT);
    let output = repair_loop(
        temp.path(),
        &["run", "Order.php", "--dry-run", "--max-iterations", "1"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::EXHAUSTED));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Repair incomplete after 1 iteration(s)."));
    assert!(stdout.contains("[1] errors: 1 | failures: 0 | rewriter: no | fix: no"));
}

#[test]
fn batch_records_failed_items_and_continues() {
    let temp = project(CLEAN_REPORT);
    fs::write(
        temp.path().join("worklist.toml"),
        "[[item]]\nid = \"order\"\npath = \"Order.php\"\npriority = 2\n\n\
         [[item]]\nid = \"ghost\"\npath = \"Ghost.php\"\npriority = 1\n",
    )
    .expect("write worklist");

    let output = repair_loop(
        temp.path(),
        &["batch", "worklist.toml", "--dry-run", "--cooldown-secs", "0"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::EXHAUSTED));
    let json = stdout_json(&output);
    assert_eq!(json["all_successful"], false);
    assert_eq!(json["total_processed"], 2);
    assert_eq!(json["success_count"], 1);
    assert_eq!(json["failure_count"], 1);
    assert_eq!(json["results"][0]["id"], "ghost");
    assert_eq!(json["results"][0]["final_errors"], -1);
    assert_eq!(json["results"][1]["id"], "order");
    assert_eq!(json["results"][1]["success"], true);
}

#[test]
fn invalid_config_is_rejected() {
    let temp = project(CLEAN_REPORT);
    fs::write(temp.path().join("repair-loop.toml"), "max_iterations = 0\n").expect("write");
    let output = repair_loop(temp.path(), &["run", "Order.php", "--dry-run"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_iterations"));
}
