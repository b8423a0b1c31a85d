//! CLI end-to-end tests for the kombi binary.

mod common;

use assert_cmd::prelude::*;
use common::Fixture;
use predicates::prelude::*;
use std::process::Command;

#[allow(deprecated)]
fn kombi_cmd() -> Command {
    let mut cmd = Command::cargo_bin("kombi").unwrap();
    cmd.env_remove("KOMBI_CONFIG_PATH").env_remove("RUST_LOG");
    cmd
}

const COPY: &str = r#"{"tasks": [{"type": "copy", "target": "@ROOT@/outputs/copied/{baseName}"}]}"#;

#[test]
fn test_cli_no_args_shows_help() {
    kombi_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help() {
    kombi_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Content-pipeline orchestrator"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("list-types"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("exec-job").not());
}

#[test]
fn test_cli_version() {
    kombi_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("kombi"));
}

#[test]
fn test_list_types() {
    kombi_cmd()
        .arg("list-types")
        .assert()
        .success()
        .stdout(predicate::str::contains("Task kinds:"))
        .stdout(predicate::str::contains("copy"))
        .stdout(predicate::str::contains("exr"))
        .stdout(predicate::str::contains("Dispatchers: local, renderFarm"));
}

#[test]
fn test_list_types_json_includes_user_kinds() {
    let fixture = Fixture::new();
    let support = fixture.config(
        "support.json",
        r#"{"taskKinds": [{"name": "cliTestCopy", "base": "copy"}]}"#,
    );
    let output = kombi_cmd()
        .args(["list-types", "--json", "-c"])
        .arg(&support)
        .output()
        .unwrap();
    assert!(output.status.success());
    let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let tasks: Vec<&str> = listing["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t.as_str())
        .collect();
    assert!(tasks.contains(&"copy"));
    assert!(tasks.contains(&"cliTestCopy"));
}

#[test]
fn test_validate_valid_resources() {
    let fixture = Fixture::new();
    let path = fixture.config("valid.json", COPY);
    kombi_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Resources are valid"))
        .stdout(predicate::str::contains("Task trees: 1"));
}

#[test]
fn test_validate_malformed_json() {
    let fixture = Fixture::new();
    let path = fixture.file("broken.json", "{\"tasks\": [");
    kombi_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_validate_unknown_key() {
    let fixture = Fixture::new();
    let path = fixture.file("unknown.json", r#"{"taks": []}"#);
    kombi_cmd().arg("validate").arg(&path).assert().code(1);
}

#[test]
fn test_validate_without_path_is_config_error() {
    kombi_cmd()
        .arg("validate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No resource path given"));
}

#[test]
fn test_validate_missing_path() {
    kombi_cmd()
        .args(["validate", "/does/not/exist/kombi.json"])
        .assert()
        .code(1);
}

#[test]
fn test_run_local_copies_files() {
    let fixture = Fixture::new();
    fixture.text_inputs("plate", 3);
    let path = fixture.config("copy.json", COPY);
    kombi_cmd()
        .arg("run")
        .arg(&path)
        .arg(fixture.inputs())
        .assert()
        .success()
        .stdout(predicate::str::contains("copy"));
    assert_eq!(
        fixture.output_names("copied"),
        vec!["plate_01.txt", "plate_02.txt", "plate_03.txt"]
    );
}

#[test]
fn test_run_json_reporter() {
    let fixture = Fixture::new();
    fixture.text_inputs("plate", 1);
    let path = fixture.config("copy.json", COPY);
    let output = kombi_cmd()
        .arg("run")
        .arg(&path)
        .arg(fixture.inputs())
        .args(["--reporter", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let first = stdout.lines().next().unwrap();
    let event: serde_json::Value = serde_json::from_str(first).unwrap();
    assert_eq!(event["task"], "copy");
}

#[test]
fn test_run_unresolved_var_skips_unless_strict() {
    let fixture = Fixture::new();
    fixture.text_inputs("plate", 1);
    let path = fixture.config(
        "unresolved.json",
        r#"{"tasks": [{"type": "copy", "target": "@ROOT@/outputs/{shot}/{baseName}"}]}"#,
    );
    kombi_cmd()
        .arg("run")
        .arg(&path)
        .arg(fixture.inputs())
        .assert()
        .success();
    kombi_cmd()
        .arg("run")
        .arg(&path)
        .arg(fixture.inputs())
        .arg("--strict")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("shot"));
}

#[test]
fn test_run_unknown_dispatcher() {
    let fixture = Fixture::new();
    fixture.text_inputs("plate", 1);
    let path = fixture.config("copy.json", COPY);
    kombi_cmd()
        .arg("run")
        .arg(&path)
        .arg(fixture.inputs())
        .args(["--dispatcher", "cloud"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cloud"));
}

#[test]
fn test_run_split_through_subprocesses() {
    let fixture = Fixture::new();
    fixture.text_inputs("plate", 5);
    let path = fixture.config(
        "split.json",
        r#"{"tasks": [{
            "type": "copy",
            "target": "@ROOT@/outputs/copied/{baseName}",
            "metadata": {"dispatch.split": true}
        }]}"#,
    );
    kombi_cmd()
        .arg("run")
        .arg(&path)
        .arg(fixture.inputs())
        .args(["--split-size", "2"])
        .assert()
        .success();
    assert_eq!(fixture.output_names("copied").len(), 5);
}

#[test]
fn test_run_render_farm_then_drain() {
    let fixture = Fixture::new();
    fixture.text_inputs("plate", 2);
    let spool = fixture.root().join("spool");
    let path = fixture.config(
        "farm.json",
        r#"{"tasks": [{
            "type": "copy",
            "target": "@ROOT@/outputs/copied/{baseName}",
            "tasks": [{"type": "checksum", "target": "@ROOT@/outputs/copied/{baseName}"}]
        }]}"#,
    );
    kombi_cmd()
        .arg("run")
        .arg(&path)
        .arg(fixture.inputs())
        .args(["--dispatcher", "renderFarm", "--spool-dir"])
        .arg(&spool)
        .assert()
        .success()
        .stdout(predicate::str::contains("Submitted farm job 000001"));
    assert!(fixture.output_names("copied").is_empty());

    kombi_cmd()
        .args(["farm", "drain"])
        .arg(&spool)
        .assert()
        .success()
        .stdout(predicate::str::contains("4 completed, 0 failed"));
    assert_eq!(
        fixture.output_names("copied"),
        vec!["plate_01.txt", "plate_02.txt"]
    );
}

#[test]
fn test_exec_job_missing_file() {
    let fixture = Fixture::new();
    kombi_cmd()
        .arg("exec-job")
        .arg(fixture.root().join("job.json"))
        .arg(fixture.root().join("result.json"))
        .assert()
        .failure();
}
