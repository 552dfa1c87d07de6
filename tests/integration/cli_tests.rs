//! Binary invocations that never reach a container engine

use assert_cmd::{cargo::cargo_bin_cmd, Command};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const HELLO: &str = "parts:\n  hello:\n    plugin: nil\n    stage-packages: [curl]\n";

fn stagecraft(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("stagecraft");
    cmd.current_dir(dir.path())
        .env("STAGECRAFT_CONFIG", dir.path().join("config.toml"))
        .env_remove("RUST_LOG");
    cmd
}

fn project(parts: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("parts.yaml"), parts).unwrap();
    dir
}

#[test]
fn help_displays() {
    let dir = TempDir::new().unwrap();
    stagecraft(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Parts lifecycle driver that stages system packages",
        ));
}

#[test]
fn version_displays() {
    let dir = TempDir::new().unwrap();
    stagecraft(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("stagecraft"));
}

#[test]
fn plan_only_prime_prints_plan() {
    let dir = project(HELLO);
    stagecraft(&dir)
        .arg("--plan-only")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pull hello"))
        .stdout(predicate::str::contains("Prime hello"));

    let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1, "plan-only created files");
}

#[test]
fn plan_only_step_subcommand() {
    let dir = project(HELLO);
    stagecraft(&dir)
        .args(["build", "hello", "--plan-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Build hello"))
        .stdout(predicate::str::contains("Stage hello").not());
}

#[test]
fn pull_runs_without_engine() {
    let dir = project(HELLO);
    stagecraft(&dir)
        .arg("pull")
        .assert()
        .success()
        .stdout(predicate::str::contains("Execute: Pull hello"));
    assert!(dir.path().join("parts/hello/state/pull").is_file());

    stagecraft(&dir)
        .args(["pull", "--plan-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No actions to execute."));
}

#[test]
fn clean_cannot_be_planned() {
    let dir = project(HELLO);
    stagecraft(&dir)
        .args(["clean", "--plan-only"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Clean operations cannot be planned."));
}

#[test]
fn clean_all_parts() {
    let dir = project(HELLO);
    stagecraft(&dir).arg("pull").assert().success();

    stagecraft(&dir)
        .arg("clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("Clean all parts."));
    assert!(!dir.path().join("parts").exists());
}

#[test]
fn unknown_part_name() {
    let dir = project(HELLO);
    stagecraft(&dir)
        .args(["stage", "nope", "--plan-only"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains(
            "A part named 'nope' is not defined in the parts list.",
        ));
}

#[test]
fn invalid_parts_file() {
    let dir = project("parts:\n  hello:\n    plugin: make\n");
    stagecraft(&dir).arg("--plan-only").assert().code(2);
}

#[test]
fn missing_parts_file() {
    let dir = TempDir::new().unwrap();
    stagecraft(&dir).arg("--plan-only").assert().code(1);
}

#[test]
fn unknown_command_is_a_usage_error() {
    let dir = project(HELLO);
    stagecraft(&dir).arg("deploy").assert().code(4);
}

#[test]
fn missing_engine_fails_after_priming() {
    let dir = project("parts:\n  hello:\n    plugin: nil\n");
    fs::write(
        dir.path().join("config.toml"),
        "[engine]\nbinary = \"stagecraft-no-such-engine\"\n",
    )
    .unwrap();

    stagecraft(&dir)
        .arg("prime")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Execute: Prime hello"))
        .stderr(predicate::str::contains("stagecraft-no-such-engine"));
    assert!(dir.path().join("parts/hello/state/prime").is_file());
}
