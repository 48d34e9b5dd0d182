use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("flowctl").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn version_prints_something() {
    let mut cmd = Command::cargo_bin("flowctl").unwrap();
    cmd.arg("--version");
    cmd.assert().success();
}

#[test]
fn missing_file_is_a_clean_error() {
    let mut cmd = Command::cargo_bin("flowctl").unwrap();
    cmd.args(["--file", "does-not-exist.yml", "check"]);
    cmd.assert().failure();
}
