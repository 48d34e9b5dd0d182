use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

const TWO_JOB_FLOW: &str = r#"
kind: job
id: demo
jobs:
  alpha:
    image: "image:app:latest"
    cmd: "python a.py"
  beta:
    image: "image:app:latest"
    cmd: "python b.py"
"#;

#[test]
fn ps_lists_every_declared_job_even_without_a_remote() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("jobs.yml");
    fs::write(&flow_file, TWO_JOB_FLOW).unwrap();

    Command::cargo_bin("flowctl")
        .unwrap()
        .args(["--file", flow_file.to_str().unwrap(), "ps"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha"))
        .stdout(predicate::str::contains("beta"));
}

#[test]
fn status_of_an_unscheduled_job_is_not_found() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("jobs.yml");
    fs::write(&flow_file, TWO_JOB_FLOW).unwrap();

    Command::cargo_bin("flowctl")
        .unwrap()
        .args(["--file", flow_file.to_str().unwrap(), "status", "alpha"])
        .assert()
        .failure();
}
