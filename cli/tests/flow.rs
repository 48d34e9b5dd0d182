use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

const SIMPLE_FLOW: &str = r#"
kind: job
id: demo
jobs:
  main:
    image: "image:app:latest"
    cmd: "python train.py"
"#;

const DEPENDENT_VOLUME_FLOW: &str = r#"
kind: job
id: demo
volumes:
  data:
    uri: "storage:/proj/data"
    mount: "/mnt/data"
jobs:
  main:
    image: "image:app:latest"
    cmd: "python train.py"
    volumes: [data]
"#;

#[test]
fn check_accepts_a_well_formed_flow() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("jobs.yml");
    fs::write(&flow_file, SIMPLE_FLOW).unwrap();

    Command::cargo_bin("flowctl")
        .unwrap()
        .args(["--file", flow_file.to_str().unwrap(), "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("demo"));
}

#[test]
fn check_accepts_a_flow_with_volumes() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("jobs.yml");
    fs::write(&flow_file, DEPENDENT_VOLUME_FLOW).unwrap();

    Command::cargo_bin("flowctl")
        .unwrap()
        .args(["--file", flow_file.to_str().unwrap(), "check"])
        .assert()
        .success();
}

#[test]
fn check_rejects_malformed_yaml() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("jobs.yml");
    fs::write(&flow_file, "kind: job\nid: [not a scalar\n").unwrap();

    Command::cargo_bin("flowctl")
        .unwrap()
        .args(["--file", flow_file.to_str().unwrap(), "check"])
        .assert()
        .failure();
}

#[test]
fn check_rejects_unsupported_kind() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("jobs.yml");
    fs::write(&flow_file, "kind: pipeline\nid: demo\n").unwrap();

    Command::cargo_bin("flowctl")
        .unwrap()
        .args(["--file", flow_file.to_str().unwrap(), "check"])
        .assert()
        .failure();
}
