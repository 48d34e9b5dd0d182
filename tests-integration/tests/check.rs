use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn flowctl() -> Command {
    Command::cargo_bin("flowctl").unwrap()
}

#[test]
fn finds_the_default_config_by_walking_upward() {
    let dir = tempdir().unwrap();
    let marker_dir = dir.path().join(".flowctl");
    fs::create_dir(&marker_dir).unwrap();
    fs::write(
        marker_dir.join("jobs.yml"),
        "kind: job\nid: demo\njobs:\n  main:\n    image: \"image:app:latest\"\n    cmd: \"echo hi\"\n",
    )
    .unwrap();

    let nested = dir.path().join("a/b/c");
    fs::create_dir_all(&nested).unwrap();

    flowctl()
        .current_dir(&nested)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("demo"));
}

#[test]
fn multi_job_parses_cleanly_but_run_without_a_suffix_is_rejected() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("jobs.yml");
    fs::write(
        &flow_file,
        r#"
kind: job
id: demo
jobs:
  train:
    image: "image:app:latest"
    cmd: "python train.py"
    multi: true
"#,
    )
    .unwrap();

    flowctl()
        .args(["--file", flow_file.to_str().unwrap(), "check"])
        .assert()
        .success();

    // multi-jobs require a --suffix to run; omitting one is an argument
    // misuse, not a crash or a hang.
    flowctl()
        .args(["--file", flow_file.to_str().unwrap(), "run", "train"])
        .assert()
        .failure();
}
