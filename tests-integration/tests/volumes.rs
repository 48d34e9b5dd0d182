use assert_cmd::Command;
use std::fs;
use tempfile::tempdir;

const FLOW_WITH_LOCAL_VOLUME: &str = r#"
kind: job
id: demo
volumes:
  data:
    uri: "storage:/proj/data"
    mount: "/mnt/data"
    local: "./data"
jobs:
  main:
    image: "image:app:latest"
    cmd: "python train.py"
    volumes: [data]
"#;

const FLOW_WITH_BUILDABLE_IMAGE: &str = r#"
kind: job
id: demo
images:
  app:
    uri: "image:app:latest"
    context: "."
    dockerfile: "Dockerfile"
jobs:
  main:
    image: "image:app:latest"
    cmd: "python train.py"
"#;

fn flowctl() -> Command {
    Command::cargo_bin("flowctl").unwrap()
}

#[test]
fn upload_succeeds_when_the_underlying_cli_exits_zero() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("jobs.yml");
    fs::write(&flow_file, FLOW_WITH_LOCAL_VOLUME).unwrap();

    flowctl()
        .env("FLOWCTL_CLI_PROGRAM", "true")
        .args(["--file", flow_file.to_str().unwrap(), "upload", "data"])
        .assert()
        .success();
}

#[test]
fn upload_fails_when_the_underlying_cli_exits_nonzero() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("jobs.yml");
    fs::write(&flow_file, FLOW_WITH_LOCAL_VOLUME).unwrap();

    flowctl()
        .env("FLOWCTL_CLI_PROGRAM", "false")
        .args(["--file", flow_file.to_str().unwrap(), "upload", "data"])
        .assert()
        .failure();
}

#[test]
fn mkvolumes_runs_over_every_local_backed_volume() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("jobs.yml");
    fs::write(&flow_file, FLOW_WITH_LOCAL_VOLUME).unwrap();

    flowctl()
        .env("FLOWCTL_CLI_PROGRAM", "true")
        .args(["--file", flow_file.to_str().unwrap(), "mkvolumes"])
        .assert()
        .success();
}

#[test]
fn build_succeeds_for_a_buildable_image() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("jobs.yml");
    fs::write(&flow_file, FLOW_WITH_BUILDABLE_IMAGE).unwrap();

    flowctl()
        .env("FLOWCTL_CLI_PROGRAM", "true")
        .args(["--file", flow_file.to_str().unwrap(), "build", "app"])
        .assert()
        .success();
}

#[test]
fn build_rejects_an_image_with_no_dockerfile() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("jobs.yml");
    fs::write(
        &flow_file,
        r#"
kind: job
id: demo
images:
  app:
    uri: "image:app:latest"
jobs:
  main:
    image: "image:app:latest"
    cmd: "python train.py"
"#,
    )
    .unwrap();

    flowctl()
        .env("FLOWCTL_CLI_PROGRAM", "true")
        .args(["--file", flow_file.to_str().unwrap(), "build", "app"])
        .assert()
        .failure();
}
