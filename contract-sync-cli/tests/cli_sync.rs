#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

const COPY_GENERATOR: &str = r#"mkdir -p "$2/pkg" && cp "$1" "$2/pkg/openapi.src""#;
const FAILING_GENERATOR: &str = "echo 'unsupported schema construct' >&2; exit 1";

fn contract_sync(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("contract-sync"));
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env_remove("CONTRACT_SYNC_CONFIG")
        .env_remove("CONTRACT_SYNC_SOURCE")
        .env_remove("CONTRACT_SYNC_OUTPUT")
        .env_remove("CONTRACT_SYNC_GENERATOR")
        .env_remove("CONTRACT_SYNC_INTERVAL_SECS")
        .env_remove("CONTRACT_SYNC_ENV")
        .env("RUST_LOG", "warn");
    cmd
}

fn write_config(dir: &Path, script: &str) {
    let yaml = format!(
        "source: openapi.json\noutput: client\ngenerator:\n  command:\n    - sh\n    - -c\n    - '{script}'\n    - gen\n    - '{{input}}'\n    - '{{output}}'\n",
        script = script.replace('\'', "''"),
    );
    fs::write(dir.join("contract-sync.yaml"), yaml).expect("write config");
}

fn write_contract(dir: &Path, paths: &str) {
    fs::write(
        dir.join("openapi.json"),
        format!(r#"{{"openapi":"3.0.3","info":{{"title":"Regulations","version":"1.0"}},"paths":{paths}}}"#),
    )
    .expect("write contract");
}

#[test]
fn sync_regenerates_then_reports_unchanged() {
    let dir = TempDir::new().expect("dir");
    write_config(dir.path(), COPY_GENERATOR);
    write_contract(dir.path(), "{}");

    contract_sync(dir.path())
        .arg("sync")
        .assert()
        .success()
        .stdout(contains("regenerated client"));
    assert!(dir.path().join("client/pkg/openapi.src").exists());
    assert!(dir.path().join(".contract-sync/record.json").exists());

    contract_sync(dir.path())
        .arg("sync")
        .assert()
        .success()
        .stdout(contains("unchanged"));

    contract_sync(dir.path())
        .args(["sync", "--force", "--json"])
        .assert()
        .success()
        .stdout(contains(r#""result": "regenerated""#).and(contains(r#""forced": true"#)));
}

#[test]
fn fetch_failure_exits_with_two() {
    let dir = TempDir::new().expect("dir");
    write_config(dir.path(), COPY_GENERATOR);

    contract_sync(dir.path())
        .arg("sync")
        .assert()
        .code(2)
        .stderr(contains("fetch failed"));
    assert!(!dir.path().join("client").exists());
}

#[test]
fn generation_failure_exits_with_three_and_keeps_previous_client() {
    let dir = TempDir::new().expect("dir");
    write_config(dir.path(), COPY_GENERATOR);
    write_contract(dir.path(), "{}");
    contract_sync(dir.path()).arg("sync").assert().success();
    let record = fs::read_to_string(dir.path().join(".contract-sync/record.json")).expect("record");

    write_config(dir.path(), FAILING_GENERATOR);
    write_contract(dir.path(), r#"{"/regulations":{}}"#);
    contract_sync(dir.path())
        .arg("sync")
        .assert()
        .code(3)
        .stderr(contains("unsupported schema construct"));

    assert_eq!(
        fs::read_to_string(dir.path().join(".contract-sync/record.json")).expect("record"),
        record
    );
    assert!(dir.path().join("client/pkg/openapi.src").exists());
    assert!(!dir.path().join(".client.staging").exists());
}

#[test]
fn flags_work_without_config_file() {
    let dir = TempDir::new().expect("dir");
    write_contract(dir.path(), "{}");

    contract_sync(dir.path())
        .args([
            "sync",
            "--source",
            "openapi.json",
            "--output",
            "generated",
            "--generator",
            "cp -r {input} {output}",
            "--json",
        ])
        .assert()
        .success()
        .stdout(contains(r#""result": "regenerated""#));
    assert!(dir.path().join("generated").exists());
}

#[test]
fn repeated_generator_flag_keeps_arguments_with_spaces() {
    let dir = TempDir::new().expect("dir");
    write_contract(dir.path(), "{}");

    contract_sync(dir.path())
        .args([
            "sync",
            "--source",
            "openapi.json",
            "--output",
            "generated",
            "--generator",
            "sh",
            "--generator",
            "-c",
            "--generator",
            r#"mkdir -p "$2" && cp "$1" "$2/$3""#,
            "--generator",
            "gen",
            "--generator",
            "{input}",
            "--generator",
            "{output}",
            "--generator",
            "my api.json",
        ])
        .assert()
        .success();
    assert!(dir.path().join("generated/my api.json").exists());
}

#[test]
fn environment_variables_override_the_config_file() {
    let dir = TempDir::new().expect("dir");
    write_config(dir.path(), COPY_GENERATOR);
    fs::write(
        dir.path().join("staging.json"),
        r#"{"openapi":"3.0.3","info":{"title":"Staging","version":"1.0"},"paths":{}}"#,
    )
    .expect("write contract");

    contract_sync(dir.path())
        .env("CONTRACT_SYNC_SOURCE", "staging.json")
        .env("CONTRACT_SYNC_OUTPUT", "staging-client")
        .arg("sync")
        .assert()
        .success();
    assert!(dir.path().join("staging-client/pkg/openapi.src").exists());
    assert!(!dir.path().join("client").exists());
}

#[test]
fn env_flag_selects_a_profile_with_its_own_state() {
    let dir = TempDir::new().expect("dir");
    write_config(dir.path(), COPY_GENERATOR);
    let mut yaml = fs::read_to_string(dir.path().join("contract-sync.yaml")).expect("read");
    yaml.push_str("profiles:\n  prod:\n    output: client-prod\n");
    fs::write(dir.path().join("contract-sync.yaml"), yaml).expect("write config");
    write_contract(dir.path(), "{}");

    contract_sync(dir.path())
        .args(["sync", "--env", "prod"])
        .assert()
        .success()
        .stdout(contains("regenerated client-prod"));
    assert!(dir.path().join(".contract-sync/prod/record.json").exists());
    assert!(!dir.path().join("client").exists());

    contract_sync(dir.path())
        .args(["status", "--json"])
        .env("CONTRACT_SYNC_ENV", "prod")
        .assert()
        .success()
        .stdout(contains(r#""profile": "prod""#));

    contract_sync(dir.path())
        .args(["sync", "--env", "qa"])
        .assert()
        .code(1)
        .stderr(contains("unknown environment profile"));
}

#[test]
fn missing_configuration_is_exit_one() {
    let dir = TempDir::new().expect("dir");
    contract_sync(dir.path())
        .arg("sync")
        .assert()
        .code(1)
        .stderr(contains("missing required setting"));
}

#[test]
fn unknown_flag_is_exit_one() {
    let dir = TempDir::new().expect("dir");
    contract_sync(dir.path())
        .args(["sync", "--definitely-not-a-flag"])
        .assert()
        .code(1);
}

#[test]
fn status_reports_current_then_modified() {
    let dir = TempDir::new().expect("dir");
    write_config(dir.path(), COPY_GENERATOR);
    write_contract(dir.path(), "{}");

    contract_sync(dir.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(contains(r#""status": "never-synced""#));

    contract_sync(dir.path()).arg("sync").assert().success();
    contract_sync(dir.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(contains(r#""status": "current""#).and(contains(r#""api_version": "1.0""#)));

    fs::write(dir.path().join("client/pkg/extra.py"), "hand edit").expect("edit");
    contract_sync(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("MODIFIED"));
}

#[test]
fn diff_shows_added_paths_without_writing() {
    let dir = TempDir::new().expect("dir");
    write_config(dir.path(), COPY_GENERATOR);
    write_contract(dir.path(), "{}");
    contract_sync(dir.path()).arg("sync").assert().success();

    contract_sync(dir.path())
        .arg("diff")
        .assert()
        .success()
        .stdout(contains("No differences"));

    write_contract(dir.path(), r#"{"/regulations":{}}"#);
    contract_sync(dir.path())
        .arg("diff")
        .assert()
        .success()
        .stdout(contains("+    \"/regulations\": {}"));

    contract_sync(dir.path())
        .arg("sync")
        .assert()
        .success()
        .stdout(contains("regenerated"));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let dir = TempDir::new().expect("dir");
    contract_sync(dir.path())
        .args(["init", "--source", "https://api.example.com/openapi.json"])
        .assert()
        .success();
    let written = fs::read_to_string(dir.path().join("contract-sync.yaml")).expect("config");
    assert!(written.contains("https://api.example.com/openapi.json"));
    assert!(written.contains("{input}"));

    contract_sync(dir.path()).arg("init").assert().code(1);
    contract_sync(dir.path())
        .args(["init", "--force", "--output", "sdk"])
        .assert()
        .success();
}

#[test]
fn watch_stops_after_max_runs() {
    let dir = TempDir::new().expect("dir");
    write_config(dir.path(), COPY_GENERATOR);
    write_contract(dir.path(), "{}");

    contract_sync(dir.path())
        .args(["watch", "--max-runs", "1", "--json"])
        .assert()
        .success()
        .stdout(contains(r#""runs": 1"#).and(contains(r#""regenerated": 1"#)));
}

#[test]
fn watch_rejects_zero_max_runs() {
    let dir = TempDir::new().expect("dir");
    write_config(dir.path(), COPY_GENERATOR);
    write_contract(dir.path(), "{}");

    contract_sync(dir.path())
        .args(["watch", "--max-runs", "0"])
        .assert()
        .code(1);
    assert!(!dir.path().join("client").exists());
    assert!(!dir.path().join(".contract-sync/history.jsonl").exists());
}
