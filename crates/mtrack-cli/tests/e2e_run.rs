//! E2E tests for the `mtrack` binary: grouping modes, config, failures.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const HEADER: &str = "ID,ONDate,ONTime,OFFDate,OFFTime,endX,endY\n";

const TWO_MACHINES: &str = "A,2020/01/01,10:05:00,2020/01/01,10:10:00,1,1\n\
                            B,2020/01/01,10:20:00,2020/01/01,10:50:00,7,8\n\
                            A,2020/01/01,13:30:00,2020/01/01,13:45:00,2,2\n";

fn mtrack_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("mtrack"));
    cmd.current_dir(dir);
    cmd.env("MTRACK_LOG", "error");
    cmd.env("MTRACK_TIMEZONE", "utc");
    cmd.env("XDG_CONFIG_HOME", dir.join(".config"));
    cmd.env_remove("MTRACK_OUTPUT_DIR");
    cmd.env_remove("MTRACK_OVERLAP");
    cmd.env_remove("FORMAT");
    cmd
}

fn write_input(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("log.csv");
    fs::write(&path, format!("{HEADER}{body}")).unwrap();
    path
}

#[test]
fn id_mode_writes_one_file_per_machine() {
    let dir = TempDir::new().unwrap();
    write_input(dir.path(), TWO_MACHINES);

    mtrack_cmd(dir.path())
        .args(["id", "log.csv", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("A  4"));

    let a = fs::read_to_string(dir.path().join("by_id/A.csv")).unwrap();
    assert_eq!(
        a,
        "id,date,time,endX,endY\n\
         A,2020/01/01,11:00:00,no answer,no answer\n\
         A,2020/01/01,12:00:00,no answer,no answer\n\
         A,2020/01/01,13:00:00,1,1\n\
         A,2020/01/01,14:00:00,2,2\n"
    );
    let b = fs::read_to_string(dir.path().join("by_id/B.csv")).unwrap();
    assert_eq!(b, "id,date,time,endX,endY\nB,2020/01/01,11:00:00,7,8\n");
}

#[test]
fn date_mode_writes_one_file_per_hour() {
    let dir = TempDir::new().unwrap();
    write_input(dir.path(), TWO_MACHINES);

    mtrack_cmd(dir.path()).args(["date", "log.csv", "-q"]).assert().success();

    let eleven = fs::read_to_string(dir.path().join("by_date/2020_01_01_11_00_00.csv")).unwrap();
    assert_eq!(
        eleven,
        "id,date,time,endX,endY\n\
         A,2020/01/01,11:00:00,no answer,no answer\n\
         B,2020/01/01,11:00:00,7,8\n"
    );
    assert!(dir.path().join("by_date/2020_01_01_14_00_00.csv").exists());
}

#[test]
fn all_mode_json_summary_reports_one_destination() {
    let dir = TempDir::new().unwrap();
    write_input(dir.path(), "M1,2020/01/01,10:15:00,2020/01/01,13:30:00,9,8\n");

    let output = mtrack_cmd(dir.path())
        .args(["all", "log.csv", "--output-dir", "out", "--json"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json: Value = serde_json::from_slice(&output.stdout).expect("summary must be JSON");
    assert_eq!(json["grouping"], "all");
    assert_eq!(json["written_rows"], 4);
    assert_eq!(json["destinations"][0]["name"], "all");
    assert!(dir.path().join("out/by_all/all.csv").exists());
}

#[test]
fn all_mode_accepts_machines_active_at_the_same_time() {
    let dir = TempDir::new().unwrap();
    write_input(
        dir.path(),
        "A,2020/01/01,10:00:00,2020/01/01,11:30:00,1,1\n\
         B,2020/01/01,10:30:00,2020/01/01,10:45:00,2,2\n",
    );

    mtrack_cmd(dir.path()).args(["all", "log.csv", "-q"]).assert().success();
    assert!(dir.path().join("by_all/all.csv").exists());
}

#[test]
fn overlap_can_be_allowed_from_the_environment() {
    let dir = TempDir::new().unwrap();
    write_input(
        dir.path(),
        "M1,2020/01/01,10:00:00,2020/01/01,11:30:00,1,1\n\
         M1,2020/01/01,11:00:00,2020/01/01,11:10:00,2,2\n",
    );

    mtrack_cmd(dir.path())
        .env("MTRACK_OVERLAP", "allow")
        .args(["id", "log.csv", "-q"])
        .assert()
        .success();
}

#[test]
fn rerun_replaces_previous_output() {
    let dir = TempDir::new().unwrap();
    write_input(dir.path(), "M1,2020/01/01,10:15:00,2020/01/01,10:45:00,5,7\n");

    for _ in 0..2 {
        mtrack_cmd(dir.path()).args(["id", "log.csv", "-q"]).assert().success();
    }

    let body = fs::read_to_string(dir.path().join("by_id/M1.csv")).unwrap();
    assert_eq!(body.lines().count(), 2);
}

#[test]
fn invalid_mode_prints_usage() {
    let dir = TempDir::new().unwrap();
    write_input(dir.path(), "");

    mtrack_cmd(dir.path())
        .args(["weekly", "log.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn non_csv_input_is_rejected_before_reading() {
    let dir = TempDir::new().unwrap();

    mtrack_cmd(dir.path())
        .args(["id", "log.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(".csv"));
}

#[test]
fn missing_column_fails_without_output() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("log.csv"),
        "ID,ONDate,ONTime,OFFDate,OFFTime,endX\nM1,2020/01/01,10:15:00,2020/01/01,10:45:00,5\n",
    )
    .unwrap();

    mtrack_cmd(dir.path())
        .args(["id", "log.csv", "--format", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E2002]").and(predicate::str::contains("endY")));

    assert!(!dir.path().join("by_id/M1.csv").exists());
}

#[test]
fn bad_timestamp_reports_line_and_code() {
    let dir = TempDir::new().unwrap();
    write_input(dir.path(), "M1,2020/01/01,25:15:00,2020/01/01,10:45:00,5,7\n");

    let output = mtrack_cmd(dir.path())
        .args(["id", "log.csv", "--json"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let json: Value = serde_json::from_slice(&output.stderr).expect("error must be JSON");
    assert_eq!(json["error"]["error_code"], "E2003");
    assert!(json["error"]["message"].as_str().unwrap().contains("line 2"));
}

#[test]
fn overlap_needs_explicit_opt_in() {
    let dir = TempDir::new().unwrap();
    write_input(
        dir.path(),
        "M1,2020/01/01,10:00:00,2020/01/01,11:30:00,1,1\n\
         M1,2020/01/01,11:00:00,2020/01/01,11:10:00,2,2\n",
    );

    mtrack_cmd(dir.path())
        .args(["id", "log.csv", "--format", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E3001").and(predicate::str::contains("--allow-overlap")));

    mtrack_cmd(dir.path())
        .args(["id", "log.csv", "--allow-overlap", "-q"])
        .assert()
        .success();
    assert!(dir.path().join("by_id/M1.csv").exists());
}

#[test]
fn missing_input_file_is_reported() {
    let dir = TempDir::new().unwrap();

    mtrack_cmd(dir.path())
        .args(["id", "absent.csv", "--format", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2001"));
}

#[test]
fn project_config_sets_output_dir() {
    let dir = TempDir::new().unwrap();
    write_input(dir.path(), "M1,2020/01/01,10:15:00,2020/01/01,10:45:00,5,7\n");
    fs::write(dir.path().join("mtrack.toml"), "output_dir = \"results\"\n").unwrap();

    mtrack_cmd(dir.path()).args(["id", "log.csv", "-q"]).assert().success();
    assert!(dir.path().join("results/by_id/M1.csv").exists());
}

#[test]
fn broken_config_is_fatal() {
    let dir = TempDir::new().unwrap();
    write_input(dir.path(), "M1,2020/01/01,10:15:00,2020/01/01,10:45:00,5,7\n");
    fs::write(dir.path().join("mtrack.toml"), "output_dir = [\n").unwrap();

    mtrack_cmd(dir.path())
        .args(["id", "log.csv", "--format", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1001"));
}

#[test]
fn timing_report_goes_to_stderr() {
    let dir = TempDir::new().unwrap();
    write_input(dir.path(), "M1,2020/01/01,10:15:00,2020/01/01,10:45:00,5,7\n");

    mtrack_cmd(dir.path())
        .args(["id", "log.csv", "--timing", "-q"])
        .assert()
        .success()
        .stderr(predicate::str::contains("resolve"))
        .stdout(predicate::str::is_empty());
}
