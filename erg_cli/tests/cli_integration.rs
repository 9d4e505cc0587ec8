use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Config with a private storage dir and timings short enough for tests.
fn write_fast_config(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    let storage = dir.path().join("store");
    let toml = format!(
        r#"
[storage]
dir = '{}'

[timing]
period_ms = 1
actuator_poll_ms = 1
settle_ms = 0
update_poll_ms = 1

[simulator]
sensor_interval_ms = 1
{extra}
"#,
        storage.display()
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn erg(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("erg").unwrap();
    cmd.arg("--config").arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "ok", "stdout")]
#[case(&["table", "show"], 0, "observed cells: 0", "stdout")]
#[case(
    &["ride", "--target-watts", "150", "--resistance", "5"],
    2,
    "cannot be used with",
    "stderr"
)]
#[case(&[], 2, "Usage", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir, "");

    let mut cmd = erg(&cfg);
    for a in args {
        cmd.arg(a);
    }
    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn invalid_config_is_reported_with_the_field() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir, "\n[table]\nwatt_size = 1\n");

    erg(&cfg)
        .arg("self-check")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("table.watt_size"));
}

#[test]
fn bad_table_csv_header_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir, "");

    let csv = dir.path().join("table.csv");
    let mut f = fs::File::create(&csv).unwrap();
    writeln!(f, "rpm,power,pos").unwrap();
    writeln!(f, "90,150,50000").unwrap();

    erg(&cfg)
        .arg("table")
        .arg("import")
        .arg(&csv)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid headers"));
}

#[test]
fn imported_rows_persist_across_invocations() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir, "");

    let csv = dir.path().join("table.csv");
    fs::write(&csv, "cadence,watts,position\n90,150,50000\n80,120,40000\n").unwrap();

    erg(&cfg)
        .arg("table")
        .arg("import")
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 stored"));

    erg(&cfg)
        .args(["table", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("observed cells: 2"));

    let out = dir.path().join("export.csv");
    erg(&cfg)
        .args(["table", "export", "--out"])
        .arg(&out)
        .assert()
        .success();
    let exported = fs::read_to_string(&out).unwrap();
    assert!(exported.starts_with("cadence,watts,position"));
    assert!(exported.contains("90,150,50000"));
    assert!(exported.contains("80,120,40000"));

    erg(&cfg).args(["table", "reset"]).assert().success();
    erg(&cfg)
        .args(["--json", "table", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"observed\":0"));
}

#[test]
fn json_ride_summary_has_the_expected_keys() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir, "");

    let output = erg(&cfg)
        .args(["--json", "--log-level", "warn", "ride"])
        .args(["--target-watts", "180", "--cycles", "20"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).unwrap();
    let line = stdout.lines().last().unwrap();
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    for key in [
        "cycles",
        "failed_cycles",
        "set_point",
        "final_watts",
        "position",
        "populated",
        "observed",
        "rows_notified",
    ] {
        assert!(v.get(key).is_some(), "missing {key} in {line}");
    }
    assert_eq!(v["cycles"], 20);
    assert_eq!(v["set_point"], 180);
}

#[test]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir, "");
    let text = fs::read_to_string(&cfg).unwrap().replace("period_ms = 1", "period_ms = 0");
    fs::write(&cfg, text).unwrap();

    let output = erg(&cfg).args(["--json", "self-check"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    let v: serde_json::Value = serde_json::from_str(stderr.lines().last().unwrap()).unwrap();
    assert_eq!(v["reason"], "Error");
    assert!(v["message"].as_str().unwrap().contains("timing.period_ms"));
}
