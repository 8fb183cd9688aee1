//! End-to-end tests for the `nestfit` binary.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn nestfit() -> Command {
    let mut cmd = Command::cargo_bin("nestfit").unwrap();
    cmd.env_remove("NESTFIT_RUN_DIR")
        .env_remove("NESTFIT_EXECUTABLE")
        .env_remove("NESTFIT_TOOL_VERSION");
    cmd
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_extents_prints_x_range() {
    let tmp = TempDir::new().unwrap();
    let data = write_file(tmp.path(), "line.csv", "1,10\n5,20\n3,15\n");

    nestfit()
        .arg("extents")
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::str::contains("xmin: 1"))
        .stdout(predicate::str::contains("xmax: 5"));
}

#[test]
fn test_extents_with_custom_layout() {
    let tmp = TempDir::new().unwrap();
    let data = write_file(tmp.path(), "counts.tsv", "10\t-4\n20\t7\n");

    nestfit()
        .args(["extents", "--specstr", "c,x"])
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::str::contains("xmin: -4"))
        .stdout(predicate::str::contains("xmax: 7"));
}

#[test]
fn test_config_writes_input_file() {
    let tmp = TempDir::new().unwrap();
    let data = write_file(tmp.path(), "line.csv", "1,10\n5,20\n3,15\n");
    let out = tmp.path().join("run");

    nestfit()
        .arg("config")
        .arg(&data)
        .args(["-e", "a*x+b", "--param", "a=2.5", "--livepoints", "500", "--xmax", "4"])
        .arg("--dir")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("nf_input.yaml"));

    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&fs::read_to_string(out.join("nf_input.yaml")).unwrap()).unwrap();
    assert_eq!(yaml["function"]["expression"].as_str(), Some("a*x+b"));
    assert_eq!(yaml["function"]["params"]["a"].as_f64(), Some(2.5));
    assert_eq!(yaml["search"]["livepoints"].as_u64(), Some(500));
    assert_eq!(yaml["data"]["xmin"].as_f64(), Some(1.0));
    assert_eq!(yaml["data"]["xmax"].as_f64(), Some(4.0));
}

#[test]
fn test_config_rejects_unknown_extension() {
    let tmp = TempDir::new().unwrap();
    let data = write_file(tmp.path(), "line.dat", "1 10\n");

    nestfit()
        .arg("config")
        .arg(&data)
        .arg("--dir")
        .arg(tmp.path())
        .assert()
        .failure();

    assert!(!tmp.path().join("nf_input.yaml").exists());
}

#[test]
fn test_bad_param_is_a_usage_error() {
    nestfit()
        .args(["config", "data.csv", "--param", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn test_show_prints_result_table() {
    let tmp = TempDir::new().unwrap();
    write_file(
        tmp.path(),
        "nf_output_res.json",
        r#"{"evidence": -11.9, "params": {"a": 1.5}}"#,
    );

    nestfit()
        .arg("show")
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("evidence"))
        .stdout(predicate::str::contains("params.a"))
        .stdout(predicate::str::contains("1.5"));
}

#[test]
fn test_show_without_result_fails() {
    let tmp = TempDir::new().unwrap();
    nestfit().arg("show").arg(tmp.path()).assert().failure();
}

#[cfg(unix)]
#[test]
fn test_run_against_stub_executable() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let data = write_file(tmp.path(), "line.csv", "1,10\n5,20\n3,15\n");
    let stub = write_file(
        tmp.path(),
        "nested_fit_stub",
        "#!/bin/sh\n\
         echo 'LO|1|-12.3'\n\
         echo '<ERROR>| prior too wide'\n\
         printf '{\"evidence\": -12.3}' > nf_output_res.json\n",
    );
    fs::set_permissions(&stub, fs::Permissions::from_mode(0o755)).unwrap();
    let run_dir = tmp.path().join("run");
    fs::create_dir(&run_dir).unwrap();

    nestfit()
        .arg("run")
        .arg(&data)
        .args(["-e", "a*x+b", "--silent", "--no-keep-yaml"])
        .arg("--dir")
        .arg(&run_dir)
        .arg("--executable")
        .arg(&stub)
        .assert()
        .success()
        .stdout(predicate::str::contains("<ERROR>| prior too wide"))
        .stdout(predicate::str::contains("evidence"));

    assert!(!run_dir.join("nf_input.yaml").exists());

    // Piped stdout is no terminal: the dashboard gives way to the error echo.
    let run_dir = tmp.path().join("dashboard");
    nestfit()
        .arg("run")
        .arg(&data)
        .args(["-e", "a*x+b"])
        .arg("--dir")
        .arg(&run_dir)
        .arg("--executable")
        .arg(&stub)
        .assert()
        .success()
        .stdout(predicate::str::contains("<ERROR>| prior too wide"))
        .stdout(predicate::str::contains("evidence"));

    assert!(run_dir.join("nf_output_res.json").exists());
}

#[test]
fn test_run_with_missing_executable_fails() {
    let tmp = TempDir::new().unwrap();
    let data = write_file(tmp.path(), "line.csv", "1,10\n5,20\n");

    nestfit()
        .arg("run")
        .arg(&data)
        .args(["-e", "a*x+b", "--silent", "--executable", "nested_fit-does-not-exist"])
        .arg("--dir")
        .arg(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("nested_fit-does-not-exist"));
}
