// End-to-end tests for the geodiff binary.
// Run with: cargo test -p geodiff-cli --test cli_tests

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn geodiff() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_geodiff"));
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
    cmd
}

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../recon/tests/fixtures")
}

fn hydro_config() -> PathBuf {
    fixtures_dir().join("hydro.recon.toml")
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

// -------------------------------------------------------------------------
// validate
// -------------------------------------------------------------------------

#[test]
fn validate_accepts_fixture_config() {
    let out = geodiff().arg("validate").arg(hydro_config()).output().unwrap();
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    assert!(stderr(&out).contains("Hydrography refresh: ok"));
}

#[test]
fn validate_rejects_config_without_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.recon.toml");
    std::fs::write(&path, "name = \"nothing\"\n").unwrap();
    let out = geodiff().arg("validate").arg(&path).output().unwrap();
    assert_eq!(out.status.code(), Some(3));
    assert!(stderr(&out).contains("error in config:"));
}

#[test]
fn missing_config_is_usage_error() {
    let out = geodiff().args(["validate", "no/such.recon.toml"]).output().unwrap();
    assert_eq!(out.status.code(), Some(2));
}

// -------------------------------------------------------------------------
// run
// -------------------------------------------------------------------------

#[test]
fn run_with_skipped_entities_exits_6_after_full_output() {
    let out_dir = tempfile::tempdir().unwrap();
    let out = geodiff()
        .arg("run")
        .arg(hydro_config())
        .arg("--json")
        .arg("--output")
        .arg(out_dir.path())
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(6), "{}", stderr(&out));

    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["meta"]["config_name"], "Hydrography refresh");
    assert_eq!(report["reconciliation"]["modified"].as_array().map(Vec::len), Some(1));
    assert!(out_dir.path().join("ranking_wells.csv").is_file());
    assert!(out_dir.path().join("tracking.csv").is_file());

    let err = stderr(&out);
    assert!(err.contains("reconcile: 6 -> 5 rows, 2 added, 1 removed, 1 modified"));
    assert!(err.contains("'springs': no newer dataset to compare"));
}

#[test]
fn run_without_skips_exits_0() {
    let dir = tempfile::tempdir().unwrap();
    let config = format!(
        "name = \"hydro only\"\n\n[reconcile]\nkey_field = \"UID\"\n[reconcile.old]\nfile = \"{old}\"\n[reconcile.new]\nfile = \"{new}\"\n",
        old = fixtures_dir().join("old/hydro.csv").display(),
        new = fixtures_dir().join("new/hydro.csv").display(),
    );
    let path = dir.path().join("hydro.recon.toml");
    std::fs::write(&path, config).unwrap();

    let out = geodiff().arg("run").arg(&path).output().unwrap();
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    assert!(out.stdout.is_empty());
}

#[test]
fn unknown_key_field_is_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = format!(
        "name = \"bad key\"\n\n[reconcile]\nkey_field = \"GUID\"\n[reconcile.old]\nfile = \"{f}\"\n[reconcile.new]\nfile = \"{f}\"\n",
        f = fixtures_dir().join("old/hydro.csv").display(),
    );
    let path = dir.path().join("bad.recon.toml");
    std::fs::write(&path, config).unwrap();

    let out = geodiff().arg("run").arg(&path).output().unwrap();
    assert_eq!(out.status.code(), Some(4));
    assert!(stderr(&out).contains("error in load:"));
}

// -------------------------------------------------------------------------
// sanitize
// -------------------------------------------------------------------------

#[test]
fn sanitize_replaces_selected_values() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("parcels.csv");
    std::fs::write(&input, "UID,OWNER,ZONE\n1,n/a,R1\n2,Smith,n/a\n3,,C2\n").unwrap();
    let output = dir.path().join("clean.csv");

    let out = geodiff()
        .arg("sanitize")
        .arg(&input)
        .args(["--fields", "OWNER", "--find", "n/a", "--replace", "UNKNOWN", "--key", "UID", "-o"])
        .arg(&output)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "UID,OWNER,ZONE\n1,UNKNOWN,R1\n2,Smith,n/a\n3,,C2\n"
    );
    assert!(stderr(&out).contains("replaced 1 value(s)"));
}

#[test]
fn sanitize_fills_empty_cells_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("parcels.csv");
    std::fs::write(&input, "UID,OWNER\n1,\n2,Smith\n").unwrap();

    let out = geodiff().arg("sanitize").arg(&input).args(["--replace", "-", "--key", "UID"]).output().unwrap();
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    assert_eq!(String::from_utf8(out.stdout).unwrap(), "UID,OWNER\n1,-\n2,Smith\n");
}

#[test]
fn sanitize_unknown_field_exits_4() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("parcels.csv");
    std::fs::write(&input, "UID,OWNER\n1,x\n").unwrap();
    let out = geodiff().arg("sanitize").arg(&input).args(["--fields", "ZONE", "--replace", "-"]).output().unwrap();
    assert_eq!(out.status.code(), Some(4));
    assert!(stderr(&out).contains("error in sanitize:"));
}

#[test]
fn sanitize_where_limits_rows() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("parcels.csv");
    std::fs::write(&input, "UID,OWNER,ZONE\n1,,R1\n2,,C2\n").unwrap();

    let out = geodiff()
        .arg("sanitize")
        .arg(&input)
        .args(["--find", "none", "--replace", "-", "--key", "UID", "--where", "ZONE=R1|R2"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    assert_eq!(String::from_utf8(out.stdout).unwrap(), "UID,OWNER,ZONE\n1,-,R1\n2,,C2\n");
}

#[test]
fn sanitize_malformed_where_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("parcels.csv");
    std::fs::write(&input, "UID,OWNER\n1,x\n").unwrap();
    let out = geodiff().arg("sanitize").arg(&input).args(["--replace", "-", "--where", "ZONE"]).output().unwrap();
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("--where expects COLUMN=V1|V2"));
}
