use std::path::PathBuf;

use geodiff_recon::config::ReconConfig;
use geodiff_recon::export::export_report;
use geodiff_recon::loader::load_input;
use geodiff_recon::spatial::GeometryStatus;
use geodiff_recon::{run, PlanarBackend, ReconError, RunContext, RunReport, Side, Value};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_config(toml: &str) -> ReconConfig {
    ReconConfig::from_toml(toml).unwrap()
}

fn load_and_run(config: &ReconConfig) -> RunReport {
    let input = load_input(config, &fixtures_dir()).unwrap();
    run(config, &input, &PlanarBackend::default()).unwrap()
}

fn hydro_config() -> ReconConfig {
    let toml = std::fs::read_to_string(fixtures_dir().join("hydro.recon.toml")).unwrap();
    load_config(&toml)
}

fn keys<'a>(it: impl Iterator<Item = &'a Value>) -> Vec<f64> {
    it.map(|k| k.as_number().unwrap()).collect()
}

// -------------------------------------------------------------------------
// Reconcile
// -------------------------------------------------------------------------

#[test]
fn hydro_partition_drops_duplicate_keys() {
    let report = load_and_run(&hydro_config());
    let rec = report.reconciliation.as_ref().unwrap();

    assert_eq!(rec.old_dedup.rows_before, 6);
    assert_eq!(rec.old_dedup.rows_after, 4);
    assert_eq!(rec.old_dedup.duplicate_keys.len(), 1);
    assert_eq!(rec.new_dedup.dropped(), 0);

    // Key 4 only survives on the new side, so it reads as added.
    assert_eq!(keys(rec.added.keys()), vec![4.0, 6.0]);
    assert_eq!(keys(rec.removed.keys()), vec![5.0]);
}

#[test]
fn hydro_summary_counts_raw_rows() {
    let report = load_and_run(&hydro_config());
    let summary = &report.reconciliation.as_ref().unwrap().summary;
    assert_eq!(summary.old_count, 6);
    assert_eq!(summary.new_count, 5);
    assert_eq!(summary.added_fields, vec!["OWNER"]);
    assert!(summary.removed_fields.is_empty());
    assert!(!summary.spatial_ref_changed());
}

#[test]
fn hydro_attribute_changes() {
    let report = load_and_run(&hydro_config());
    let rec = report.reconciliation.as_ref().unwrap();

    assert_eq!(rec.compare_fields, vec!["NAME", "DEPTH"]);
    assert_eq!(rec.change_ledger.len(), 1);
    let m = &rec.modified[0];
    assert_eq!(m.key, Value::number(2.0));
    assert_eq!(m.field, "NAME");
    assert_eq!(m.old_value, Value::text("Lake B"));
    assert_eq!(m.new_value, Value::text("Lake B2"));
    assert_eq!(m.edit_count, 1);
}

#[test]
fn hydro_geometry_status_order() {
    let report = load_and_run(&hydro_config());
    let rec = report.reconciliation.as_ref().unwrap();
    let got: Vec<(f64, GeometryStatus)> =
        rec.geometry_status.iter().map(|s| (s.key.as_number().unwrap(), s.status)).collect();
    assert_eq!(
        got,
        vec![
            (1.0, GeometryStatus::GeometryConsistent),
            (2.0, GeometryStatus::GeometryConsistent),
            (3.0, GeometryStatus::GeometryModified),
            (5.0, GeometryStatus::RemovedFeature),
            (4.0, GeometryStatus::NewFeature),
            (6.0, GeometryStatus::NewFeature),
        ]
    );
}

#[test]
fn compare_fields_allow_list_must_exist_on_both_sides() {
    let toml = std::fs::read_to_string(fixtures_dir().join("hydro.recon.toml"))
        .unwrap()
        .replace("key_field = \"UID\"", "key_field = \"UID\"\ncompare_fields = [\"OWNER\"]");
    let config = load_config(&toml);
    let input = load_input(&config, &fixtures_dir()).unwrap();
    let err = run(&config, &input, &PlanarBackend::default()).unwrap_err();
    assert!(matches!(err, ReconError::SchemaMismatch { ref field, .. } if field == "OWNER"));
    assert_eq!(err.operation(), "compare_fields");
}

// -------------------------------------------------------------------------
// Ranking
// -------------------------------------------------------------------------

#[test]
fn wells_ranking_per_cell() {
    let report = load_and_run(&hydro_config());
    let ranking = &report.rankings[0];
    assert_eq!(ranking.name, "wells");

    let cells = &ranking.ranking.cells;
    assert_eq!(cells.len(), 2);
    assert_eq!((cells[0].id, cells[0].old_count, cells[0].new_count), (1, 1, 3));
    assert_eq!(cells[0].score, 3.0);
    assert_eq!(cells[0].ranking, 5);
    assert_eq!((cells[1].id, cells[1].old_count, cells[1].new_count), (2, 2, 1));
    assert_eq!(cells[1].ranking, -1);
    assert!(cells[0].ranking_length.is_none());
}

#[test]
fn one_sided_layer_is_skipped() {
    let report = load_and_run(&hydro_config());
    let springs = report.skipped.iter().find(|s| s.entity == "springs").unwrap();
    assert_eq!(springs.job, "wells");
    assert_eq!(springs.side, Side::New);
    assert_eq!(report.rankings[0].ranking.old_features, 3);
}

// -------------------------------------------------------------------------
// Tracking
// -------------------------------------------------------------------------

#[test]
fn roads_tracking_row() {
    let report = load_and_run(&hydro_config());
    let roads = report.tracking.iter().find(|r| r.table == "roads").unwrap();
    assert_eq!(roads.old_count, Some(3));
    assert_eq!(roads.new_count, Some(2));
    assert_eq!(roads.added_fields, vec!["SURFACE"]);
    assert_eq!(roads.length_change, Some(-5.0));
    assert_eq!(roads.issues, vec!["RECORDS DELETED", "FIELDS ADDED", "LENGTH REMOVED"]);
}

#[test]
fn filtered_tracking_compares_subset() {
    let toml = std::fs::read_to_string(fixtures_dir().join("hydro.recon.toml")).unwrap().replace(
        "name = \"roads\"",
        "name = \"roads\"\n[tracking.datasets.filter]\ncolumn = \"F_CODE\"\nvalues = [\"AQ040\"]",
    );
    let report = load_and_run(&load_config(&toml));
    let roads = report.tracking.iter().find(|r| r.table == "roads").unwrap();
    assert_eq!(roads.filter.as_deref(), Some("F_CODE=AQ040"));
    assert_eq!((roads.old_count, roads.new_count), (Some(1), Some(1)));
    assert_eq!(roads.issues, vec!["FIELDS ADDED"]);
}

#[test]
fn dataset_missing_on_old_side() {
    let report = load_and_run(&hydro_config());
    let lakes = report.tracking.iter().find(|r| r.table == "lakes").unwrap();
    assert_eq!(lakes.issues, vec!["NO OLDER DATASET TO COMPARE"]);
    assert_eq!(lakes.old_count, None);

    let skipped = report.skipped.iter().find(|s| s.entity == "lakes").unwrap();
    assert_eq!(skipped.side, Side::Old);
    assert_eq!(report.skipped.len(), 2);
}

// -------------------------------------------------------------------------
// Export
// -------------------------------------------------------------------------

#[test]
fn export_writes_every_table() {
    let config = hydro_config();
    let report = load_and_run(&config);
    let mut ctx = RunContext::new(config.effective_chunk_size()).unwrap();
    export_report(&mut ctx, &report).unwrap();

    let out = tempfile::tempdir().unwrap();
    ctx.persist(out.path()).unwrap();
    for name in [
        "summary.csv",
        "change_ledger.csv",
        "modified_records.csv",
        "added_features.csv",
        "removed_features.csv",
        "geometry_status.csv",
        "ranking_wells.csv",
        "tracking.csv",
        "report.json",
    ] {
        assert!(out.path().join(name).is_file(), "{name} not written");
    }

    let added = std::fs::read_to_string(out.path().join("added_features.csv")).unwrap();
    assert_eq!(added.lines().next(), Some("OBJECTID,UID,NAME,DEPTH,OWNER,WKT"));
    assert!(added.contains("13,6,New Lake,7,County,POINT (6 6)"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.path().join("report.json")).unwrap()).unwrap();
    assert_eq!(json["meta"]["config_name"], "Hydrography refresh");
    assert_eq!(json["skipped"].as_array().map(Vec::len), Some(2));
}

#[test]
fn missing_reconcile_file_is_skipped() {
    let toml = std::fs::read_to_string(fixtures_dir().join("hydro.recon.toml"))
        .unwrap()
        .replace("file = \"new/hydro.csv\"", "file = \"new/hydro_v2.csv\"");
    let report = load_and_run(&load_config(&toml));
    assert!(report.reconciliation.is_none());
    let s = report.skipped.iter().find(|s| s.job == "reconcile").unwrap();
    assert_eq!(s.side, Side::New);
    assert!(s.reason.contains("no newer dataset"));
}
