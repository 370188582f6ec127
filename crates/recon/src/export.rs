//! CSV + JSON export of a run report. Files are staged in the run context
//! and only land in the output directory on `RunContext::persist`.

use std::fmt::Display;
use std::io::Write;

use crate::attributes::{ChangeLedgerEntry, ModifiedRecord};
use crate::context::RunContext;
use crate::error::ReconError;
use crate::geometry::{Geometry, GeometryKind};
use crate::model::{RankingReport, ReconciliationReport, RunReport};
use crate::snapshot::{FeatureCollection, TabularSnapshot};
use crate::spatial::StatusRecord;
use crate::summary::SummaryRecord;
use crate::tracking::TrackingRow;

const OPERATION: &str = "export";

type CsvWriter<W> = csv::Writer<W>;

fn writer<W: Write>(w: W) -> CsvWriter<W> {
    csv::WriterBuilder::new().terminator(csv::Terminator::Any(b'\n')).from_writer(w)
}

fn csv_err(e: impl Display) -> ReconError {
    ReconError::io(OPERATION, e)
}

fn write_row<W: Write>(wtr: &mut CsvWriter<W>, row: &[String]) -> Result<(), ReconError> {
    wtr.write_record(row).map_err(csv_err)
}

fn finish<W: Write>(mut wtr: CsvWriter<W>) -> Result<(), ReconError> {
    wtr.flush().map_err(csv_err)
}

fn opt<T: Display>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn wkt(g: Option<&Geometry>) -> String {
    g.map(Geometry::to_wkt).unwrap_or_default()
}

fn header(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Reconciliation tables
// ---------------------------------------------------------------------------

pub fn write_summary<W: Write>(w: W, s: &SummaryRecord) -> Result<(), ReconError> {
    let mut wtr = writer(w);
    write_row(&mut wtr, &header(&["OLD_COUNT", "NEW_COUNT", "REMOVE_FIELDS", "ADDED_FIELDS", "SR_OLD", "SR_NEW"]))?;
    write_row(
        &mut wtr,
        &[
            s.old_count.to_string(),
            s.new_count.to_string(),
            s.removed_fields.join(","),
            s.added_fields.join(","),
            opt(s.old_spatial_ref),
            opt(s.new_spatial_ref),
        ],
    )?;
    finish(wtr)
}

pub fn write_change_ledger<W: Write>(w: W, ledger: &[ChangeLedgerEntry]) -> Result<(), ReconError> {
    let mut wtr = writer(w);
    write_row(&mut wtr, &header(&["KEY", "FIELD", "OLD_VALUE", "NEW_VALUE"]))?;
    for e in ledger {
        write_row(&mut wtr, &[e.key.to_string(), e.field.clone(), e.old_value.to_string(), e.new_value.to_string()])?;
    }
    finish(wtr)
}

pub fn write_modified<W: Write>(w: W, modified: &[ModifiedRecord]) -> Result<(), ReconError> {
    let mut wtr = writer(w);
    write_row(&mut wtr, &header(&["KEY", "EDIT_COUNT", "FIELD", "OLD_VALUE", "NEW_VALUE"]))?;
    for m in modified {
        write_row(
            &mut wtr,
            &[
                m.key.to_string(),
                m.edit_count.to_string(),
                m.field.clone(),
                m.old_value.to_string(),
                m.new_value.to_string(),
            ],
        )?;
    }
    finish(wtr)
}

/// Same columns as the source snapshot, geometry last as WKT.
pub fn write_features<W: Write>(w: W, features: &FeatureCollection) -> Result<(), ReconError> {
    let mut wtr = writer(w);
    let mut head: Vec<String> = features.fields.iter().map(|f| f.name.clone()).collect();
    if let Some(g) = &features.geometry_field {
        head.push(g.clone());
    }
    write_row(&mut wtr, &head)?;
    for r in &features.records {
        let mut row: Vec<String> = r.values.iter().map(|v| v.to_string()).collect();
        if features.geometry_field.is_some() {
            row.push(wkt(r.geometry.as_ref()));
        }
        write_row(&mut wtr, &row)?;
    }
    finish(wtr)
}

/// Whole snapshot, in the layout the loader reads back.
pub fn write_snapshot<W: Write>(w: W, snapshot: &TabularSnapshot) -> Result<(), ReconError> {
    let mut wtr = writer(w);
    write_row(&mut wtr, &snapshot.field_names())?;
    for row in 0..snapshot.row_count() {
        let mut values: Vec<String> = (0..snapshot.fields().len()).map(|c| snapshot.value(row, c).to_string()).collect();
        if snapshot.has_geometry() {
            values.push(wkt(snapshot.geometry(row)));
        }
        write_row(&mut wtr, &values)?;
    }
    finish(wtr)
}

pub fn write_geometry_status<W: Write>(w: W, records: &[StatusRecord]) -> Result<(), ReconError> {
    let mut wtr = writer(w);
    write_row(&mut wtr, &header(&["KEY", "STATUS", "WKT"]))?;
    for r in records {
        write_row(&mut wtr, &[r.key.to_string(), r.status.to_string(), wkt(r.geometry.as_ref())])?;
    }
    finish(wtr)
}

// ---------------------------------------------------------------------------
// Ranking + tracking tables
// ---------------------------------------------------------------------------

/// One row per grid cell. Length and area columns appear only for the
/// geometry kinds that rank them.
pub fn write_ranking<W: Write>(w: W, report: &RankingReport) -> Result<(), ReconError> {
    let kind = report.ranking.geometry_kind;
    let lengths = kind != GeometryKind::Point;
    let areas = kind == GeometryKind::Polygon;

    let mut head = header(&["CELL_ID", "OLD_COUNT", "NEW_COUNT"]);
    if lengths {
        head.extend(header(&["OLD_LENGTH", "NEW_LENGTH"]));
    }
    if areas {
        head.extend(header(&["OLD_AREA", "NEW_AREA"]));
    }
    head.extend(header(&["SCORE", "RANKING"]));
    if lengths {
        head.extend(header(&["SCORE_LENGTH", "RANKING_LENGTH"]));
    }
    if areas {
        head.extend(header(&["SCORE_AREA", "RANKING_AREA"]));
    }
    head.push("WKT".into());

    let mut wtr = writer(w);
    write_row(&mut wtr, &head)?;
    for c in &report.ranking.cells {
        let mut row = vec![c.id.to_string(), c.old_count.to_string(), c.new_count.to_string()];
        if lengths {
            row.extend([opt(c.old_length), opt(c.new_length)]);
        }
        if areas {
            row.extend([opt(c.old_area), opt(c.new_area)]);
        }
        row.extend([c.score.to_string(), c.ranking.to_string()]);
        if lengths {
            row.extend([opt(c.score_length), opt(c.ranking_length)]);
        }
        if areas {
            row.extend([opt(c.score_area), opt(c.ranking_area)]);
        }
        row.push(c.geometry.to_wkt());
        write_row(&mut wtr, &row)?;
    }
    finish(wtr)
}

pub fn write_tracking<W: Write>(w: W, rows: &[TrackingRow]) -> Result<(), ReconError> {
    let mut wtr = writer(w);
    write_row(
        &mut wtr,
        &header(&[
            "TABLE",
            "FILTER",
            "OLD_COUNT",
            "NEW_COUNT",
            "REMOVE_FIELDS",
            "ADDED_FIELDS",
            "SR_OLD",
            "SR_NEW",
            "ISSUES",
            "LENGTH_CHANGE",
            "AREA_CHANGE",
        ]),
    )?;
    for r in rows {
        write_row(
            &mut wtr,
            &[
                r.table.clone(),
                r.filter.clone().unwrap_or_default(),
                opt(r.old_count),
                opt(r.new_count),
                r.removed_fields.join(","),
                r.added_fields.join(","),
                opt(r.old_spatial_ref),
                opt(r.new_spatial_ref),
                r.issues.join(","),
                opt(r.length_change),
                opt(r.area_change),
            ],
        )?;
    }
    finish(wtr)
}

// ---------------------------------------------------------------------------
// Whole report
// ---------------------------------------------------------------------------

fn export_reconciliation(ctx: &mut RunContext, rec: &ReconciliationReport) -> Result<(), ReconError> {
    write_summary(ctx.stage("summary.csv")?, &rec.summary)?;
    write_change_ledger(ctx.stage("change_ledger.csv")?, &rec.change_ledger)?;
    write_modified(ctx.stage("modified_records.csv")?, &rec.modified)?;
    write_features(ctx.stage("added_features.csv")?, &rec.added)?;
    write_features(ctx.stage("removed_features.csv")?, &rec.removed)?;
    write_geometry_status(ctx.stage("geometry_status.csv")?, &rec.geometry_status)?;
    Ok(())
}

/// Stage every table of `report` plus `report.json` in the run context.
pub fn export_report(ctx: &mut RunContext, report: &RunReport) -> Result<(), ReconError> {
    if let Some(rec) = &report.reconciliation {
        export_reconciliation(ctx, rec)?;
    }
    for ranking in &report.rankings {
        write_ranking(ctx.stage(&format!("ranking_{}.csv", ranking.name))?, ranking)?;
    }
    if !report.tracking.is_empty() {
        write_tracking(ctx.stage("tracking.csv")?, &report.tracking)?;
    }
    let mut json = ctx.stage("report.json")?;
    serde_json::to_writer_pretty(&mut json, report).map_err(csv_err)?;
    json.flush().map_err(csv_err)?;
    log::debug!("staged {} file(s)", ctx.staged().len());
    Ok(())
}
