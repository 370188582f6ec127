//! Per-dataset table tracking: counts, schema drift, spatial reference and
//! total length/area change between two catalogs.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::backend::GeometryBackend;
use crate::config::RowFilter;
use crate::error::ReconError;
use crate::model::{Side, TrackingInput};
use crate::snapshot::TabularSnapshot;

const OPERATION: &str = "track";

pub const RECORDS_DELETED: &str = "RECORDS DELETED";
pub const RECORDS_ADDED: &str = "RECORDS ADDED";
pub const DIFFERENT_SPATIAL_REFERENCE: &str = "DIFFERENT SPATIAL REFERENCE";
pub const FIELDS_ADDED: &str = "FIELDS ADDED";
pub const FIELDS_REMOVED: &str = "FIELDS REMOVED";
pub const AREA_ADDED: &str = "AREA ADDED";
pub const AREA_REMOVED: &str = "AREA REMOVED";
pub const LENGTH_ADDED: &str = "LENGTH ADDED";
pub const LENGTH_REMOVED: &str = "LENGTH REMOVED";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingRow {
    pub table: String,
    /// `column=v1|v2` when a filter applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub old_count: Option<usize>,
    pub new_count: Option<usize>,
    pub removed_fields: Vec<String>,
    pub added_fields: Vec<String>,
    pub old_spatial_ref: Option<u32>,
    pub new_spatial_ref: Option<u32>,
    pub issues: Vec<String>,
    pub length_change: Option<f64>,
    pub area_change: Option<f64>,
}

impl TrackingRow {
    fn missing(input: &TrackingInput, side: Side) -> Self {
        let issue = match side {
            Side::Old => "NO OLDER DATASET TO COMPARE",
            Side::New => "NO NEWER DATASET TO COMPARE",
            Side::Both => "DATASET TO COMPARE ARE MISSING",
        };
        Self {
            table: input.name.clone(),
            filter: input.filter.as_ref().map(describe_filter),
            old_count: None,
            new_count: None,
            removed_fields: Vec::new(),
            added_fields: Vec::new(),
            old_spatial_ref: None,
            new_spatial_ref: None,
            issues: vec![issue.to_string()],
            length_change: None,
            area_change: None,
        }
    }
}

/// The side(s) missing from a tracked dataset, if any.
pub fn missing_side(input: &TrackingInput) -> Option<Side> {
    match (&input.old, &input.new) {
        (Some(_), Some(_)) => None,
        (None, Some(_)) => Some(Side::Old),
        (Some(_), None) => Some(Side::New),
        (None, None) => Some(Side::Both),
    }
}

/// Compare one dataset across both catalogs. A missing side yields a row
/// carrying only the matching issue.
pub fn track(input: &TrackingInput, backend: &dyn GeometryBackend) -> Result<TrackingRow, ReconError> {
    let (Some(old), Some(new)) = (&input.old, &input.new) else {
        let side = missing_side(input).unwrap_or(Side::Both);
        log::warn!("{OPERATION} '{}': missing {side} dataset", input.name);
        return Ok(TrackingRow::missing(input, side));
    };

    let (old, new) = match &input.filter {
        Some(filter) => (apply_filter(old, filter)?, apply_filter(new, filter)?),
        None => (old.clone(), new.clone()),
    };

    let old_fields = tracked_fields(&old);
    let new_fields = tracked_fields(&new);
    let removed_fields: Vec<String> = old_fields.difference(&new_fields).cloned().collect();
    let added_fields: Vec<String> = new_fields.difference(&old_fields).cloned().collect();

    let (old_length, old_area) = totals(&old, backend)?;
    let (new_length, new_area) = totals(&new, backend)?;
    let length_change = round4(new_length - old_length);
    let area_change = round4(new_area - old_area);

    let mut issues = Vec::new();
    if old.row_count() > new.row_count() {
        issues.push(RECORDS_DELETED);
    } else if old.row_count() < new.row_count() {
        issues.push(RECORDS_ADDED);
    }
    if old.spatial_ref() != new.spatial_ref() {
        issues.push(DIFFERENT_SPATIAL_REFERENCE);
    }
    if !added_fields.is_empty() {
        issues.push(FIELDS_ADDED);
    }
    if !removed_fields.is_empty() {
        issues.push(FIELDS_REMOVED);
    }
    if area_change > 0.0 {
        issues.push(AREA_ADDED);
    } else if area_change < 0.0 {
        issues.push(AREA_REMOVED);
    }
    if length_change > 0.0 {
        issues.push(LENGTH_ADDED);
    } else if length_change < 0.0 {
        issues.push(LENGTH_REMOVED);
    }

    log::info!(
        "{OPERATION} '{}': {} -> {} row(s), {} issue(s)",
        input.name,
        old.row_count(),
        new.row_count(),
        issues.len()
    );

    Ok(TrackingRow {
        table: input.name.clone(),
        filter: input.filter.as_ref().map(describe_filter),
        old_count: Some(old.row_count()),
        new_count: Some(new.row_count()),
        removed_fields,
        added_fields,
        old_spatial_ref: old.spatial_ref(),
        new_spatial_ref: new.spatial_ref(),
        issues: issues.into_iter().map(str::to_string).collect(),
        length_change: Some(length_change),
        area_change: Some(area_change),
    })
}

fn describe_filter(filter: &RowFilter) -> String {
    format!("{}={}", filter.column, filter.values.join("|"))
}

fn apply_filter(snapshot: &TabularSnapshot, filter: &RowFilter) -> Result<TabularSnapshot, ReconError> {
    let column = snapshot.field_index(&filter.column).ok_or_else(|| ReconError::SchemaMismatch {
        operation: OPERATION,
        dataset: snapshot.name().to_string(),
        field: filter.column.clone(),
    })?;
    let rows: Vec<usize> = (0..snapshot.row_count())
        .filter(|&r| filter.matches(&snapshot.value(r, column)))
        .collect();
    Ok(snapshot.select_rows(&rows))
}

/// Attribute fields, without object ids.
fn tracked_fields(snapshot: &TabularSnapshot) -> BTreeSet<String> {
    snapshot
        .fields()
        .iter()
        .filter(|f| !f.name.eq_ignore_ascii_case("OBJECTID"))
        .map(|f| f.name.clone())
        .collect()
}

fn totals(snapshot: &TabularSnapshot, backend: &dyn GeometryBackend) -> Result<(f64, f64), ReconError> {
    let wrap = |operation: &'static str| {
        move |e: crate::backend::BackendError| ReconError::Backend { operation, message: e.message }
    };
    let (mut length, mut area) = (0.0, 0.0);
    for row in 0..snapshot.row_count() {
        if let Some(g) = snapshot.geometry(row) {
            length += backend.length(g).map_err(wrap("length"))?;
            area += backend.area(g).map_err(wrap("area"))?;
        }
    }
    Ok((length, area))
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
