//! CSV + WKT loading into snapshots, feature layers and grids.
//!
//! Empty cells are null. Declared columns parse with their type, the rest
//! load as text. The geometry column holds WKT and stays out of the
//! attribute columns.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::config::{ReconConfig, SnapshotSource};
use crate::error::ReconError;
use crate::geometry::{Geometry, GeometryKind};
use crate::model::{RankingInput, ReconInput, Side, SkippedEntity, SnapshotPair, TrackingInput};
use crate::ranking::{FeatureLayer, Grid};
use crate::snapshot::TabularSnapshot;
use crate::value::{FieldType, Value};

const OPERATION: &str = "load";

/// How to read one CSV into a snapshot.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions<'a> {
    /// Required in the header when non-empty.
    pub key_field: &'a str,
    /// Required in the header when `Some`.
    pub geometry_field: Option<&'a str>,
    pub spatial_ref: Option<u32>,
    pub fields: Option<&'a BTreeMap<String, FieldType>>,
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

pub fn read_snapshot<R: Read>(reader: R, name: &str, options: &LoadOptions<'_>) -> Result<TabularSnapshot, ReconError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::io(OPERATION, format!("{name}: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let missing = |field: &str| ReconError::SchemaMismatch {
        operation: OPERATION,
        dataset: name.to_string(),
        field: field.to_string(),
    };
    let geometry_idx = match options.geometry_field {
        Some(g) => Some(headers.iter().position(|h| h == g).ok_or_else(|| missing(g))?),
        None => None,
    };
    if !options.key_field.is_empty() && !headers.iter().any(|h| h == options.key_field) {
        return Err(missing(options.key_field));
    }
    if let Some(declared) = options.fields {
        if let Some(absent) = declared.keys().find(|f| !headers.contains(f)) {
            return Err(missing(absent));
        }
    }

    // Attribute columns: (csv index, name, type)
    let columns: Vec<(usize, &str, FieldType)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != geometry_idx)
        .map(|(i, h)| {
            let ty = options.fields.and_then(|f| f.get(h)).copied().unwrap_or_default();
            (i, h.as_str(), ty)
        })
        .collect();

    let mut builder = TabularSnapshot::builder(name, options.key_field).spatial_ref(options.spatial_ref);
    for (_, h, ty) in &columns {
        builder = builder.field(*h, *ty);
    }
    if let Some(g) = options.geometry_field {
        builder = builder.geometry_field(g);
    }

    for (i, record) in reader.records().enumerate() {
        let row = i + 1;
        let record = record.map_err(|e| ReconError::Parse {
            dataset: name.to_string(),
            row,
            column: String::new(),
            message: e.to_string(),
        })?;
        let mut values = Vec::with_capacity(columns.len());
        for (idx, h, ty) in &columns {
            let raw = record.get(*idx).unwrap_or("");
            let value = Value::parse_as(raw, *ty).map_err(|message| ReconError::Parse {
                dataset: name.to_string(),
                row,
                column: h.to_string(),
                message,
            })?;
            values.push(value);
        }
        let geometry = match geometry_idx {
            Some(gi) => parse_geometry(record.get(gi).unwrap_or(""), name, row, &headers[gi])?,
            None => None,
        };
        builder.push_row(values, geometry)?;
    }

    let snapshot = builder.build();
    log::debug!("loaded '{name}': {} row(s), {} field(s)", snapshot.row_count(), snapshot.fields().len());
    Ok(snapshot)
}

fn parse_geometry(raw: &str, dataset: &str, row: usize, column: &str) -> Result<Option<Geometry>, ReconError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    Geometry::from_wkt(raw).map_err(|message| ReconError::Parse {
        dataset: dataset.to_string(),
        row,
        column: column.to_string(),
        message,
    })
}

/// Read a feature layer. Rows without geometry are dropped.
pub fn read_layer<R: Read>(
    reader: R,
    name: &str,
    kind: GeometryKind,
    geometry_field: &str,
) -> Result<FeatureLayer, ReconError> {
    let options = LoadOptions { geometry_field: Some(geometry_field), ..Default::default() };
    let snapshot = read_snapshot(reader, name, &options)?;
    let features: Vec<Geometry> = (0..snapshot.row_count()).filter_map(|r| snapshot.geometry(r).cloned()).collect();
    let empty = snapshot.row_count() - features.len();
    if empty > 0 {
        log::debug!("layer '{name}': {empty} row(s) without geometry");
    }
    Ok(FeatureLayer::new(name, kind, features))
}

/// Read a grid: an integer id column and one polygon per row.
pub fn read_grid<R: Read>(reader: R, name: &str, id_field: &str, geometry_field: &str) -> Result<Grid, ReconError> {
    let options = LoadOptions { key_field: id_field, geometry_field: Some(geometry_field), ..Default::default() };
    let snapshot = read_snapshot(reader, name, &options)?;
    let id_col = snapshot.key_index(OPERATION)?;

    let mut cells = Vec::with_capacity(snapshot.row_count());
    for row in 0..snapshot.row_count() {
        let raw = snapshot.value(row, id_col).to_string();
        let id = parse_cell_id(&raw).ok_or_else(|| ReconError::Parse {
            dataset: name.to_string(),
            row: row + 1,
            column: id_field.to_string(),
            message: format!("'{raw}' is not an integer cell id"),
        })?;
        let geometry = snapshot
            .geometry(row)
            .cloned()
            .ok_or_else(|| ReconError::InvalidGrid(format!("grid '{name}': cell {id} has no geometry")))?;
        cells.push((id, geometry));
    }
    Grid::new(name, cells)
}

fn parse_cell_id(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        let f = raw.parse::<f64>().ok()?;
        (f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
    })
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

fn open(path: &Path) -> Result<File, ReconError> {
    File::open(path).map_err(|e| ReconError::io(OPERATION, format!("cannot read {}: {e}", path.display())))
}

pub fn load_snapshot(base_dir: &Path, source: &SnapshotSource, key_field: &str) -> Result<TabularSnapshot, ReconError> {
    let path = base_dir.join(&source.file);
    let options = LoadOptions {
        key_field,
        geometry_field: source.geometry_field.as_deref(),
        spatial_ref: source.spatial_ref,
        fields: Some(&source.fields),
    };
    read_snapshot(open(&path)?, &source.file, &options)
}

/// Which of `old` / `new` is absent, if any.
fn missing_side(old: &Path, new: &Path) -> Option<Side> {
    match (old.is_file(), new.is_file()) {
        (true, true) => None,
        (false, true) => Some(Side::Old),
        (true, false) => Some(Side::New),
        (false, false) => Some(Side::Both),
    }
}

/// Load every input a config refers to. Paths resolve against `base_dir`.
///
/// Entities present on one side only are reported in `skipped` instead of
/// failing the load.
pub fn load_input(config: &ReconConfig, base_dir: &Path) -> Result<ReconInput, ReconError> {
    let mut input = ReconInput::default();

    if let Some(rc) = &config.reconcile {
        let old_path = base_dir.join(&rc.old.file);
        let new_path = base_dir.join(&rc.new.file);
        match missing_side(&old_path, &new_path) {
            None => {
                let old = load_snapshot(base_dir, &rc.old, &rc.key_field)?;
                let new = load_snapshot(base_dir, &rc.new, &rc.key_field)?;
                input.reconcile = Some(SnapshotPair { old, new });
            }
            Some(side) => input.skipped.push(SkippedEntity::missing("reconcile", &rc.old.file, side)),
        }
    }

    for job in &config.ranking {
        let grid_path = base_dir.join(&job.grid.file);
        let grid = read_grid(open(&grid_path)?, &job.grid.file, &job.grid.id_field, &job.grid.geometry_field)?;
        let mut ranking = RankingInput {
            name: job.name.clone(),
            kind: job.geometry_kind,
            grid,
            old_layers: Vec::new(),
            new_layers: Vec::new(),
        };
        for layer in &job.layers {
            let file = format!("{layer}.csv");
            let old_path = base_dir.join(&job.old_dir).join(&file);
            let new_path = base_dir.join(&job.new_dir).join(&file);
            if let Some(side) = missing_side(&old_path, &new_path) {
                input.skipped.push(SkippedEntity::missing(&job.name, layer, side));
                continue;
            }
            let old = read_layer(open(&old_path)?, layer, job.geometry_kind, &job.geometry_field)?;
            let new = read_layer(open(&new_path)?, layer, job.geometry_kind, &job.geometry_field)?;
            ranking.old_layers.push(old);
            ranking.new_layers.push(new);
        }
        input.rankings.push(ranking);
    }

    if let Some(tracking) = &config.tracking {
        for dataset in &tracking.datasets {
            let file = format!("{}.csv", dataset.name);
            let load = |dir: &str, spatial_ref: Option<u32>| -> Result<Option<TabularSnapshot>, ReconError> {
                let path = base_dir.join(dir).join(&file);
                if !path.is_file() {
                    return Ok(None);
                }
                load_tracked(&path, &dataset.name, &tracking.geometry_field, spatial_ref).map(Some)
            };
            input.tracking.push(TrackingInput {
                name: dataset.name.clone(),
                old: load(&tracking.old_dir, dataset.old_spatial_ref)?,
                new: load(&tracking.new_dir, dataset.new_spatial_ref)?,
                filter: dataset.filter.clone(),
            });
        }
    }

    Ok(input)
}

/// Tracked datasets may or may not carry geometry; the column is used when
/// the header has it.
fn load_tracked(path: &Path, name: &str, geometry_field: &str, spatial_ref: Option<u32>) -> Result<TabularSnapshot, ReconError> {
    let mut data = String::new();
    open(path)?
        .read_to_string(&mut data)
        .map_err(|e| ReconError::io(OPERATION, format!("cannot read {}: {e}", path.display())))?;
    let has_geometry = csv::Reader::from_reader(data.as_bytes())
        .headers()
        .map(|h| h.iter().any(|h| h.trim() == geometry_field))
        .unwrap_or(false);
    let options = LoadOptions {
        geometry_field: has_geometry.then_some(geometry_field),
        spatial_ref,
        ..Default::default()
    };
    read_snapshot(data.as_bytes(), name, &options)
}
