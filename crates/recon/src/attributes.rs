//! Attribute diffing over the common keys of a partition.

use serde::Serialize;

use crate::error::ReconError;
use crate::reconcile::KeyPartition;
use crate::snapshot::TabularSnapshot;
use crate::value::{values_equal, Value};

const OPERATION: &str = "diff_attributes";

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// One field whose value differs between the two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeLedgerEntry {
    pub key: Value,
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// Ledger entries of one key folded together. `field`, `old_value` and
/// `new_value` come from the last changed field in compare order;
/// `edit_count` is the total number of changed fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModifiedRecord {
    pub key: Value,
    pub edit_count: usize,
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AttributeDiff {
    pub fields: Vec<String>,
    /// Ordered by key, then compare-field order.
    pub ledger: Vec<ChangeLedgerEntry>,
    /// Ordered by key.
    pub modified: Vec<ModifiedRecord>,
}

// ---------------------------------------------------------------------------
// Field selection
// ---------------------------------------------------------------------------

/// Pick the fields to compare.
///
/// An explicit list must name fields present in both snapshots. Without one,
/// the attribute fields shared by both snapshots are used in old-schema
/// order, minus the key field and anything in `exclude` (case-insensitive).
/// Geometry columns are never attribute fields.
pub fn select_compare_fields(
    old: &TabularSnapshot,
    new: &TabularSnapshot,
    key_field: &str,
    explicit: Option<&[String]>,
    exclude: &[String],
) -> Result<Vec<String>, ReconError> {
    if let Some(list) = explicit {
        for field in list {
            for side in [old, new] {
                if side.field_index(field).is_none() {
                    return Err(ReconError::SchemaMismatch {
                        operation: "compare_fields",
                        dataset: side.name().to_string(),
                        field: field.clone(),
                    });
                }
            }
        }
        return Ok(list.to_vec());
    }

    let excluded = |name: &str| exclude.iter().any(|e| e.eq_ignore_ascii_case(name));
    Ok(old
        .fields()
        .iter()
        .map(|f| f.name.as_str())
        .filter(|name| *name != key_field && !excluded(name) && new.field_index(name).is_some())
        .map(str::to_string)
        .collect())
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Compare `fields` for every common key of `partition`.
///
/// Common keys are walked in ascending order, `chunk_size` keys at a time.
/// Chunking bounds the working set only; the output does not depend on it.
pub fn diff_attributes(
    old: &TabularSnapshot,
    new: &TabularSnapshot,
    partition: &KeyPartition,
    fields: &[String],
    chunk_size: usize,
) -> Result<AttributeDiff, ReconError> {
    let columns = resolve_columns(old, new, fields)?;
    let common: Vec<&Value> = partition.common.iter().collect();

    let mut ledger = Vec::new();
    let mut modified = Vec::new();
    for (i, chunk) in common.chunks(chunk_size.max(1)).enumerate() {
        log::debug!("{OPERATION}: chunk {} ({} keys)", i + 1, chunk.len());
        for key in chunk {
            let (Some(old_row), Some(new_row)) = (partition.old_row(key), partition.new_row(key)) else {
                continue;
            };
            let start = ledger.len();
            for (field, &(oc, nc)) in fields.iter().zip(&columns) {
                let old_value = old.value(old_row, oc);
                let new_value = new.value(new_row, nc);
                if !values_equal(&old_value, &new_value) {
                    ledger.push(ChangeLedgerEntry {
                        key: (*key).clone(),
                        field: field.clone(),
                        old_value,
                        new_value,
                    });
                }
            }
            if let Some(record) = fold(&ledger[start..]) {
                modified.push(record);
            }
        }
    }

    log::info!(
        "{OPERATION}: {} of {} common key(s) modified, {} field change(s)",
        modified.len(),
        common.len(),
        ledger.len()
    );
    Ok(AttributeDiff { fields: fields.to_vec(), ledger, modified })
}

/// Fold the ledger entries of one key; `None` when nothing changed.
fn fold(entries: &[ChangeLedgerEntry]) -> Option<ModifiedRecord> {
    let last = entries.last()?;
    Some(ModifiedRecord {
        key: last.key.clone(),
        edit_count: entries.len(),
        field: last.field.clone(),
        old_value: last.old_value.clone(),
        new_value: last.new_value.clone(),
    })
}

fn resolve_columns(
    old: &TabularSnapshot,
    new: &TabularSnapshot,
    fields: &[String],
) -> Result<Vec<(usize, usize)>, ReconError> {
    let lookup = |side: &TabularSnapshot, field: &String| {
        side.field_index(field).ok_or_else(|| ReconError::SchemaMismatch {
            operation: OPERATION,
            dataset: side.name().to_string(),
            field: field.clone(),
        })
    };
    fields
        .iter()
        .map(|f| Ok((lookup(old, f)?, lookup(new, f)?)))
        .collect()
}
