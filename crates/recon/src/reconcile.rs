//! Key reconciliation: drop-all deduplication, then an added / removed /
//! common partition of the two key sets.
//!
//! Duplicates are not an error. Every row whose key occurs more than once in
//! a snapshot is discarded before partitioning and the loss is reported in
//! [`DedupStats`]. Rows with a null or empty key cannot be matched and are
//! discarded the same way.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::error::ReconError;
use crate::snapshot::TabularSnapshot;
use crate::value::Value;

const OPERATION: &str = "reconcile";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateKey {
    pub key: Value,
    pub count: usize,
}

/// What deduplication removed from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupStats {
    pub dataset: String,
    pub rows_before: usize,
    pub rows_after: usize,
    /// Keys that occurred more than once, ascending.
    pub duplicate_keys: Vec<DuplicateKey>,
    pub null_key_rows: usize,
}

impl DedupStats {
    pub fn dropped(&self) -> usize {
        self.rows_before - self.rows_after
    }
}

/// Partition of the deduplicated key sets of two snapshots.
///
/// `added`, `removed` and `common` are pairwise disjoint and their union is
/// the union of both deduplicated key sets. The partition also keeps the
/// key→row index of each side so the diff engines can align rows in O(1).
#[derive(Debug, Clone)]
pub struct KeyPartition {
    pub added: BTreeSet<Value>,
    pub removed: BTreeSet<Value>,
    pub common: BTreeSet<Value>,
    pub old_dedup: DedupStats,
    pub new_dedup: DedupStats,
    old_index: KeyIndex,
    new_index: KeyIndex,
}

impl KeyPartition {
    pub fn old_row(&self, key: &Value) -> Option<usize> {
        self.old_index.rows.get(key).copied()
    }

    pub fn new_row(&self, key: &Value) -> Option<usize> {
        self.new_index.rows.get(key).copied()
    }

    pub fn old_key_column(&self) -> usize {
        self.old_index.column
    }

    pub fn new_key_column(&self) -> usize {
        self.new_index.column
    }

    pub fn is_empty_intersection(&self) -> bool {
        self.common.is_empty()
    }
}

#[derive(Debug, Clone)]
struct KeyIndex {
    column: usize,
    rows: HashMap<Value, usize>,
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

/// Partition the keys of `old` and `new` on `key_field`.
///
/// Fails with `SchemaMismatch` if `key_field` is absent from either side.
pub fn reconcile(old: &TabularSnapshot, new: &TabularSnapshot, key_field: &str) -> Result<KeyPartition, ReconError> {
    let (old_index, old_dedup) = index_keys(old, key_field)?;
    let (new_index, new_dedup) = index_keys(new, key_field)?;

    let mut added = BTreeSet::new();
    let mut common = BTreeSet::new();
    for key in new_index.rows.keys() {
        if old_index.rows.contains_key(key) {
            common.insert(key.clone());
        } else {
            added.insert(key.clone());
        }
    }
    let removed: BTreeSet<Value> = old_index
        .rows
        .keys()
        .filter(|k| !new_index.rows.contains_key(*k))
        .cloned()
        .collect();

    log::info!(
        "reconciled '{}' -> '{}': {} added, {} removed, {} common",
        old.name(),
        new.name(),
        added.len(),
        removed.len(),
        common.len()
    );
    if common.is_empty() {
        log::info!("no common keys between '{}' and '{}'", old.name(), new.name());
    }

    Ok(KeyPartition { added, removed, common, old_dedup, new_dedup, old_index, new_index })
}

fn index_keys(snapshot: &TabularSnapshot, key_field: &str) -> Result<(KeyIndex, DedupStats), ReconError> {
    let column = snapshot.field_index(key_field).ok_or_else(|| ReconError::SchemaMismatch {
        operation: OPERATION,
        dataset: snapshot.name().to_string(),
        field: key_field.to_string(),
    })?;

    let mut counts: HashMap<Value, (usize, usize)> = HashMap::new();
    let mut null_key_rows = 0;
    for row in 0..snapshot.row_count() {
        let key = snapshot.value(row, column);
        if key.is_null() {
            null_key_rows += 1;
            continue;
        }
        counts.entry(key).and_modify(|(_, n)| *n += 1).or_insert((row, 1));
    }

    let mut duplicate_keys = Vec::new();
    let mut rows = HashMap::with_capacity(counts.len());
    for (key, (row, count)) in counts {
        if count > 1 {
            duplicate_keys.push(DuplicateKey { key, count });
        } else {
            rows.insert(key, row);
        }
    }
    duplicate_keys.sort_by(|a, b| a.key.cmp(&b.key));

    let stats = DedupStats {
        dataset: snapshot.name().to_string(),
        rows_before: snapshot.row_count(),
        rows_after: rows.len(),
        duplicate_keys,
        null_key_rows,
    };
    if stats.dropped() > 0 {
        log::warn!(
            "'{}': dropped {} row(s) on {} duplicate key(s) and {} null key(s); count {} -> {}",
            stats.dataset,
            stats.dropped(),
            stats.duplicate_keys.len(),
            stats.null_key_rows,
            stats.rows_before,
            stats.rows_after
        );
    }

    Ok((KeyIndex { column, rows }, stats))
}
