//! Geometry status per key: new, removed, consistent or modified.

use std::fmt;

use serde::Serialize;

use crate::geometry::Geometry;
use crate::reconcile::KeyPartition;
use crate::snapshot::TabularSnapshot;
use crate::value::{null_aware_eq, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeometryStatus {
    NewFeature,
    RemovedFeature,
    GeometryConsistent,
    GeometryModified,
}

impl GeometryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewFeature => "NEW_FEATURE",
            Self::RemovedFeature => "REMOVED_FEATURE",
            Self::GeometryConsistent => "GEOMETRY_CONSISTENT",
            Self::GeometryModified => "GEOMETRY_MODIFIED",
        }
    }
}

impl fmt::Display for GeometryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRecord {
    pub key: Value,
    pub status: GeometryStatus,
    pub geometry: Option<Geometry>,
}

/// Tag every key of the partition exactly once.
///
/// Order is fixed: common keys (modified or consistent), then removed, then
/// added, each group ascending by key. Common keys report the new geometry.
/// Two absent geometries are consistent.
pub fn diff_geometry(old: &TabularSnapshot, new: &TabularSnapshot, partition: &KeyPartition) -> Vec<StatusRecord> {
    let mut out = Vec::with_capacity(partition.common.len() + partition.removed.len() + partition.added.len());
    let mut modified = 0usize;

    for key in &partition.common {
        let old_geom = partition.old_row(key).and_then(|r| old.geometry(r));
        let new_geom = partition.new_row(key).and_then(|r| new.geometry(r));
        let status = if null_aware_eq(old_geom, new_geom) {
            GeometryStatus::GeometryConsistent
        } else {
            modified += 1;
            GeometryStatus::GeometryModified
        };
        out.push(StatusRecord { key: key.clone(), status, geometry: new_geom.cloned() });
    }
    for key in &partition.removed {
        let geometry = partition.old_row(key).and_then(|r| old.geometry(r)).cloned();
        out.push(StatusRecord { key: key.clone(), status: GeometryStatus::RemovedFeature, geometry });
    }
    for key in &partition.added {
        let geometry = partition.new_row(key).and_then(|r| new.geometry(r)).cloned();
        out.push(StatusRecord { key: key.clone(), status: GeometryStatus::NewFeature, geometry });
    }

    log::info!(
        "diff_geometry: {} modified, {} consistent, {} removed, {} new",
        modified,
        partition.common.len() - modified,
        partition.removed.len(),
        partition.added.len()
    );
    out
}
