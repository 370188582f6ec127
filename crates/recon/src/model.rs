use std::fmt;

use serde::Serialize;

use crate::attributes::{ChangeLedgerEntry, ModifiedRecord};
use crate::config::RowFilter;
use crate::error::ReconError;
use crate::geometry::GeometryKind;
use crate::ranking::{FeatureLayer, Grid, Ranking};
use crate::reconcile::DedupStats;
use crate::snapshot::{FeatureCollection, TabularSnapshot};
use crate::spatial::StatusRecord;
use crate::summary::SummaryRecord;
use crate::tracking::TrackingRow;

/// Which side of a comparison is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Old,
    New,
    Both,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Old => write!(f, "old"),
            Self::New => write!(f, "new"),
            Self::Both => write!(f, "both"),
        }
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Pre-loaded inputs for every job in a config. `skipped` lists entities
/// the loader found on one side only; they are not part of any job input.
#[derive(Debug, Default)]
pub struct ReconInput {
    pub reconcile: Option<SnapshotPair>,
    pub rankings: Vec<RankingInput>,
    pub tracking: Vec<TrackingInput>,
    pub skipped: Vec<SkippedEntity>,
}

#[derive(Debug, Clone)]
pub struct SnapshotPair {
    pub old: TabularSnapshot,
    pub new: TabularSnapshot,
}

/// Layers present on both sides of one ranking job.
#[derive(Debug, Clone)]
pub struct RankingInput {
    pub name: String,
    pub kind: GeometryKind,
    pub grid: Grid,
    pub old_layers: Vec<FeatureLayer>,
    pub new_layers: Vec<FeatureLayer>,
}

/// One tracked dataset; a `None` side was not found in its catalog.
#[derive(Debug, Clone)]
pub struct TrackingInput {
    pub name: String,
    pub old: Option<TabularSnapshot>,
    pub new: Option<TabularSnapshot>,
    pub filter: Option<RowFilter>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub chunk_size: usize,
}

/// An entity the run could not compare. The rest of the run still completed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEntity {
    pub job: String,
    pub entity: String,
    /// The side that is missing.
    pub side: Side,
    pub reason: String,
}

impl SkippedEntity {
    pub fn missing(job: impl Into<String>, entity: impl Into<String>, side: Side) -> Self {
        let entity = entity.into();
        let reason = ReconError::MissingCounterpart { entity: entity.clone(), side }.to_string();
        Self { job: job.into(), entity, side, reason }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub key_field: String,
    pub summary: SummaryRecord,
    pub old_dedup: DedupStats,
    pub new_dedup: DedupStats,
    pub compare_fields: Vec<String>,
    pub change_ledger: Vec<ChangeLedgerEntry>,
    pub modified: Vec<ModifiedRecord>,
    pub added: FeatureCollection,
    pub removed: FeatureCollection,
    pub geometry_status: Vec<StatusRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingReport {
    pub name: String,
    #[serde(flatten)]
    pub ranking: Ranking,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub meta: RunMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconciliationReport>,
    pub rankings: Vec<RankingReport>,
    pub tracking: Vec<TrackingRow>,
    pub skipped: Vec<SkippedEntity>,
}

impl RunReport {
    pub fn has_skips(&self) -> bool {
        !self.skipped.is_empty()
    }
}
