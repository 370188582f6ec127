use crate::attributes::{diff_attributes, select_compare_fields};
use crate::backend::GeometryBackend;
use crate::config::{ReconConfig, ReconcileConfig};
use crate::context::RunContext;
use crate::error::ReconError;
use crate::model::{
    RankingReport, ReconInput, ReconciliationReport, RunMeta, RunReport, SkippedEntity, SnapshotPair,
};
use crate::ranking::rank;
use crate::reconcile::{reconcile, KeyPartition};
use crate::snapshot::{FeatureCollection, TabularSnapshot};
use crate::spatial::diff_geometry;
use crate::summary::summarize;
use crate::tracking::{missing_side, track};

/// Run every job of `config` against pre-loaded `input`.
///
/// Entities missing a counterpart are listed in `RunReport::skipped` and do
/// not stop the run. Any other error aborts it.
pub fn run(config: &ReconConfig, input: &ReconInput, backend: &dyn GeometryBackend) -> Result<RunReport, ReconError> {
    run_chunked(config, input, backend, config.effective_chunk_size())
}

/// [`run`] with the chunk size held by `ctx`.
pub fn run_in(
    ctx: &RunContext,
    config: &ReconConfig,
    input: &ReconInput,
    backend: &dyn GeometryBackend,
) -> Result<RunReport, ReconError> {
    run_chunked(config, input, backend, ctx.chunk_size())
}

fn run_chunked(
    config: &ReconConfig,
    input: &ReconInput,
    backend: &dyn GeometryBackend,
    chunk_size: usize,
) -> Result<RunReport, ReconError> {
    let mut skipped = input.skipped.clone();

    let reconciliation = match (&config.reconcile, &input.reconcile) {
        (Some(job), Some(pair)) => Some(run_reconcile(job, pair, chunk_size)?),
        _ => None,
    };

    let mut rankings = Vec::with_capacity(input.rankings.len());
    for job in &input.rankings {
        log::info!("ranking '{}': start", job.name);
        let ranking = rank(&job.grid, &job.old_layers, &job.new_layers, job.kind, backend)?;
        rankings.push(RankingReport { name: job.name.clone(), ranking });
    }

    let mut tracking = Vec::with_capacity(input.tracking.len());
    for dataset in &input.tracking {
        if let Some(side) = missing_side(dataset) {
            log::warn!("tracking '{}': {side} side missing, skipped", dataset.name);
            skipped.push(SkippedEntity::missing("tracking", dataset.name.clone(), side));
        }
        tracking.push(track(dataset, backend)?);
    }

    if !skipped.is_empty() {
        log::warn!("{} entit(ies) skipped for lack of a counterpart", skipped.len());
    }

    Ok(RunReport {
        meta: RunMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            chunk_size,
        },
        reconciliation,
        rankings,
        tracking,
        skipped,
    })
}

/// Reconcile one snapshot pair: partition keys, then diff attributes and
/// geometry of the common keys.
pub fn run_reconcile(
    job: &ReconcileConfig,
    pair: &SnapshotPair,
    chunk_size: usize,
) -> Result<ReconciliationReport, ReconError> {
    let (old, new) = (&pair.old, &pair.new);
    log::info!("reconcile '{}' -> '{}': start", old.name(), new.name());

    let summary = summarize(old, new);
    let partition = reconcile(old, new, &job.key_field)?;
    let fields = select_compare_fields(old, new, &job.key_field, job.compare_fields.as_deref(), &job.exclude_fields)?;
    let attrs = diff_attributes(old, new, &partition, &fields, chunk_size)?;
    let geometry_status = diff_geometry(old, new, &partition);

    let added = collect(new, partition.new_key_column(), partition.added.iter().filter_map(|k| partition.new_row(k)));
    let removed =
        collect(old, partition.old_key_column(), partition.removed.iter().filter_map(|k| partition.old_row(k)));

    log::info!(
        "reconcile: {} added, {} removed, {} modified",
        added.len(),
        removed.len(),
        attrs.modified.len()
    );

    let KeyPartition { old_dedup, new_dedup, .. } = partition;
    Ok(ReconciliationReport {
        key_field: job.key_field.clone(),
        summary,
        old_dedup,
        new_dedup,
        compare_fields: attrs.fields,
        change_ledger: attrs.ledger,
        modified: attrs.modified,
        added,
        removed,
        geometry_status,
    })
}

fn collect(snapshot: &TabularSnapshot, key_column: usize, rows: impl Iterator<Item = usize>) -> FeatureCollection {
    let mut out = snapshot.empty_collection();
    out.records.extend(rows.map(|row| snapshot.record(row, key_column)));
    out
}
