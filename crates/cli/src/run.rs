//! `geodiff run` and `geodiff validate`.

use std::path::{Path, PathBuf};

use geodiff_recon::export::export_report;
use geodiff_recon::loader::load_input;
use geodiff_recon::{run_in, PlanarBackend, ReconConfig, RunContext, RunReport};

use crate::exit_codes::{EXIT_BACKEND, EXIT_SKIPPED, EXIT_USAGE};
use crate::CliError;

fn read_config(path: &Path) -> Result<ReconConfig, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::new(EXIT_USAGE, format!("cannot read config {}: {e}", path.display())))?;
    Ok(ReconConfig::from_toml(&text)?)
}

/// Relative paths in a config resolve against its directory.
fn base_dir(config_path: &Path) -> &Path {
    config_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."))
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    let ranking = config.ranking.len();
    let tracking = config.tracking.as_ref().map_or(0, |t| t.datasets.len());
    eprintln!(
        "{}: ok ({} reconcile, {ranking} ranking, {tracking} tracked dataset(s))",
        config.name,
        usize::from(config.reconcile.is_some()),
    );
    Ok(())
}

pub fn cmd_run(config_path: PathBuf, json_output: bool, output_dir: Option<PathBuf>) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    log::info!("config '{}' from {}", config.name, config_path.display());
    let input = load_input(&config, base_dir(&config_path))?;
    let backend = PlanarBackend::new(config.backend.unit_scale);
    let mut ctx = RunContext::new(config.effective_chunk_size())?;
    let report = run_in(&ctx, &config, &input, &backend)?;

    if let Some(dir) = &output_dir {
        log::debug!("staging export in {}", ctx.scratch_dir().display());
        export_report(&mut ctx, &report)?;
        let written = ctx.persist(dir)?;
        eprintln!("wrote {} file(s) to {}", written.len(), dir.display());
    }

    if json_output {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::new(EXIT_BACKEND, format!("JSON serialization error: {e}")))?;
        println!("{json}");
    }

    print_summary(&report);

    if report.has_skips() {
        return Err(CliError::new(EXIT_SKIPPED, format!("{} entit(ies) skipped", report.skipped.len()))
            .with_hint("check that every dataset exists in both the old and the new location"));
    }
    Ok(())
}

/// Human summary to stderr.
fn print_summary(report: &RunReport) {
    if let Some(rec) = &report.reconciliation {
        let s = &rec.summary;
        let moved = rec
            .geometry_status
            .iter()
            .filter(|r| r.status == geodiff_recon::spatial::GeometryStatus::GeometryModified)
            .count();
        eprintln!(
            "reconcile: {} -> {} rows, {} added, {} removed, {} modified, {moved} geometry change(s)",
            s.old_count,
            s.new_count,
            rec.added.len(),
            rec.removed.len(),
            rec.modified.len(),
        );
        let dropped = rec.old_dedup.dropped() + rec.new_dedup.dropped();
        if dropped > 0 {
            eprintln!("reconcile: {dropped} row(s) dropped for duplicate or empty keys");
        }
    }
    for r in &report.rankings {
        let changed = r.ranking.cells.iter().filter(|c| c.ranking != 0 && c.ranking.abs() != 3).count();
        eprintln!(
            "ranking '{}': {} -> {} {} feature(s), {changed} of {} cell(s) changed",
            r.name,
            r.ranking.old_features,
            r.ranking.new_features,
            r.ranking.geometry_kind,
            r.ranking.cells.len(),
        );
    }
    if !report.tracking.is_empty() {
        let flagged = report.tracking.iter().filter(|t| !t.issues.is_empty()).count();
        eprintln!("tracking: {} dataset(s), {flagged} with issues", report.tracking.len());
    }
    for s in &report.skipped {
        eprintln!("skipped [{}] {}", s.job, s.reason);
    }
}
