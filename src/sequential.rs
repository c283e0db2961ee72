use eyre::{Context, Result};
use std::fs;
use std::path::Path;

use crate::bubble::BubbleResolver;
use crate::process::{StemRegistry, collect_jobs, export_conversation, id_prefix};
use crate::store::SqliteStore;
use crate::utils::{ExportConfig, Summary, backup_database, is_fatal, progress_bar};

/// The main entry point for the sequential export logic.
/// Handles snapshotting and the export loop.
pub fn execute(config: &ExportConfig) -> Result<Summary> {
    let snapshot = backup_database(&config.db_path, config.quiet)?;
    run_internal(snapshot.path(), config)
}

fn run_internal(snapshot_path: &Path, config: &ExportConfig) -> Result<Summary> {
    fs::create_dir_all(&config.target_dir).wrap_err_with(|| {
        format!(
            "Failed to create target directory: {}",
            config.target_dir.display()
        )
    })?;

    let store = SqliteStore::open(snapshot_path)?;
    let jobs = collect_jobs(config, &store)?;
    let resolver = BubbleResolver::new(store);

    let pb = progress_bar(config.quiet, jobs.len());
    let registry = StemRegistry::default();
    let mut summary = Summary::default();

    for job in jobs {
        let id = job.id.clone();
        match export_conversation(&resolver, job, config, &registry, &pb) {
            Ok(result) => summary.record(result),
            Err(e) if is_fatal(&e) => {
                pb.finish_and_clear();
                return Err(e.wrap_err(format!("Export aborted at [{}]", id_prefix(&id, 8))));
            }
            Err(e) => {
                summary.errors += 1;
                pb.println(format!("Error [{}]: {:#}", id_prefix(&id, 8), e));
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();

    if !config.quiet {
        eprintln!("{}", summary);
    }

    Ok(summary)
}
