use crossbeam_channel::{SendTimeoutError, bounded};
use eyre::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::bubble::BubbleResolver;
use crate::process::{Job, StemRegistry, collect_jobs, export_conversation, id_prefix};
use crate::store::SqliteStore;
use crate::utils::{
    ExportConfig, ProcessResult, Summary, backup_database, is_fatal, progress_bar,
};

/// Export with `config.jobs` worker threads, each reading its own connection
/// to a shared snapshot.
pub fn execute(config: &ExportConfig) -> Result<Summary> {
    let snapshot = backup_database(&config.db_path, config.quiet)?;
    run_internal(snapshot.path(), config)
}

fn run_internal(snapshot_path: &Path, config: &ExportConfig) -> Result<Summary> {
    fs::create_dir_all(&config.target_dir).wrap_err("Failed to create target dir")?;

    let jobs = {
        let store = SqliteStore::open(snapshot_path)?;
        collect_jobs(config, &store)?
    };

    let pb = progress_bar(config.quiet, jobs.len());
    let (tx, rx) = bounded::<Job>(32);
    let count_created = AtomicUsize::new(0);
    let count_updated = AtomicUsize::new(0);
    let count_skipped = AtomicUsize::new(0);
    let count_errors = AtomicUsize::new(0);
    let should_stop = AtomicBool::new(false);
    let registry = StemRegistry::default();
    let fatal: Mutex<Option<eyre::Report>> = Mutex::new(None);
    let n_workers = config.jobs.max(1);

    let abort = |e: eyre::Report| {
        should_stop.store(true, Ordering::Relaxed);
        if let Ok(mut slot) = fatal.lock()
            && slot.is_none()
        {
            *slot = Some(e);
        }
    };

    std::thread::scope(|s| {
        for _ in 0..n_workers {
            let rx = rx.clone();
            let (config, pb, abort, should_stop) = (config, &pb, &abort, &should_stop);
            let registry = &registry;
            let (count_created, count_updated, count_skipped, count_errors) =
                (&count_created, &count_updated, &count_skipped, &count_errors);

            s.spawn(move || {
                let store = match SqliteStore::open(snapshot_path) {
                    Ok(s) => s,
                    Err(e) => {
                        abort(eyre::Report::new(e).wrap_err("Worker DB open failed"));
                        return;
                    }
                };
                let resolver = BubbleResolver::new(store);

                while !should_stop.load(Ordering::Relaxed) {
                    let Ok(job) = rx.recv() else {
                        break;
                    };
                    let id = job.id.clone();

                    match export_conversation(&resolver, job, config, registry, pb) {
                        Ok(ProcessResult::Created) => {
                            count_created.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(ProcessResult::Updated) => {
                            count_updated.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(ProcessResult::Skipped) => {
                            count_skipped.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) if is_fatal(&e) => {
                            abort(e.wrap_err(format!("Export aborted at [{}]", id_prefix(&id, 8))));
                            break;
                        }
                        Err(e) => {
                            count_errors.fetch_add(1, Ordering::Relaxed);
                            pb.println(format!("Error [{}]: {:#}", id_prefix(&id, 8), e));
                        }
                    }
                    pb.inc(1);
                }
            });
        }

        drop(rx);

        'outer: for job in jobs {
            let mut pending = job;
            loop {
                if should_stop.load(Ordering::Relaxed) {
                    break 'outer;
                }
                match tx.send_timeout(pending, Duration::from_millis(50)) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Disconnected(_)) => break 'outer,
                    Err(SendTimeoutError::Timeout(r)) => pending = r,
                }
            }
        }

        drop(tx);
    });

    pb.finish_and_clear();

    if let Some(e) = fatal.into_inner().unwrap_or_else(|p| p.into_inner()) {
        return Err(e);
    }

    let summary = Summary {
        created: count_created.into_inner(),
        updated: count_updated.into_inner(),
        skipped: count_skipped.into_inner(),
        errors: count_errors.into_inner(),
    };

    if !config.quiet {
        eprintln!("{}", summary);
    }

    Ok(summary)
}
