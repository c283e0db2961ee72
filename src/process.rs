use chrono::Utc;
use eyre::{Context, Result, eyre};
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::bubble::BubbleResolver;
use crate::composer::{ComposerData, parse_structure_dump};
use crate::exporter;
use crate::recover::{ComposerLookup, list_conversations, load_composer, recover_conversation};
use crate::store::KeyValueStore;
use crate::utils::{
    ExportConfig, ProcessResult, extract_json_id, parse_existing_frontmatter,
};

const EXTENSIONS: [&str; 2] = ["md", "json"];

/// One conversation to export. The structural document is loaded from the store
/// unless it was already read from a structure dump.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub composer: Option<ComposerData>,
}

/// Filename stems claimed during this run, mapped to the conversation that owns them.
/// Shared by all workers so two conversations never allocate the same stem before
/// either has written its files.
#[derive(Debug, Default)]
pub struct StemRegistry {
    claimed: Mutex<HashMap<String, String>>,
}

impl Job {
    pub fn from_store(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            composer: None,
        }
    }
}

/// Decide what to export: structure dumps, explicit ids, or every conversation in the store.
pub fn collect_jobs<S: KeyValueStore>(config: &ExportConfig, store: &S) -> Result<Vec<Job>> {
    let mut jobs = if let Some(dir) = &config.structure_dir {
        load_structure_dir(dir)?
    } else if !config.conversations.is_empty() {
        return Ok(config
            .conversations
            .iter()
            .map(Job::from_store)
            .collect());
    } else {
        list_conversations(store)
            .wrap_err("Failed to list conversations")?
            .into_iter()
            .map(Job::from_store)
            .collect()
    };

    if !config.conversations.is_empty() {
        jobs.retain(|job| config.conversations.contains(&job.id));
    }
    Ok(jobs)
}

/// Read every `*.json` structure dump in `dir`, in file name order.
pub fn load_structure_dir(dir: &Path) -> Result<Vec<Job>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .wrap_err_with(|| format!("Failed to read structure dir: {}", dir.display()))?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut jobs = Vec::with_capacity(paths.len());
    for path in paths {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parsed = fs::read(&path)
            .wrap_err("read failed")
            .and_then(|bytes| parse_structure_dump(&bytes, &stem).wrap_err("not a structure dump"));
        match parsed {
            Ok(Some((id, composer))) => {
                if jobs.iter().any(|j: &Job| j.id == id) {
                    tracing::warn!(file = %path.display(), %id, "duplicate conversation in structure dumps, skipped");
                    continue;
                }
                jobs.push(Job {
                    id,
                    composer: Some(composer),
                });
            }
            Ok(None) => {
                tracing::warn!(file = %path.display(), "could not determine conversation id, skipped");
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = format!("{e:#}"), "skipped");
            }
        }
    }
    Ok(jobs)
}

pub fn export_conversation<S: KeyValueStore>(
    resolver: &BubbleResolver<S>,
    job: Job,
    config: &ExportConfig,
    registry: &StemRegistry,
    pb: &ProgressBar,
) -> Result<ProcessResult> {
    let id = job.id.as_str();
    let composer = match job.composer {
        Some(c) => c,
        None => match load_composer(resolver.store(), id)? {
            ComposerLookup::Found(c) => c,
            ComposerLookup::Malformed(e) => {
                return Err(eyre::Report::new(e).wrap_err("Failed to decode composer data"));
            }
            ComposerLookup::Missing => return Err(eyre!("No composer data for conversation")),
        },
    };

    let existing_stem = find_existing_stem(&config.target_dir, id);

    if !config.force
        && config.format.markdown()
        && let Some(ref stem) = existing_stem
        && let Some(fm) = parse_existing_frontmatter(&stem_path(&config.target_dir, stem, "md"))
        && let (Some(file_ts), Some(db_ts)) = (fm.updated_at, composer.last_updated_at)
        && file_ts >= db_ts
    {
        tracing::debug!(file = %stem, "skipped, up to date");
        if config.verbose {
            pb.println(format!("Skipped: {}", stem));
        }
        return Ok(ProcessResult::Skipped);
    }

    let record = recover_conversation(resolver, id, &composer)
        .wrap_err("Failed to recover conversation")?;

    let stem = allocate_filename(id, composer.title(), &config.target_dir, registry);
    let result_variant = if existing_stem.is_none() {
        ProcessResult::Created
    } else {
        ProcessResult::Updated
    };

    if let Some(ref old_stem) = existing_stem
        && old_stem != &stem
    {
        for ext in EXTENSIONS {
            let old_path = stem_path(&config.target_dir, old_stem, ext);
            if !old_path.exists() {
                continue;
            }
            let new_path = stem_path(&config.target_dir, &stem, ext);
            if let Err(e) = fs::rename(&old_path, &new_path) {
                tracing::warn!(
                    from = %old_path.display(),
                    to = %new_path.display(),
                    error = %e,
                    "rename failed"
                );
            }
        }
    }

    if config.format.markdown() {
        let path = stem_path(&config.target_dir, &stem, "md");
        let file = File::create(&path)
            .wrap_err_with(|| format!("Failed to create: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        exporter::write_markdown(&mut writer, &record, &composer, Utc::now())
            .wrap_err("Failed to write markdown")?;
        writer.flush()?;
    }

    if config.format.json() {
        let path = stem_path(&config.target_dir, &stem, "json");
        let file = File::create(&path)
            .wrap_err_with(|| format!("Failed to create: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        exporter::write_json(&mut writer, &record).wrap_err("Failed to write json")?;
        writer.flush()?;
    }

    if config.verbose {
        match result_variant {
            ProcessResult::Created => pb.println(format!("Created: {}", stem)),
            ProcessResult::Updated => pb.println(format!("Updated: {}", stem)),
            ProcessResult::Skipped => {}
        }
    }

    Ok(result_variant)
}

fn stem_path(target_dir: &Path, stem: &str, ext: &str) -> PathBuf {
    target_dir.join(format!("{}.{}", stem, ext))
}

pub(crate) fn id_prefix(id: &str, chars: usize) -> &str {
    id.char_indices()
        .nth(chars)
        .map(|(i, _)| &id[..i])
        .unwrap_or(id)
}

// An exported file belongs to `id` if its frontmatter (markdown) or record (json) says so.
fn owned_by(path: &Path, id: &str) -> bool {
    let owner = match path.extension().and_then(|e| e.to_str()) {
        Some("md") => parse_existing_frontmatter(path).and_then(|fm| fm.id),
        Some("json") => extract_json_id(path),
        _ => None,
    };
    owner.as_deref() == Some(id)
}

// Find a file whose name starts with the first 8 chars of the id,
// then confirm ownership by reading the id stored inside it.
// Handles the rare collision case where multiple files share an 8-char prefix.
fn find_existing_stem(target_dir: &Path, id: &str) -> Option<String> {
    let prefix = id_prefix(id, 8);
    fs::read_dir(target_dir)
        .ok()?
        .flatten()
        .filter(|e| {
            let n = e.file_name();
            let s = n.to_string_lossy();
            s.starts_with(prefix) && EXTENSIONS.iter().any(|ext| s.ends_with(&format!(".{ext}")))
        })
        .find_map(|e| {
            let path = e.path();
            if owned_by(&path, id) {
                path.file_stem().map(|s| s.to_string_lossy().into_owned())
            } else {
                None
            }
        })
}

// Allocate a filename stem for the given id+title pair.
// For each prefix length [8, 12, full id], under the registry lock:
//   - Stem claimed this run by another id, or on disk owned by another id → try a longer prefix
//   - Otherwise → record the claim and use the stem
fn allocate_filename(
    id: &str,
    title: &str,
    target_dir: &Path,
    registry: &StemRegistry,
) -> String {
    let raw_slug = slug::slugify(title);
    let slug = raw_slug[..raw_slug.len().min(60)]
        .trim_end_matches('-')
        .to_string();
    let make_stem = |prefix: &str| {
        if slug.is_empty() {
            prefix.to_string()
        } else {
            format!("{}_{}", prefix, slug)
        }
    };

    let mut claimed = registry
        .claimed
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    for len in [8usize, 12usize] {
        let stem = make_stem(id_prefix(id, len));
        let claimed_by_other = claimed.get(&stem).is_some_and(|owner| owner != id);
        let taken_by_other = claimed_by_other
            || EXTENSIONS.iter().any(|ext| {
                let path = stem_path(target_dir, &stem, ext);
                path.exists() && !owned_by(&path, id)
            });
        if !taken_by_other {
            claimed.insert(stem.clone(), id.to_string());
            return stem;
        }
    }

    // Full-id fallback; the id is unique so this is always safe
    let stem = make_stem(id);
    claimed.insert(stem.clone(), id.to_string());
    stem
}
