use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::{Connection, OpenFlags, backup::Backup};
use serde::Deserialize;
use std::fs::File;
use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::error::StoreError;

/// Which files to write per conversation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Markdown,
    Json,
    #[default]
    Both,
}

impl OutputFormat {
    pub fn markdown(self) -> bool {
        matches!(self, OutputFormat::Markdown | OutputFormat::Both)
    }

    pub fn json(self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Both)
    }
}

/// Configuration required to run the export process.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Clone, Debug)]
pub struct ExportConfig {
    pub target_dir: PathBuf,
    pub db_path: PathBuf,
    /// Read structural documents from earlier JSON dumps instead of the database.
    pub structure_dir: Option<PathBuf>,
    /// Restrict the export to these conversation ids. Empty means all.
    pub conversations: Vec<String>,
    pub format: OutputFormat,
    pub jobs: usize,
    pub force: bool,
    pub verbose: bool,
    pub quiet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    Created,
    Updated,
    Skipped,
}

/// Outcome counts of one export run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl Summary {
    pub fn record(&mut self, result: ProcessResult) {
        match result {
            ProcessResult::Created => self.created += 1,
            ProcessResult::Updated => self.updated += 1,
            ProcessResult::Skipped => self.skipped += 1,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Done. {} created, {} updated, {} skipped.",
            self.created, self.updated, self.skipped
        )?;
        if self.errors > 0 {
            write!(f, " Completed with {} error(s).", self.errors)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct FileFrontmatter {
    pub id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Whether an export error came from the store itself and must abort the run.
pub fn is_fatal(report: &eyre::Report) -> bool {
    report.chain().any(|e| e.is::<StoreError>())
}

pub fn spinner(quiet: bool, message: &'static str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let s = ProgressBar::new_spinner();
    s.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    s.set_message(message);
    s.enable_steady_tick(Duration::from_millis(80));
    s
}

pub fn progress_bar(quiet: bool, total: usize) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    bar.println(format!("Found {} conversations.", total));
    bar
}

/// Copy the live database into a temporary file with SQLite's online backup API,
/// so Cursor can keep writing while we read.
pub fn backup_database(db_path: &Path, quiet: bool) -> Result<NamedTempFile> {
    let spinner = spinner(quiet, "Snapshotting database...");

    let src = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .wrap_err_with(|| format!("Failed to open source database: {}", db_path.display()))?;

    let tmp = NamedTempFile::new().wrap_err("Failed to create temporary file")?;
    let mut dst =
        Connection::open(tmp.path()).wrap_err("Failed to open snapshot database connection")?;

    {
        let backup = Backup::new(&src, &mut dst).wrap_err("Failed to initialize backup")?;
        backup
            .run_to_completion(1000, Duration::from_millis(5), None)
            .wrap_err("Backup did not complete successfully")?;
    }

    drop(src);
    spinner.finish_and_clear();
    Ok(tmp)
}

/// Read the YAML frontmatter from an existing .md file and extract relevant fields.
pub fn parse_existing_frontmatter(path: &Path) -> Option<FileFrontmatter> {
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();
    let first = lines.next()?.ok()?;
    if first.trim() != "---" {
        return None;
    }

    let mut id: Option<String> = None;
    let mut updated_at: Option<DateTime<Utc>> = None;
    let mut bytes_read = 0usize;

    for line in lines {
        let line = line.ok()?;
        bytes_read += line.len() + 1;
        if bytes_read > 2048 || line.trim() == "---" {
            break;
        }
        if let Some(rest) = line.strip_prefix("id:") {
            id = Some(rest.trim().trim_matches('\'').trim_matches('"').to_string());
        } else if let Some(rest) = line.strip_prefix("updated_at:") {
            let val = rest.trim().trim_matches('\'').trim_matches('"');
            updated_at = DateTime::parse_from_rfc3339(val)
                .ok()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }

    Some(FileFrontmatter { id, updated_at })
}

/// Cheaply extract the conversation `id` from an exported JSON record.
pub fn extract_json_id(path: &Path) -> Option<String> {
    #[derive(Deserialize)]
    struct Minimal {
        id: String,
    }
    let file = File::open(path).ok()?;
    serde_json::from_reader::<_, Minimal>(BufReader::new(file))
        .ok()
        .map(|m| m.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_frontmatter() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "---\nid: abc-123\ntitle: x\nupdated_at: 2025-01-02T03:04:05Z\n---\n\n## [1] User\n"
        )
        .unwrap();

        let fm = parse_existing_frontmatter(file.path()).unwrap();
        assert_eq!(fm.id.as_deref(), Some("abc-123"));
        assert_eq!(
            fm.updated_at,
            "2025-01-02T03:04:05Z".parse::<DateTime<Utc>>().ok()
        );
    }

    #[test]
    fn test_frontmatter_requires_leading_marker() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id: abc").unwrap();
        assert!(parse_existing_frontmatter(file.path()).is_none());
    }

    #[test]
    fn test_output_format_flags() {
        assert!(OutputFormat::Both.markdown() && OutputFormat::Both.json());
        assert!(!OutputFormat::Json.markdown());
        assert!(!OutputFormat::Markdown.json());
    }

    #[test]
    fn test_summary_line() {
        let mut summary = Summary::default();
        summary.record(ProcessResult::Created);
        summary.record(ProcessResult::Skipped);
        assert_eq!(summary.to_string(), "Done. 1 created, 0 updated, 1 skipped.");

        summary.errors = 2;
        assert_eq!(
            summary.to_string(),
            "Done. 1 created, 0 updated, 1 skipped. Completed with 2 error(s)."
        );
    }

    #[test]
    fn test_store_errors_are_fatal() {
        let store_err = StoreError::Query {
            table: "cursorDiskKV",
            source: rusqlite::Error::InvalidQuery,
        };
        let report = eyre::Report::new(store_err).wrap_err("while exporting");
        assert!(is_fatal(&report));
        assert!(!is_fatal(&eyre::eyre!("disk full")));
    }
}
