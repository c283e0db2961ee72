use clap::Parser;
use cursor_chat_export::{ExportConfig, OutputFormat};
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Export Cursor AI chat history from state.vscdb to Markdown and JSON files.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory to export files into.
    /// Defaults to ./cursor-chat-export if not set in config.
    #[arg(value_name = "TARGET_DIR")]
    target_dir: Option<PathBuf>,

    /// Path to Cursor's state.vscdb.
    /// Auto-detected if omitted.
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/cursor-chat-export/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Export only this conversation id. Repeatable.
    #[arg(long = "conversation", value_name = "ID")]
    conversations: Vec<String>,

    /// Read structural documents from JSON dumps in this directory instead of the database.
    #[arg(long, value_name = "DIR")]
    structure_dir: Option<PathBuf>,

    /// Which files to write per conversation.
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Number of worker threads.
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// Overwrite existing files even if they are up to date.
    #[arg(short, long)]
    force: bool,

    /// Print each file written or skipped.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress standard output (progress bars).
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    target_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    format: Option<OutputFormat>,
    jobs: Option<usize>,
}

fn default_db_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("Cursor/User/globalStorage/state.vscdb"))
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("cursor-chat-export/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_directive = if verbose {
        "cursor_chat_export=debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Resolve target_dir (CLI > Config > Default)
    let target_dir = cli
        .target_dir
        .or(file_cfg.target_dir)
        .unwrap_or_else(|| PathBuf::from("cursor-chat-export"));

    // 3. Resolve db_path (CLI > Config > Auto-detect)
    let db_path = cli
        .db
        .or(file_cfg.db_path)
        .or_else(default_db_path)
        .ok_or_else(|| {
            eyre!("Could not determine database path.\nUse --db to specify manually, or set db_path in config.toml.")
        })?;

    if !db_path.exists() {
        return Err(eyre!(
            "Database not found at: {}\nUse --db to specify the path manually.",
            db_path.display()
        ));
    }

    // 4. Resolve format and worker count (CLI > Config > Default)
    let format = cli.format.or(file_cfg.format).unwrap_or_default();
    let jobs = cli.jobs.or(file_cfg.jobs).unwrap_or(1);
    if jobs == 0 {
        return Err(eyre!("--jobs must be at least 1"));
    }

    // 5. Build the Export Config
    let config = ExportConfig {
        target_dir,
        db_path,
        structure_dir: cli.structure_dir,
        conversations: cli.conversations,
        format,
        jobs,
        force: cli.force,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    // 6. Run the Business Logic
    cursor_chat_export::export(&config)?;
    Ok(())
}
