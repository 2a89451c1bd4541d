//! maestro-sync: CLI entry point.
//!
//! Integrates insumo files into the Maestro workbook and keeps a JSON
//! history of operations.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize as _;

use maestro_sync::engine::{self, InsumoKind, MergeOptions, MergeResult};
use maestro_sync::history::{self, Config, HistoryEntry};
use maestro_sync::rules::Operation;

const DEFAULT_MASTER: &str = "static/Maestro.xlsx";
const DEFAULT_HISTORY: &str = "historial.json";

#[derive(Parser)]
#[command(name = "maestro-sync")]
#[command(about = "Merges insumo spreadsheets into the Maestro workbook")]
#[command(version)]
struct Cli {
    /// Path to the JSON settings file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Integrate one insumo file into the Master.
    Integrate {
        /// Insumo type: inventario, endpoint, personal, tmp or da.
        #[arg(short, long)]
        insumo: String,

        /// Source insumo file (.xlsx, .xls or .csv).
        #[arg(short, long)]
        source: PathBuf,

        /// Master workbook (defaults to the configured one).
        #[arg(short, long)]
        master: Option<PathBuf>,

        /// Leading rows preserved in the target sheet (header + template).
        #[arg(long, default_value_t = engine::DEFAULT_RETAINED_ROWS)]
        keep_rows: u32,

        /// Organizational area hint for personnel insumos.
        #[arg(long)]
        area: Option<String>,

        /// Operation hint for personnel insumos (hire/termination).
        #[arg(long)]
        operation: Option<String>,

        /// File date override, YYYY-MM-DD.
        #[arg(long)]
        file_date: Option<String>,

        /// Skip the pre-merge backup.
        #[arg(long)]
        no_backup: bool,

        /// History log to append to.
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Show the operation history.
    History {
        /// History log to read.
        #[arg(long)]
        history: Option<PathBuf>,

        /// Most recent entries to show.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// List insumo files in the uploads directory.
    Files {
        /// Directory to list.
        #[arg(short, long, default_value = "uploads")]
        dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = history::load_config(&cli.config);

    match cli.command {
        Command::Integrate {
            insumo,
            source,
            master,
            keep_rows,
            area,
            operation,
            file_date,
            no_backup,
            history,
        } => run_integrate(
            &config,
            &insumo,
            &source,
            master,
            keep_rows,
            area,
            operation.as_deref(),
            file_date.as_deref(),
            no_backup,
            history,
        ),
        Command::History { history, limit } => {
            run_history(&history_path(&config, history), limit);
            Ok(())
        }
        Command::Files { dir } => run_files(&dir),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_integrate(
    config: &Config,
    insumo: &str,
    source: &Path,
    master: Option<PathBuf>,
    keep_rows: u32,
    area: Option<String>,
    operation: Option<&str>,
    file_date: Option<&str>,
    no_backup: bool,
    history: Option<PathBuf>,
) -> anyhow::Result<()> {
    let kind: InsumoKind = insumo
        .parse()
        .map_err(|message: String| anyhow::anyhow!(message))?;
    let master = master
        .or_else(|| config.master.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MASTER));

    let operation = operation
        .map(|text| {
            text.parse::<Operation>()
                .map_err(|message| anyhow::anyhow!(message))
        })
        .transpose()?;
    let file_date = file_date
        .map(|text| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .with_context(|| format!("invalid file date '{text}', expected YYYY-MM-DD"))
        })
        .transpose()?;

    let options = MergeOptions {
        retained_rows: keep_rows,
        area: area.or_else(|| config.default_area.clone()),
        operation,
        file_date,
        make_backup: !no_backup && config.make_backup.unwrap_or(true),
    };

    println!("{}", "maestro-sync".bold());
    println!("  Master: {}", master.display());
    println!("  Insumo: {kind} ({})", source.display());
    println!();

    let result = engine::merge(&master, source, kind, &options)
        .with_context(|| format!("integrating {} as {kind}", source.display()))?;
    print_result(&result);

    let entry = HistoryEntry::new(
        source.file_name().map_or_else(
            || source.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        ),
        kind.as_str(),
        result,
    );
    let history = history_path(config, history);
    history::append_history(&history, entry)
        .with_context(|| format!("appending to {}", history.display()))?;

    Ok(())
}

fn print_result(result: &MergeResult) {
    println!(
        "  {} sheet {}: {} added, {} updated, {} skipped, {} rows written",
        "✓".green(),
        result.sheet.bold(),
        result.added.to_string().green(),
        result.updated,
        result.skipped,
        result.rows_written
    );
    if let Some(backup) = &result.backup_path {
        println!("  backup: {}", backup.display().to_string().dimmed());
    }
}

fn run_history(path: &Path, limit: usize) {
    let entries = history::load_history(path);
    if entries.is_empty() {
        println!("No history at {}", path.display());
        return;
    }
    let start = entries.len().saturating_sub(limit);
    for entry in &entries[start..] {
        println!(
            "  {} {} {} → {} ({} added, {} updated, {} skipped)",
            entry.timestamp.dimmed(),
            entry.insumo.bold(),
            entry.file,
            entry.result.sheet,
            entry.result.added,
            entry.result.updated,
            entry.result.skipped
        );
    }
    println!();
    println!("{} of {} entries", entries.len().min(limit), entries.len());
}

/// Listing is derived from the directory on every call; there is no
/// process-wide cache to keep consistent.
fn run_files(dir: &Path) -> anyhow::Result<()> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .with_context(|| format!("cannot read {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    if names.is_empty() {
        println!("No files in {}", dir.display());
        return Ok(());
    }
    for name in &names {
        println!("  {name}");
    }
    println!();
    println!("{} files", names.len());
    Ok(())
}

fn history_path(config: &Config, explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| config.history_file.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY))
}
