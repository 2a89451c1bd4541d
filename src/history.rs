//! Flat JSON history log and settings record for the surrounding app.
//!
//! The engine never touches these; the CLI appends the summaries it gets
//! back from a merge and reads operator defaults from the settings file.
//! A missing or corrupt file reads as empty rather than failing a merge
//! that already succeeded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::engine::MergeResult;

/// One append-only history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub file: String,
    pub insumo: String,
    pub timestamp: String,
    pub result: MergeResult,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(file: impl Into<String>, insumo: impl Into<String>, result: MergeResult) -> Self {
        Self {
            file: file.into(),
            insumo: insumo.into(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            result,
        }
    }
}

/// Loads the history log.
#[must_use]
pub fn load_history(path: &Path) -> Vec<HistoryEntry> {
    fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default()
}

/// Appends one entry, rewriting the whole log.
pub fn append_history(path: &Path, entry: HistoryEntry) -> io::Result<()> {
    let mut entries = load_history(path);
    entries.push(entry);
    let text = serde_json::to_string_pretty(&entries)?;
    fs::write(path, text)
}

/// Operator defaults read by the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default Master workbook path.
    pub master: Option<PathBuf>,
    /// Default organizational area for personnel merges.
    pub default_area: Option<String>,
    /// History log location.
    pub history_file: Option<PathBuf>,
    /// Snapshot the Master before each merge.
    pub make_backup: Option<bool>,
}

/// Loads settings; a missing or corrupt file yields the defaults.
#[must_use]
pub fn load_config(path: &Path) -> Config {
    fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default()
}

/// Persists settings as pretty-printed JSON.
pub fn save_config(path: &Path, config: &Config) -> io::Result<()> {
    let text = serde_json::to_string_pretty(config)?;
    fs::write(path, text)
}
