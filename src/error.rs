//! Error taxonomy for merge operations.
//!
//! Row-level problems (an unparseable reconciliation key) are not errors:
//! the row is skipped and counted in the merge result instead.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, MergeError>;

/// Failures surfaced synchronously by a merge call.
///
/// Every variant names the offending file so the operator can tell which
/// insumo or Master was at fault; there are no retries in the engine.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Source or destination file is missing on disk.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The target sheet is absent from the destination workbook.
    #[error("sheet '{sheet}' not found in {}", path.display())]
    SheetNotFound { path: PathBuf, sheet: String },

    /// None of the declared source fields exist — wrong file type supplied.
    #[error("no mappable column found in {}: expected any of [{expected}]", path.display())]
    Schema { path: PathBuf, expected: String },

    /// A required destination column is missing from the target sheet.
    #[error("required column '{column}' missing from sheet '{sheet}' in {}", path.display())]
    MissingColumn {
        path: PathBuf,
        sheet: String,
        column: String,
    },

    /// The spreadsheet could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    /// A CSV source could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The workbook could not be written back.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },

    /// A column index beyond the xlsx column limit was produced.
    #[error("column {0} exceeds the xlsx column limit")]
    ColumnOverflow(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
