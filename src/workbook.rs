//! In-memory workbook store.
//!
//! A merge opens the destination workbook into memory, mutates it, and only
//! replaces the on-disk file once the whole merge has succeeded. Values and
//! formula text are read with calamine; saving rewrites the workbook with
//! `rust_xlsxwriter` through a sibling temp file.

#![allow(clippy::cast_possible_truncation)]

use std::fs::File;
use std::io::{BufReader, Write as _};
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Reader as _, Xlsx};
use chrono::NaiveDateTime;
use log::debug;
use rust_xlsxwriter::{Format, Formula};

use crate::error::{MergeError, Result};
use crate::text::normalize;

static EMPTY: CellValue = CellValue::Empty;

/// A single cell value.
///
/// Formulas are opaque text (kept with the leading `=`); the engine never
/// evaluates them and relies on recalculation-on-load in the destination
/// format.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    DateTime(NaiveDateTime),
    Formula(String),
}

impl CellValue {
    /// Whether this cell counts as blank for merge decisions.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Formula text when the cell carries the `=` marker.
    #[must_use]
    pub fn formula_text(&self) -> Option<&str> {
        match self {
            Self::Formula(f) => Some(f),
            Self::Text(s) if s.starts_with('=') => Some(s),
            _ => None,
        }
    }

    /// Display form used for key cleaning and header matching.
    #[must_use]
    pub fn to_display(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Number(n) => format!("{n}"),
            Self::Text(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::DateTime(dt) => dt.format("%Y-%m-%d").to_string(),
            Self::Formula(f) => f.clone(),
        }
    }
}

impl From<&Data> for CellValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Self::Empty,
            Data::Int(i) => Self::Number(*i as f64),
            Data::Float(f) => Self::Number(*f),
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Self::Text(s.clone()),
            Data::Bool(b) => Self::Bool(*b),
            Data::Error(e) => Self::Text(format!("{e:?}")),
            Data::DateTime(dt) => dt
                .as_datetime()
                .map_or_else(|| Self::Number(dt.as_f64()), Self::DateTime),
        }
    }
}

/// One worksheet: an ordered, 1-indexed grid of cells.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    name: String,
    rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Highest populated row number; 0 for an empty sheet.
    #[must_use]
    pub fn max_row(&self) -> u32 {
        self.rows.len() as u32
    }

    /// Widest populated column number; 0 for an empty sheet.
    #[must_use]
    pub fn max_column(&self) -> u32 {
        self.rows.iter().map(Vec::len).max().unwrap_or(0) as u32
    }

    /// Cell at `(row, col)`, both 1-indexed. Out-of-range reads are empty.
    #[must_use]
    pub fn cell(&self, row: u32, col: u32) -> &CellValue {
        if row == 0 || col == 0 {
            return &EMPTY;
        }
        self.rows
            .get(row as usize - 1)
            .and_then(|r| r.get(col as usize - 1))
            .unwrap_or(&EMPTY)
    }

    /// Writes `value` at `(row, col)`, growing the grid as needed.
    pub fn set_cell(&mut self, row: u32, col: u32, value: CellValue) {
        if row == 0 || col == 0 {
            return;
        }
        let (ri, ci) = (row as usize - 1, col as usize - 1);
        if self.rows.len() <= ri {
            self.rows.resize_with(ri + 1, Vec::new);
        }
        let cells = &mut self.rows[ri];
        if cells.len() <= ci {
            cells.resize_with(ci + 1, CellValue::default);
        }
        cells[ci] = value;
    }

    /// Removes one row, shifting the rows below it up.
    pub fn delete_row(&mut self, row: u32) {
        if row >= 1 && (row as usize) <= self.rows.len() {
            self.rows.remove(row as usize - 1);
        }
    }

    /// Drops every row past the first `keep` rows.
    pub fn truncate_rows(&mut self, keep: u32) {
        self.rows.truncate(keep as usize);
    }
}

/// A destination workbook, owned exclusively in memory for one merge.
#[derive(Debug, Clone)]
pub struct Workbook {
    path: PathBuf,
    sheets: Vec<Sheet>,
}

impl Workbook {
    /// A new workbook with no sheets, to be created at `path` on save.
    #[must_use]
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            sheets: Vec::new(),
        }
    }

    /// Opens an xlsx workbook, capturing cell values and formula text.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MergeError::FileNotFound(path.to_path_buf()));
        }
        let rerr = |source: calamine::Error| MergeError::Read {
            path: path.to_path_buf(),
            source,
        };
        let mut book: Xlsx<BufReader<File>> =
            open_workbook(path).map_err(|e: calamine::XlsxError| rerr(e.into()))?;

        let mut sheets = Vec::new();
        for name in book.sheet_names() {
            let mut sheet = Sheet::new(&name);
            let range = book.worksheet_range(&name).map_err(|e| rerr(e.into()))?;
            if let Some((r0, c0)) = range.start() {
                for (r, row) in range.rows().enumerate() {
                    for (c, data) in row.iter().enumerate() {
                        let value = CellValue::from(data);
                        if value != CellValue::Empty {
                            sheet.set_cell(r0 + r as u32 + 1, c0 + c as u32 + 1, value);
                        }
                    }
                }
            }
            // formula text overlays the cached value calamine reports
            if let Ok(formulas) = book.worksheet_formula(&name) {
                if let Some((r0, c0)) = formulas.start() {
                    for (r, row) in formulas.rows().enumerate() {
                        for (c, text) in row.iter().enumerate() {
                            if !text.is_empty() {
                                sheet.set_cell(
                                    r0 + r as u32 + 1,
                                    c0 + c as u32 + 1,
                                    CellValue::Formula(format!("={text}")),
                                );
                            }
                        }
                    }
                }
            }
            debug!("loaded sheet '{name}' ({} rows)", sheet.max_row());
            sheets.push(sheet);
        }

        Ok(Self {
            path: path.to_path_buf(),
            sheets,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(Sheet::name).collect()
    }

    /// Sheet lookup, case-insensitive and whitespace-normalized.
    #[must_use]
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        let want = normalize(name);
        self.sheets.iter().find(|s| normalize(&s.name) == want)
    }

    /// Mutable sheet lookup under the same normalization.
    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        let want = normalize(name);
        self.sheets.iter_mut().find(|s| normalize(&s.name) == want)
    }

    /// Replaces a same-named sheet wholesale, or appends it.
    pub fn put_sheet(&mut self, sheet: Sheet) {
        let want = normalize(sheet.name());
        if let Some(slot) = self.sheets.iter_mut().find(|s| normalize(&s.name) == want) {
            *slot = sheet;
        } else {
            self.sheets.push(sheet);
        }
    }

    /// Consumes the workbook, yielding its sheets.
    #[must_use]
    pub fn into_sheets(self) -> Vec<Sheet> {
        self.sheets
    }

    /// Saves back to the path the workbook was opened from.
    pub fn save(&self) -> Result<()> {
        self.save_to(&self.path.clone())
    }

    /// Writes the workbook to `path` through a sibling temp file, so the
    /// destination is replaced only once the complete file is on disk.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let werr = |source: rust_xlsxwriter::XlsxError| MergeError::Write {
            path: path.to_path_buf(),
            source,
        };
        let mut book = rust_xlsxwriter::Workbook::new();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");

        for sheet in &self.sheets {
            let ws = book.add_worksheet();
            ws.set_name(sheet.name.as_str()).map_err(werr)?;
            for (ri, row) in sheet.rows.iter().enumerate() {
                let r = ri as u32;
                for (ci, cell) in row.iter().enumerate() {
                    let c = u16::try_from(ci)
                        .map_err(|_| MergeError::ColumnOverflow(ci as u32 + 1))?;
                    match cell {
                        CellValue::Empty => {}
                        CellValue::Number(n) => {
                            ws.write_number(r, c, *n).map_err(werr)?;
                        }
                        CellValue::Text(s) => {
                            ws.write_string(r, c, s.as_str()).map_err(werr)?;
                        }
                        CellValue::Bool(b) => {
                            ws.write_boolean(r, c, *b).map_err(werr)?;
                        }
                        CellValue::DateTime(dt) => {
                            ws.write_datetime_with_format(r, c, dt, &date_format)
                                .map_err(werr)?;
                        }
                        CellValue::Formula(f) => {
                            ws.write_formula(r, c, Formula::new(f)).map_err(werr)?;
                        }
                    }
                }
            }
        }

        let buffer = book.save_to_buffer().map_err(werr)?;
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut staged = tempfile::NamedTempFile::new_in(parent)?;
        staged.write_all(&buffer)?;
        staged.persist(path).map_err(|e| MergeError::Io(e.error))?;
        debug!("saved workbook {}", path.display());
        Ok(())
    }
}
