//! Full-replace strategy for snapshot insumos.
//!
//! The incoming table becomes the sheet's entire data region. The region is
//! staged and the mapping validated before any destination row is dropped,
//! so a failure partway cannot leave the sheet half-cleared.

#![allow(clippy::cast_possible_truncation)]

use std::path::Path;

use log::debug;

use crate::error::{MergeError, Result};
use crate::formula;
use crate::header::{locate_header, HeaderMap, DEFAULT_SCAN_ROWS};
use crate::table::SourceTable;
use crate::workbook::{CellValue, Sheet};

/// Replaces the data region of `sheet` with `table`, preserving the first
/// `retained_rows` rows (header, and template when there are two). Incoming
/// columns map per-cell onto the destination column with the same normalized
/// header; columns with no match are dropped. Returns rows written.
pub fn replace_with_table(
    sheet: &mut Sheet,
    table: &SourceTable,
    retained_rows: u32,
    source_path: &Path,
) -> Result<usize> {
    let column_names: Vec<&str> = table.columns().iter().map(String::as_str).collect();
    let header_row = locate_header(sheet, &column_names, DEFAULT_SCAN_ROWS);
    let headers = HeaderMap::from_row(sheet, header_row);

    let mapped: Vec<(usize, u32)> = table
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(index, name)| headers.get(name).map(|dest| (index, dest)))
        .collect();
    if mapped.is_empty() {
        return Err(MergeError::Schema {
            path: source_path.to_path_buf(),
            expected: headers.names().join(", "),
        });
    }

    // stage the whole region before touching the sheet
    let staged: Vec<Vec<(u32, CellValue)>> = table
        .rows()
        .map(|record| {
            mapped
                .iter()
                .map(|&(index, dest)| (dest, record.get(index).clone()))
                .collect()
        })
        .collect();

    let first_data_row = retained_rows + 1;
    sheet.truncate_rows(retained_rows);
    for (offset, cells) in staged.iter().enumerate() {
        let row = first_data_row + offset as u32;
        for (dest, value) in cells {
            if !value.is_blank() {
                sheet.set_cell(row, *dest, value.clone());
            }
        }
    }

    let rows_written = staged.len();
    if retained_rows >= 2 && rows_written > 0 {
        formula::propagate(
            sheet,
            2,
            first_data_row,
            first_data_row + rows_written as u32 - 1,
        );
    }
    debug!(
        "replaced data region with {rows_written} rows from {}",
        source_path.display()
    );
    Ok(rows_written)
}
