//! Incremental merge strategy: reconcile source rows against existing
//! destination rows by natural key.
//!
//! Upstream files often carry only the changed subset of columns per run, so
//! updates are non-destructive: a blank incoming field never erases a
//! previously known value. The derived status is the one exception and is
//! always recomputed.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use log::debug;

use crate::mapping::{PersonnelColumns, PersonnelTargets};
use crate::rules::{self, Operation};
use crate::table::{SourceRecord, SourceTable};
use crate::text::clean_key;
use crate::workbook::{CellValue, Sheet};

/// Batch-level context resolved once per merge.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub operation: Operation,
    pub area: String,
    pub file_date: Option<NaiveDate>,
}

/// Counts from one incremental merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Lowest and highest appended row, for formula propagation.
    pub appended_rows: Option<(u32, u32)>,
}

/// Indexes existing data rows by cleaned key; first occurrence wins when the
/// destination already carries duplicates.
#[must_use]
pub fn index_existing(sheet: &Sheet, key_col: u32, first_data_row: u32) -> HashMap<String, u32> {
    let mut index = HashMap::new();
    for row in first_data_row..=sheet.max_row() {
        if let Some(key) = clean_key(&sheet.cell(row, key_col).to_display()) {
            index.entry(key).or_insert(row);
        }
    }
    index
}

/// Merges `table` into `sheet`, updating rows whose key already exists and
/// appending the rest. Rows without a parseable key are skipped and counted;
/// the merge never aborts on a single bad row.
pub fn merge_personnel_rows(
    sheet: &mut Sheet,
    targets: PersonnelTargets,
    columns: &PersonnelColumns,
    table: &SourceTable,
    ctx: &BatchContext,
    first_data_row: u32,
) -> ReconcileOutcome {
    let mut existing = index_existing(sheet, targets.key, first_data_row);
    let mut outcome = ReconcileOutcome::default();
    let mut appended: Option<(u32, u32)> = None;

    for record in table.rows() {
        let Some(key) = record
            .text_at(columns.document)
            .and_then(|raw| clean_key(&raw))
        else {
            outcome.skipped += 1;
            continue;
        };

        let name = compose_full_name(&record, columns);
        let department = record.text_at(columns.department);
        let area = record
            .text_at(columns.area)
            .unwrap_or_else(|| ctx.area.clone());
        let date = row_date(&record, columns, ctx.file_date);
        let row_has_termination = record.value_at(columns.termination_date).is_some()
            || record.value_at(columns.end_date).is_some();
        let status = rules::personnel_status(ctx.operation, &area, row_has_termination);

        let row = if let Some(&row) = existing.get(&key) {
            outcome.updated += 1;
            row
        } else {
            let row = (sheet.max_row() + 1).max(first_data_row);
            sheet.set_cell(row, targets.key, CellValue::Text(key.clone()));
            existing.insert(key, row);
            appended = Some(match appended {
                Some((min, max)) => (min.min(row), max.max(row)),
                None => (row, row),
            });
            outcome.added += 1;
            row
        };

        write_if_present(sheet, row, targets.name, name);
        write_if_present(sheet, row, targets.department, department);
        write_if_present(sheet, row, targets.area, Some(area));
        if let (Some(col), Some(value)) = (targets.date, date) {
            sheet.set_cell(row, col, value);
        }
        // derived status always overwrites, even for sparse incoming rows
        if let Some(col) = targets.status {
            sheet.set_cell(row, col, CellValue::Text(status));
        }
    }

    outcome.appended_rows = appended;
    debug!(
        "reconciled {} rows: {} added, {} updated, {} skipped",
        table.row_count(),
        outcome.added,
        outcome.updated,
        outcome.skipped
    );
    outcome
}

/// Full name from an explicit column, or composed surnames-first from the
/// four name-part columns, skipping blanks.
fn compose_full_name(record: &SourceRecord<'_>, columns: &PersonnelColumns) -> Option<String> {
    if let Some(name) = record.text_at(columns.full_name) {
        return Some(name);
    }
    let parts: Vec<String> = [
        columns.first_surname,
        columns.second_surname,
        columns.first_name,
        columns.middle_name,
    ]
    .into_iter()
    .filter_map(|col| record.text_at(col))
    .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Date for the row: termination > end > start, else the batch file date.
fn row_date(
    record: &SourceRecord<'_>,
    columns: &PersonnelColumns,
    file_date: Option<NaiveDate>,
) -> Option<CellValue> {
    for col in [columns.termination_date, columns.end_date, columns.start_date] {
        if let Some(value) = record.value_at(col) {
            return Some(value.clone());
        }
    }
    file_date.map(|date| CellValue::DateTime(date.and_time(NaiveTime::MIN)))
}

fn write_if_present(sheet: &mut Sheet, row: u32, col: Option<u32>, value: Option<String>) {
    if let (Some(col), Some(value)) = (col, value) {
        if !value.trim().is_empty() {
            sheet.set_cell(row, col, CellValue::Text(value));
        }
    }
}
