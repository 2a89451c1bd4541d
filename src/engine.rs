//! Merge orchestration: one synchronous read-modify-write transaction per
//! insumo file.
//!
//! Each call locks the destination path, snapshots the Master, computes the
//! whole merge in memory and only then rewrites the file. A failure during
//! mapping or reconciliation leaves the on-disk destination untouched.

#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};

use crate::backup;
use crate::error::{MergeError, Result};
use crate::formula;
use crate::header::{locate_header, HeaderMap, DEFAULT_SCAN_ROWS};
use crate::mapping::{EndpointColumns, EndpointTargets, PersonnelColumns, PersonnelTargets};
use crate::reconcile::{self, BatchContext};
use crate::replace;
use crate::rules::{self, Operation};
use crate::table::SourceTable;
use crate::text;
use crate::workbook::{CellValue, Workbook};

/// Leading rows preserved by default: header plus formula template.
pub const DEFAULT_RETAINED_ROWS: u32 = 2;

pub const PERSONNEL_SHEET: &str = "ESTADO_GEN_USUARIO";
pub const ANTIVIRUS_SHEET: &str = "Antivirus";
pub const TMP_SHEET: &str = "Useraranda_BLOGIK";
pub const DIRECTORY_SHEET: &str = "Reporte DA";

const PERSONNEL_DEST_HEADERS: &[&str] =
    &["CEDULA", "NOMBRE", "DEPENDENCIA", "AREA", "ESTADO", "INGRESO/RETIRO"];
const ENDPOINT_DEST_HEADERS: &[&str] = &[
    "Nombre de equipo",
    "IP",
    "Mac",
    "Last logged on user",
    "Protection Manager",
    "Estado",
];

/// The insumo types the engine accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsumoKind {
    /// Base inventory workbook; every sheet is adopted into the Master.
    Inventario,
    /// Endpoint/antivirus extract, replaced into the "Antivirus" sheet.
    Endpoint,
    /// Personnel roster, reconciled incrementally by cédula.
    Personal,
    /// TMP snapshot, replaced into "Useraranda_BLOGIK".
    Tmp,
    /// Active-directory report, replaced into "Reporte DA".
    Da,
}

impl InsumoKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inventario => "inventario",
            Self::Endpoint => "endpoint",
            Self::Personal => "personal",
            Self::Tmp => "tmp",
            Self::Da => "da",
        }
    }
}

impl fmt::Display for InsumoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsumoKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match text::normalize(s).as_str() {
            "inventario" | "inventory" => Ok(Self::Inventario),
            "endpoint" | "antivirus" => Ok(Self::Endpoint),
            "personal" | "personnel" => Ok(Self::Personal),
            "tmp" => Ok(Self::Tmp),
            "da" | "directorio" => Ok(Self::Da),
            other => Err(format!("unknown insumo type '{other}'")),
        }
    }
}

/// Caller-supplied hints for one merge.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Leading rows preserved in the target sheet.
    pub retained_rows: u32,
    /// Organizational area, overriding filename inference.
    pub area: Option<String>,
    /// Operation type, overriding filename inference.
    pub operation: Option<Operation>,
    /// File date, overriding the filename-derived one.
    pub file_date: Option<NaiveDate>,
    /// Snapshot the Master before writing.
    pub make_backup: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            retained_rows: DEFAULT_RETAINED_ROWS,
            area: None,
            operation: None,
            file_date: None,
            make_backup: true,
        }
    }
}

/// Summary returned synchronously to the caller. The engine does not
/// persist it; the surrounding app may log it to a history store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub sheet: String,
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub rows_written: usize,
    pub backup_path: Option<PathBuf>,
}

/// Merges one insumo file into the Master, dispatching per kind.
pub fn merge(
    master: &Path,
    source: &Path,
    kind: InsumoKind,
    options: &MergeOptions,
) -> Result<MergeResult> {
    match kind {
        InsumoKind::Inventario => merge_inventory(master, source, options),
        InsumoKind::Endpoint => merge_endpoint(master, source, options),
        InsumoKind::Personal => merge_personnel(master, source, options),
        InsumoKind::Tmp => merge_snapshot(master, source, TMP_SHEET, options),
        InsumoKind::Da => merge_snapshot(master, source, DIRECTORY_SHEET, options),
    }
}

/// Incremental personnel merge into `ESTADO_GEN_USUARIO`.
pub fn merge_personnel(
    master: &Path,
    source: &Path,
    options: &MergeOptions,
) -> Result<MergeResult> {
    let lock = write_guard(master);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    ensure_exists(master)?;
    let table = SourceTable::read(source)?;
    let columns = PersonnelColumns::resolve(&table, source)?;
    let backup_path = make_backup(master, options)?;

    let mut wb = Workbook::open(master)?;
    let sheet = wb
        .sheet_mut(PERSONNEL_SHEET)
        .ok_or_else(|| MergeError::SheetNotFound {
            path: master.to_path_buf(),
            sheet: PERSONNEL_SHEET.to_string(),
        })?;

    let header_row = locate_header(sheet, PERSONNEL_DEST_HEADERS, DEFAULT_SCAN_ROWS);
    let headers = HeaderMap::from_row(sheet, header_row);
    let targets =
        PersonnelTargets::from_headers(&headers).ok_or_else(|| MergeError::MissingColumn {
            path: master.to_path_buf(),
            sheet: PERSONNEL_SHEET.to_string(),
            column: "CEDULA".to_string(),
        })?;

    let filename = file_name(source);
    let ctx = BatchContext {
        operation: rules::resolve_operation(options.operation, &filename),
        area: rules::resolve_area(options.area.as_deref(), &filename),
        file_date: options
            .file_date
            .or_else(|| text::date_from_filename(&filename)),
    };

    let first_data_row = options.retained_rows + 1;
    let outcome =
        reconcile::merge_personnel_rows(sheet, targets, &columns, &table, &ctx, first_data_row);

    if options.retained_rows >= DEFAULT_RETAINED_ROWS {
        if let Some((start, end)) = outcome.appended_rows {
            formula::propagate(sheet, 2, start, end);
        }
    }

    wb.save()?;
    info!(
        "personnel merge into {}: {} added, {} updated, {} skipped",
        master.display(),
        outcome.added,
        outcome.updated,
        outcome.skipped
    );
    Ok(MergeResult {
        sheet: PERSONNEL_SHEET.to_string(),
        added: outcome.added,
        updated: outcome.updated,
        skipped: outcome.skipped,
        rows_written: outcome.added + outcome.updated,
        backup_path,
    })
}

/// Endpoint/antivirus merge: full replace of the "Antivirus" sheet with the
/// derived protection status, then removal of rows nobody logs on to.
pub fn merge_endpoint(
    master: &Path,
    source: &Path,
    options: &MergeOptions,
) -> Result<MergeResult> {
    let lock = write_guard(master);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    ensure_exists(master)?;
    let table = SourceTable::read(source)?;
    let columns = EndpointColumns::resolve(&table, source)?;
    let backup_path = make_backup(master, options)?;

    let mut wb = Workbook::open(master)?;
    let sheet = wb
        .sheet_mut(ANTIVIRUS_SHEET)
        .ok_or_else(|| MergeError::SheetNotFound {
            path: master.to_path_buf(),
            sheet: ANTIVIRUS_SHEET.to_string(),
        })?;

    let header_row = locate_header(sheet, ENDPOINT_DEST_HEADERS, DEFAULT_SCAN_ROWS);
    let headers = HeaderMap::from_row(sheet, header_row);
    let targets = EndpointTargets::from_headers(&headers);

    // stage every row before the region is cleared
    let mut staged: Vec<Vec<(u32, CellValue)>> = Vec::with_capacity(table.row_count());
    for record in table.rows() {
        let mut cells: Vec<(u32, CellValue)> = Vec::new();
        for (dest, src) in [
            (targets.machine, columns.machine),
            (targets.ip, columns.ip),
            (targets.mac, columns.mac),
            (targets.last_user, columns.last_user),
            (targets.protection, columns.protection),
        ] {
            if let (Some(dest), Some(value)) = (dest, record.value_at(src)) {
                cells.push((dest, value.clone()));
            }
        }
        let protection = record.text_at(columns.protection).unwrap_or_default();
        if let Some(dest) = targets.status {
            cells.push((
                dest,
                CellValue::Text(rules::antivirus_status(&protection).to_string()),
            ));
        }
        staged.push(cells);
    }

    let first_data_row = options.retained_rows + 1;
    sheet.truncate_rows(options.retained_rows);
    for (offset, cells) in staged.iter().enumerate() {
        let row = first_data_row + offset as u32;
        for (dest, value) in cells {
            sheet.set_cell(row, *dest, value.clone());
        }
    }
    let written = staged.len();

    // machines nobody logs on to are noise; scan bottom-up so a deletion
    // cannot shift the rows still to be visited
    let mut dropped = 0usize;
    if let Some(user_col) = targets.last_user {
        let mut row = first_data_row + written as u32;
        while row > first_data_row {
            row -= 1;
            if sheet.cell(row, user_col).is_blank() {
                sheet.delete_row(row);
                dropped += 1;
            }
        }
    }
    let kept = written - dropped;

    if options.retained_rows >= DEFAULT_RETAINED_ROWS && kept > 0 {
        formula::propagate(sheet, 2, first_data_row, first_data_row + kept as u32 - 1);
    }

    wb.save()?;
    info!(
        "endpoint merge into {}: {kept} rows kept, {dropped} dropped",
        master.display()
    );
    Ok(MergeResult {
        sheet: ANTIVIRUS_SHEET.to_string(),
        added: 0,
        updated: 0,
        skipped: dropped,
        rows_written: kept,
        backup_path,
    })
}

/// Snapshot merge: wholesale replace of one sheet's data region.
pub fn merge_snapshot(
    master: &Path,
    source: &Path,
    sheet_name: &str,
    options: &MergeOptions,
) -> Result<MergeResult> {
    let lock = write_guard(master);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    ensure_exists(master)?;
    let table = SourceTable::read(source)?;
    let backup_path = make_backup(master, options)?;

    let mut wb = Workbook::open(master)?;
    let sheet = wb
        .sheet_mut(sheet_name)
        .ok_or_else(|| MergeError::SheetNotFound {
            path: master.to_path_buf(),
            sheet: sheet_name.to_string(),
        })?;

    let rows_written = replace::replace_with_table(sheet, &table, options.retained_rows, source)?;

    wb.save()?;
    info!(
        "snapshot merge into {} sheet '{sheet_name}': {rows_written} rows",
        master.display()
    );
    Ok(MergeResult {
        sheet: sheet_name.to_string(),
        added: 0,
        updated: 0,
        skipped: 0,
        rows_written,
        backup_path,
    })
}

/// Base load: every sheet of the source workbook is adopted wholesale into
/// the Master, which is created when absent.
pub fn merge_inventory(
    master: &Path,
    source: &Path,
    options: &MergeOptions,
) -> Result<MergeResult> {
    let lock = write_guard(master);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    let source_wb = Workbook::open(source)?;
    let (mut wb, backup_path) = if master.exists() {
        let backup_path = make_backup(master, options)?;
        (Workbook::open(master)?, backup_path)
    } else {
        (Workbook::empty(master), None)
    };

    let mut rows_written = 0usize;
    let mut adopted = Vec::new();
    for sheet in source_wb.into_sheets() {
        rows_written += sheet.max_row() as usize;
        adopted.push(sheet.name().to_string());
        wb.put_sheet(sheet);
    }

    wb.save()?;
    info!(
        "inventory load into {}: {} sheets, {rows_written} rows",
        master.display(),
        adopted.len()
    );
    Ok(MergeResult {
        sheet: adopted.join(", "),
        added: adopted.len(),
        updated: 0,
        skipped: 0,
        rows_written,
        backup_path,
    })
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(MergeError::FileNotFound(path.to_path_buf()))
    }
}

fn make_backup(master: &Path, options: &MergeOptions) -> Result<Option<PathBuf>> {
    if options.make_backup {
        backup::backup(master).map(Some)
    } else {
        Ok(None)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |s| s.to_string_lossy().into_owned(),
    )
}

static WORKBOOK_LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

/// Serializes merges against the same destination workbook. Nothing else
/// prevents two simultaneous merges from racing on one Master file.
fn write_guard(path: &Path) -> Arc<Mutex<()>> {
    let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let registry = WORKBOOK_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = registry.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(map.entry(key).or_default())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;
    use rust_xlsxwriter::Formula;

    use super::*;

    const PERSONNEL_HEADERS: [&str; 7] = [
        "CEDULA",
        "NOMBRE",
        "DEPENDENCIA",
        "AREA",
        "ESTADO",
        "INGRESO/RETIRO",
        "CONTROL",
    ];

    fn build_personnel_master(path: &Path) {
        let mut book = rust_xlsxwriter::Workbook::new();
        let ws = book.add_worksheet();
        ws.set_name(PERSONNEL_SHEET).unwrap();
        for (c, header) in PERSONNEL_HEADERS.iter().enumerate() {
            ws.write_string(0, c as u16, *header).unwrap();
        }
        ws.write_formula(1, 6, Formula::new("=F2+365")).unwrap();
        ws.write_string(4, 0, "123456").unwrap();
        ws.write_string(4, 1, "Ana Gómez").unwrap();
        ws.write_string(4, 4, "ACTIVE FIDU PLANTA").unwrap();
        book.save(path).unwrap();
    }

    fn build_personnel_source(path: &Path) {
        let mut book = rust_xlsxwriter::Workbook::new();
        let ws = book.add_worksheet();
        ws.write_string(0, 0, "Documento").unwrap();
        ws.write_string(0, 1, "FECHA TERMINACIÓN").unwrap();
        ws.write_string(0, 2, "Primer apellido").unwrap();
        ws.write_string(0, 3, "Primer nombre").unwrap();
        ws.write_string(1, 0, "123.456").unwrap();
        ws.write_string(1, 1, "2024-03-01").unwrap();
        ws.write_string(2, 0, "999888").unwrap();
        ws.write_string(2, 2, "Rojas").unwrap();
        ws.write_string(2, 3, "Luis").unwrap();
        book.save(path).unwrap();
    }

    #[test]
    fn personnel_merge_updates_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("Maestro.xlsx");
        let source = dir.path().join("retiros_planta.xlsx");
        build_personnel_master(&master);
        build_personnel_source(&source);

        let result = merge_personnel(&master, &source, &MergeOptions::default()).unwrap();

        assert_eq!(result.updated, 1);
        assert_eq!(result.added, 1);
        assert_eq!(result.skipped, 0);
        assert_eq!(result.rows_written, 2);
        assert!(result.backup_path.is_some());

        let wb = Workbook::open(&master).unwrap();
        let sheet = wb.sheet(PERSONNEL_SHEET).unwrap();
        // existing row reconciled in place, status recomputed
        assert_eq!(sheet.cell(5, 1).to_display(), "123456");
        assert_eq!(sheet.cell(5, 2).to_display(), "Ana Gómez");
        assert_eq!(sheet.cell(5, 5).to_display(), "TERMINATED FIDU PLANTA");
        // new person appended below, formula template propagated
        assert_eq!(sheet.cell(6, 1).to_display(), "999888");
        assert_eq!(sheet.cell(6, 2).to_display(), "Rojas Luis");
        assert_eq!(sheet.cell(6, 5).to_display(), "TERMINATED FIDU PLANTA");
        assert_eq!(sheet.cell(6, 7).formula_text(), Some("=F2+365"));
    }

    #[test]
    fn backup_is_written_next_to_the_master() {
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("Maestro.xlsx");
        let source = dir.path().join("ingresos.xlsx");
        build_personnel_master(&master);
        build_personnel_source(&source);

        let result = merge_personnel(&master, &source, &MergeOptions::default()).unwrap();

        let backup_path = result.backup_path.unwrap();
        assert!(backup_path.exists());
        assert!(backup_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("Maestro_backup_"));
    }

    #[test]
    fn schema_error_leaves_master_untouched_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("Maestro.xlsx");
        let source = dir.path().join("precios.csv");
        build_personnel_master(&master);
        fs::write(&source, "Precio,Marca\n1,2\n").unwrap();
        let before = fs::read(&master).unwrap();

        let err = merge_personnel(&master, &source, &MergeOptions::default()).unwrap_err();

        assert!(matches!(err, MergeError::Schema { .. }));
        assert_eq!(fs::read(&master).unwrap(), before);
        // no backup was taken for a rejected file
        let siblings: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(siblings.len(), 2);
    }

    #[test]
    fn missing_sheet_is_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("Maestro.xlsx");
        let source = dir.path().join("personal.csv");
        let mut book = rust_xlsxwriter::Workbook::new();
        book.add_worksheet().set_name("Otra").unwrap();
        book.save(&master).unwrap();
        fs::write(&source, "Documento\n1\n").unwrap();

        let err = merge_personnel(&master, &source, &MergeOptions::default()).unwrap_err();

        match err {
            MergeError::SheetNotFound { sheet, .. } => assert_eq!(sheet, PERSONNEL_SHEET),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn endpoint_merge_derives_status_and_drops_idle_machines() {
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("Maestro.xlsx");
        let source = dir.path().join("endpoint.csv");

        let mut book = rust_xlsxwriter::Workbook::new();
        let ws = book.add_worksheet();
        ws.set_name(ANTIVIRUS_SHEET).unwrap();
        for (c, header) in ENDPOINT_DEST_HEADERS.iter().enumerate() {
            ws.write_string(0, c as u16, *header).unwrap();
        }
        book.save(&master).unwrap();

        fs::write(
            &source,
            "Nombre de equipo,IP,Last logged on user,Protection Manager\n\
             PC-1,10.0.0.1,jperez,Standard Endpoint Protection\n\
             PC-2,10.0.0.2,,Standard Endpoint Protection\n",
        )
        .unwrap();

        let result = merge_endpoint(&master, &source, &MergeOptions::default()).unwrap();

        assert_eq!(result.rows_written, 1);
        assert_eq!(result.skipped, 1);

        let wb = Workbook::open(&master).unwrap();
        let sheet = wb.sheet(ANTIVIRUS_SHEET).unwrap();
        assert_eq!(sheet.cell(3, 1).to_display(), "PC-1");
        assert_eq!(sheet.cell(3, 6).to_display(), "Antivirus Installed");
        assert_eq!(sheet.max_row(), 3);
    }

    #[test]
    fn snapshot_merge_replaces_sheet_data() {
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("Maestro.xlsx");
        let source = dir.path().join("reporte_da.csv");

        let mut book = rust_xlsxwriter::Workbook::new();
        let ws = book.add_worksheet();
        ws.set_name(DIRECTORY_SHEET).unwrap();
        ws.write_string(0, 0, "Usuario").unwrap();
        ws.write_string(0, 1, "Oficina").unwrap();
        ws.write_string(2, 0, "viejo").unwrap();
        ws.write_string(3, 0, "viejo2").unwrap();
        book.save(&master).unwrap();

        fs::write(&source, "Usuario,Oficina\nana,Bogotá\nluis,Cali\n").unwrap();

        let result = merge(&master, &source, InsumoKind::Da, &MergeOptions::default()).unwrap();

        assert_eq!(result.sheet, DIRECTORY_SHEET);
        assert_eq!(result.rows_written, 2);

        let wb = Workbook::open(&master).unwrap();
        let sheet = wb.sheet(DIRECTORY_SHEET).unwrap();
        assert_eq!(sheet.cell(3, 1).to_display(), "ana");
        assert_eq!(sheet.cell(4, 1).to_display(), "luis");
        assert_eq!(sheet.max_row(), 4);
    }

    #[test]
    fn inventory_load_creates_the_master() {
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("Maestro.xlsx");
        let source = dir.path().join("inventario.xlsx");

        let mut book = rust_xlsxwriter::Workbook::new();
        let ws = book.add_worksheet();
        ws.set_name("Inventario de proveedor").unwrap();
        ws.write_string(0, 0, "Serial").unwrap();
        ws.write_string(1, 0, "ABC-1").unwrap();
        book.save(&source).unwrap();

        let result =
            merge(&master, &source, InsumoKind::Inventario, &MergeOptions::default()).unwrap();

        assert_eq!(result.added, 1);
        assert!(master.exists());
        let wb = Workbook::open(&master).unwrap();
        assert!(wb.sheet("Inventario de proveedor").is_some());
    }

    #[test]
    fn insumo_kind_parses_cli_names() {
        assert_eq!("personal".parse(), Ok(InsumoKind::Personal));
        assert_eq!("ENDPOINT".parse(), Ok(InsumoKind::Endpoint));
        assert_eq!("da".parse(), Ok(InsumoKind::Da));
        assert!("factura".parse::<InsumoKind>().is_err());
    }
}
