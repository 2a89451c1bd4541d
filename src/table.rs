//! Tabular source reader.
//!
//! Reads one insumo file into an ordered table: .xlsx/.xls via calamine,
//! .csv via the csv crate. The first non-empty row of the first populated
//! sheet is taken as the column header. A table is read once per merge and
//! never persisted.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader as _};
use log::debug;

use crate::error::{MergeError, Result};
use crate::text::normalize;
use crate::workbook::CellValue;

static EMPTY: CellValue = CellValue::Empty;

/// An in-memory source table.
#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl SourceTable {
    /// Reads `path`, dispatching on the file extension.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MergeError::FileNotFound(path.to_path_buf()));
        }
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            Self::read_csv(path)
        } else {
            Self::read_spreadsheet(path)
        }
    }

    fn read_spreadsheet(path: &Path) -> Result<Self> {
        let rerr = |source: calamine::Error| MergeError::Read {
            path: path.to_path_buf(),
            source,
        };
        let mut book = open_workbook_auto(path).map_err(rerr)?;

        for name in book.sheet_names() {
            let range = book.worksheet_range(&name).map_err(rerr)?;
            if range.is_empty() {
                continue;
            }
            let mut rows_iter = range.rows();
            let mut columns: Vec<String> = Vec::new();
            for row in rows_iter.by_ref() {
                if row.iter().any(|data| !matches!(data, Data::Empty)) {
                    columns = row
                        .iter()
                        .map(|data| CellValue::from(data).to_display().trim().to_string())
                        .collect();
                    break;
                }
            }
            if columns.iter().all(String::is_empty) {
                continue;
            }
            let rows: Vec<Vec<CellValue>> = rows_iter
                .map(|row| row.iter().map(CellValue::from).collect())
                .collect();
            debug!(
                "read {} rows from sheet '{name}' of {}",
                rows.len(),
                path.display()
            );
            return Ok(Self { columns, rows });
        }
        Ok(Self::default())
    }

    fn read_csv(path: &Path) -> Result<Self> {
        let cerr = |source: csv::Error| MergeError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(cerr)?;
        let columns: Vec<String> = reader
            .headers()
            .map_err(cerr)?
            .iter()
            .map(|name| name.trim().to_string())
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(cerr)?;
            rows.push(record.iter().map(parse_csv_cell).collect());
        }
        debug!("read {} rows from {}", rows.len(), path.display());
        Ok(Self { columns, rows })
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Iterates the data rows in source order.
    pub fn rows(&self) -> impl Iterator<Item = SourceRecord<'_>> {
        self.rows.iter().map(|cells| SourceRecord { cells })
    }

    /// 0-based index of the column whose normalized name equals `name`.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let want = normalize(name);
        self.columns.iter().position(|col| normalize(col) == want)
    }

    /// First candidate column present in this table, in candidate order.
    #[must_use]
    pub fn first_match(&self, candidates: &[&str]) -> Option<usize> {
        candidates.iter().find_map(|name| self.column_index(name))
    }
}

/// Number/text/empty inference for CSV cells.
fn parse_csv_cell(raw: &str) -> CellValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return CellValue::Empty;
    }
    trimmed.parse::<f64>().map_or_else(
        |_| CellValue::Text(trimmed.to_string()),
        CellValue::Number,
    )
}

/// One row of a source table, borrowed from its table.
#[derive(Debug, Clone, Copy)]
pub struct SourceRecord<'a> {
    cells: &'a [CellValue],
}

impl SourceRecord<'_> {
    /// Cell at a 0-based column index; empty when the row is ragged.
    #[must_use]
    pub fn get(&self, index: usize) -> &CellValue {
        self.cells.get(index).unwrap_or(&EMPTY)
    }

    /// Non-blank cell at an optional column.
    #[must_use]
    pub fn value_at(&self, index: Option<usize>) -> Option<&CellValue> {
        index.and_then(|i| {
            let value = self.get(i);
            (!value.is_blank()).then_some(value)
        })
    }

    /// Trimmed display text at an optional column, `None` when blank.
    #[must_use]
    pub fn text_at(&self, index: Option<usize>) -> Option<String> {
        self.value_at(index)
            .map(|value| value.to_display().trim().to_string())
            .filter(|text| !text.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn reads_csv_with_type_inference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("personal.csv");
        fs::write(&path, "Documento,Nombre,Salario\n123.456,Ana Gómez,1500\n,Benito,\n").unwrap();

        let table = SourceTable::read(&path).unwrap();
        assert_eq!(table.columns(), &["Documento", "Nombre", "Salario"]);
        assert_eq!(table.row_count(), 2);

        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[0].get(0), &CellValue::Number(123.456));
        assert_eq!(rows[0].text_at(Some(1)), Some("Ana Gómez".to_string()));
        assert!(rows[1].get(0).is_blank());
    }

    #[test]
    fn column_lookup_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuente.csv");
        fs::write(&path, "CÉDULA,Fecha  Terminación\n1,2\n").unwrap();

        let table = SourceTable::read(&path).unwrap();
        assert_eq!(table.column_index("cedula"), Some(0));
        assert_eq!(table.column_index("fecha terminacion"), Some(1));
        assert_eq!(table.first_match(&["documento", "cedula"]), Some(0));
        assert_eq!(table.first_match(&["documento"]), None);
    }

    #[test]
    fn ragged_rows_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corto.csv");
        fs::write(&path, "A,B,C\n1,2,3\n").unwrap();

        let table = SourceTable::read(&path).unwrap();
        let row = table.rows().next().unwrap();
        assert!(row.get(7).is_blank());
        assert_eq!(row.value_at(None), None);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = SourceTable::read(Path::new("/nonexistent/insumo.xlsx")).unwrap_err();
        assert!(matches!(err, MergeError::FileNotFound(_)));
    }
}
