//! Header location and name→column mapping for destination sheets.

use std::collections::HashMap;

use log::debug;

use crate::text::normalize;
use crate::workbook::Sheet;

/// Destination rows scanned by default when locating a header.
pub const DEFAULT_SCAN_ROWS: u32 = 5;

/// Mapping from normalized header name to 1-indexed column.
///
/// Names are unique after normalization; when two header cells normalize to
/// the same name the last-seen column wins (a documented ambiguity of the
/// destination sheets, not a guaranteed behavior).
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    columns: HashMap<String, u32>,
}

impl HeaderMap {
    /// Builds the map from one header row, one entry per non-empty cell.
    #[must_use]
    pub fn from_row(sheet: &Sheet, header_row: u32) -> Self {
        let mut columns = HashMap::new();
        for col in 1..=sheet.max_column() {
            let key = normalize(&sheet.cell(header_row, col).to_display());
            if !key.is_empty() {
                columns.insert(key, col);
            }
        }
        Self { columns }
    }

    /// Column for `name`, compared in normalized form.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<u32> {
        self.columns.get(&normalize(name)).copied()
    }

    /// First candidate that resolves, in declaration order.
    #[must_use]
    pub fn first(&self, candidates: &[&str]) -> Option<u32> {
        candidates.iter().find_map(|name| self.get(name))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Normalized header names, sorted for stable error messages.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.columns.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Finds the header row within the first `max_scan_rows` rows of a sheet.
///
/// Each row is scored by how many of its normalized cells appear in
/// `expected`; a row scoring at least half the expected set (minimum 1)
/// wins immediately, favoring speed over a strictly-best match deeper in
/// the scan window. When nothing scores, row 1 is assumed.
#[must_use]
pub fn locate_header(sheet: &Sheet, expected: &[&str], max_scan_rows: u32) -> u32 {
    let wanted: Vec<String> = expected.iter().map(|name| normalize(name)).collect();
    let threshold = (wanted.len() / 2).max(1);

    let mut best_row = 1;
    let mut best_score = 0;
    for row in 1..=max_scan_rows.min(sheet.max_row()).max(1) {
        let mut score = 0;
        for col in 1..=sheet.max_column() {
            let value = normalize(&sheet.cell(row, col).to_display());
            if !value.is_empty() && wanted.iter().any(|w| *w == value) {
                score += 1;
            }
        }
        if score >= threshold {
            debug!("header row {row} matched {score}/{} expected names", wanted.len());
            return row;
        }
        if score > best_score {
            best_score = score;
            best_row = row;
        }
    }
    best_row
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::workbook::CellValue;

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_string())
    }

    #[test]
    fn header_map_normalizes_and_keeps_last_duplicate() {
        let mut sheet = Sheet::new("Datos");
        sheet.set_cell(1, 1, text("Cédula"));
        sheet.set_cell(1, 2, text("NOMBRE"));
        sheet.set_cell(1, 3, text("cedula "));

        let headers = HeaderMap::from_row(&sheet, 1);
        assert_eq!(headers.get("CEDULA"), Some(3));
        assert_eq!(headers.get("nombre"), Some(2));
        assert_eq!(headers.get("estado"), None);
    }

    #[test]
    fn first_respects_candidate_order() {
        let mut sheet = Sheet::new("Datos");
        sheet.set_cell(1, 1, text("FECHA"));
        sheet.set_cell(1, 2, text("INGRESO"));

        let headers = HeaderMap::from_row(&sheet, 1);
        assert_eq!(headers.first(&["INGRESO/RETIRO", "INGRESO", "FECHA"]), Some(2));
    }

    #[test]
    fn locates_header_below_banner_rows() {
        let mut sheet = Sheet::new("Datos");
        sheet.set_cell(1, 1, text("Inventario consolidado"));
        sheet.set_cell(3, 1, text("CEDULA"));
        sheet.set_cell(3, 2, text("NOMBRE"));
        sheet.set_cell(3, 3, text("ESTADO"));

        let row = locate_header(&sheet, &["CEDULA", "NOMBRE", "ESTADO", "AREA"], 5);
        assert_eq!(row, 3);
    }

    #[test]
    fn short_circuits_at_half_score() {
        let mut sheet = Sheet::new("Datos");
        sheet.set_cell(1, 1, text("CEDULA"));
        sheet.set_cell(2, 1, text("CEDULA"));
        sheet.set_cell(2, 2, text("NOMBRE"));

        // row 1 already reaches half of a two-name set
        let row = locate_header(&sheet, &["CEDULA", "NOMBRE"], 5);
        assert_eq!(row, 1);
    }

    #[test]
    fn defaults_to_row_one_without_matches() {
        let mut sheet = Sheet::new("Datos");
        sheet.set_cell(1, 1, text("algo"));
        assert_eq!(locate_header(&sheet, &["CEDULA"], 5), 1);
        assert_eq!(locate_header(&sheet, &[], 5), 1);
    }
}
