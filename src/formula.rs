//! Formula-template propagation.
//!
//! Row 2 of a destination sheet conventionally holds formula text defining
//! how every data row computes its derived cells. New rows receive those
//! formulas verbatim; relative references are left to the destination
//! format's recalculation on load.

use crate::workbook::{CellValue, Sheet};

/// Copies every formula cell of `template_row` into the same column of each
/// row in `target_start..=target_end`. No-op on an empty range.
pub fn propagate(sheet: &mut Sheet, template_row: u32, target_start: u32, target_end: u32) {
    if target_end < target_start {
        return;
    }
    for col in 1..=sheet.max_column() {
        let template = sheet
            .cell(template_row, col)
            .formula_text()
            .map(str::to_string);
        if let Some(text) = template {
            for row in target_start..=target_end {
                sheet.set_cell(row, col, CellValue::Formula(text.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn template_sheet() -> Sheet {
        let mut sheet = Sheet::new("ESTADO_GEN_USUARIO");
        sheet.set_cell(1, 1, CellValue::Text("CEDULA".to_string()));
        sheet.set_cell(1, 2, CellValue::Text("VENCIMIENTO".to_string()));
        sheet.set_cell(2, 2, CellValue::Formula("=F2+365".to_string()));
        sheet
    }

    #[test]
    fn copies_formula_columns_into_range() {
        let mut sheet = template_sheet();
        propagate(&mut sheet, 2, 3, 5);
        for row in 3..=5 {
            assert_eq!(sheet.cell(row, 2).formula_text(), Some("=F2+365"));
            assert!(sheet.cell(row, 1).is_blank());
        }
    }

    #[test]
    fn empty_range_is_a_no_op() {
        let mut sheet = template_sheet();
        propagate(&mut sheet, 2, 5, 4);
        assert_eq!(sheet.max_row(), 2);
    }

    #[test]
    fn non_formula_template_cells_are_ignored() {
        let mut sheet = template_sheet();
        sheet.set_cell(2, 1, CellValue::Text("plantilla".to_string()));
        propagate(&mut sheet, 2, 3, 3);
        assert!(sheet.cell(3, 1).is_blank());
    }
}
