//! Per-insumo business rules for derived columns.
//!
//! Status strings are recomputed on every merge and always overwrite the
//! destination cell, even when the rest of the incoming row is sparse.

use std::str::FromStr;

use crate::text::normalize;

/// Whether a personnel batch represents hires, terminations, or a mix
/// decided per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Hire,
    Termination,
    /// Decide per row from which date columns are populated.
    Mixed,
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = normalize(s);
        if norm.contains("retir") || norm.contains("termin") {
            Ok(Self::Termination)
        } else if norm.contains("ingres") || norm.contains("hire") {
            Ok(Self::Hire)
        } else if norm == "mixto" || norm == "mixed" {
            Ok(Self::Mixed)
        } else {
            Err(format!("unknown operation '{s}'"))
        }
    }
}

const TERMINATION_KEYWORDS: &[&str] = &["retir", "terminacion", "fin"];
const HIRE_KEYWORDS: &[&str] = &["ingres"];

/// Resolves the batch operation: explicit caller hint first, then filename
/// keywords, else per-row fallback.
#[must_use]
pub fn resolve_operation(explicit: Option<Operation>, filename: &str) -> Operation {
    if let Some(operation) = explicit {
        return operation;
    }
    let name = normalize(filename);
    if TERMINATION_KEYWORDS.iter().any(|kw| name.contains(kw)) {
        return Operation::Termination;
    }
    if HIRE_KEYWORDS.iter().any(|kw| name.contains(kw)) {
        return Operation::Hire;
    }
    Operation::Mixed
}

/// Baseline organizational area when nothing else resolves.
pub const DEFAULT_AREA: &str = "FIDU PLANTA";

/// Resolves the organizational area: explicit hint, then filename keywords,
/// then the baseline.
#[must_use]
pub fn resolve_area(explicit: Option<&str>, filename: &str) -> String {
    if let Some(area) = explicit {
        let trimmed = area.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let name = normalize(filename);
    if name.contains("fomag") {
        "FOMAG".to_string()
    } else if name.contains("m.c") || name.contains("mc") {
        "M.C".to_string()
    } else if name.contains("apre") || name.contains("pract") {
        "APRE Y PRACT".to_string()
    } else if name.contains("mision") {
        "FIDU MISIÓN".to_string()
    } else {
        DEFAULT_AREA.to_string()
    }
}

/// Status suffix for a resolved area; unmatched areas take the default.
#[must_use]
pub fn area_suffix(area: &str) -> &'static str {
    let norm = normalize(area);
    if norm.contains("fomag") {
        "FOMAG"
    } else if norm.contains("m.c") || norm.contains("mc") {
        "M.C"
    } else if norm.contains("apre") || norm.contains("pract") {
        "APRE Y PRACT"
    } else if norm.contains("mision") {
        "FIDU MISIÓN"
    } else {
        "FIDU PLANTA"
    }
}

/// Composes the derived status for one personnel row.
///
/// `row_has_termination` only matters for mixed batches, where the row's
/// own date columns decide; a row with neither date counts as a hire.
#[must_use]
pub fn personnel_status(operation: Operation, area: &str, row_has_termination: bool) -> String {
    let base = match operation {
        Operation::Termination => "TERMINATED",
        Operation::Hire => "ACTIVE",
        Operation::Mixed => {
            if row_has_termination {
                "TERMINATED"
            } else {
                "ACTIVE"
            }
        }
    };
    format!("{base} {}", area_suffix(area))
}

pub const ANTIVIRUS_INSTALLED: &str = "Antivirus Installed";
pub const ANTIVIRUS_NOT_REPORTING: &str = "NOT REPORTING";

/// Endpoint protection status derived from the "Protection Manager" value.
///
/// Some extracts spell it "Enpoint"; both forms count as reporting.
#[must_use]
pub fn antivirus_status(protection_manager: &str) -> &'static str {
    let norm = normalize(protection_manager);
    if norm.contains("standard") && (norm.contains("endpoint") || norm.contains("enpoint")) {
        ANTIVIRUS_INSTALLED
    } else {
        ANTIVIRUS_NOT_REPORTING
    }
}
