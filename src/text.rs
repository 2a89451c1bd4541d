//! Text normalization for header and key matching.
//!
//! Two names refer to the same field iff their normalized forms are equal;
//! this is the equality basis used everywhere the engine matches column or
//! sheet names.

use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization as _;

/// Normalizes text for comparison: lower-case, trimmed, diacritics stripped,
/// internal whitespace runs collapsed to a single space.
///
/// Pure; an empty or whitespace-only input normalizes to `""`.
#[must_use]
pub fn normalize(text: &str) -> String {
    let stripped: String = text.nfd().filter(|ch| !is_combining_mark(*ch)).collect();
    let mut out = String::with_capacity(stripped.len());
    for word in stripped.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        for ch in word.chars() {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// Cleans a natural-key value down to its digits.
///
/// Cédulas arrive with thousands separators, stray spaces or as float
/// renderings; only the digits identify the person. `None` when nothing
/// usable remains.
#[must_use]
pub fn clean_key(value: &str) -> Option<String> {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

static YMD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})[._-]?(\d{2})[._-]?(\d{2})").expect("valid pattern")
});
static DMY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2})[._-](\d{2})[._-](\d{4})").expect("valid pattern")
});

/// Extracts a date hint from an insumo filename.
///
/// Tries a year-first `YYYY[-._]MM[-._]DD` pattern, then a day-first
/// `DD[-._]MM[-._]YYYY` one. Calendar-invalid captures are skipped and the
/// scan continues.
#[must_use]
pub fn date_from_filename(name: &str) -> Option<NaiveDate> {
    let stem = Path::new(name)
        .file_stem()
        .map_or_else(|| name.to_string(), |s| s.to_string_lossy().into_owned());

    for caps in YMD.captures_iter(&stem) {
        if let Some(date) = capture_date(&caps, 1, 2, 3) {
            return Some(date);
        }
    }
    for caps in DMY.captures_iter(&stem) {
        if let Some(date) = capture_date(&caps, 3, 2, 1) {
            return Some(date);
        }
    }
    None
}

fn capture_date(caps: &regex::Captures<'_>, year: usize, month: usize, day: usize) -> Option<NaiveDate> {
    let y = caps.get(year)?.as_str().parse().ok()?;
    let m = caps.get(month)?.as_str().parse().ok()?;
    let d = caps.get(day)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(y, m, d)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn normalize_strips_accents_and_case() {
        assert_eq!(normalize("  Córdoba   ÁREA "), "cordoba area");
        assert_eq!(normalize("FECHA TERMINACIÓN"), "fecha terminacion");
    }

    #[test]
    fn normalize_empty_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn clean_key_keeps_digits_only() {
        assert_eq!(clean_key("123.456"), Some("123456".to_string()));
        assert_eq!(clean_key(" 1.234.567 "), Some("1234567".to_string()));
        assert_eq!(clean_key("CC 890"), Some("890".to_string()));
    }

    #[test]
    fn clean_key_rejects_non_numeric() {
        assert_eq!(clean_key("sin documento"), None);
        assert_eq!(clean_key(""), None);
    }

    #[test]
    fn date_from_filename_year_first() {
        assert_eq!(
            date_from_filename("retiros_fidu_2024-03-01.xlsx"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(
            date_from_filename("ingresos_20240301.xlsx"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
    }

    #[test]
    fn date_from_filename_day_first() {
        assert_eq!(
            date_from_filename("retiros_01-03-2024.xlsx"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
    }

    #[test]
    fn date_from_filename_skips_invalid_calendar_dates() {
        assert_eq!(
            date_from_filename("corte_2024-99-99_2024-03-01.xlsx"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
    }

    #[test]
    fn date_from_filename_none_without_pattern() {
        assert_eq!(date_from_filename("planta.xlsx"), None);
    }
}
