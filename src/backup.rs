//! Snapshot-before-write protection for the Master.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::info;

use crate::error::{MergeError, Result};

/// Copies `path` to a timestamped sibling and returns the copy's path.
///
/// The copy completes before the destination is opened for writing; a merge
/// that fails later leaves it as the recovery point.
pub fn backup(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(MergeError::FileNotFound(path.to_path_buf()));
    }
    let stem = path
        .file_stem()
        .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    let ext = path
        .extension()
        .map_or_else(String::new, |e| format!(".{}", e.to_string_lossy()));
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let destination = path.with_file_name(format!("{stem}_backup_{stamp}{ext}"));
    fs::copy(path, &destination)?;
    info!("backed up {} to {}", path.display(), destination.display());
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn creates_timestamped_sibling_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Maestro.xlsx");
        fs::write(&path, b"contenido").unwrap();

        let copy = backup(&path).unwrap();

        assert!(copy.exists());
        assert_eq!(copy.parent(), path.parent());
        let name = copy.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("Maestro_backup_"));
        assert!(name.ends_with(".xlsx"));
        assert_eq!(fs::read(&copy).unwrap(), b"contenido");
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = backup(&dir.path().join("no-existe.xlsx")).unwrap_err();
        assert!(matches!(err, MergeError::FileNotFound(_)));
    }
}
