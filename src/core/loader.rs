//! Record file loading utilities
//!
//! Generic helpers for reading `.qms.yaml` record files. A file that fails
//! to parse is reported with its location, never skipped.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::StoreError;
use crate::core::project::RECORD_SUFFIX;
use crate::yaml;

/// Load and parse one record file
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(yaml::parse_str(&content, &filename)?)
}

/// Load all records of type T from a directory tree
pub fn load_all<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
    let mut records = Vec::new();

    if !dir.exists() {
        return Ok(records);
    }

    for path in record_files(dir) {
        records.push(load_file(&path)?);
    }

    Ok(records)
}

/// Record files below `dir`, sorted by path
pub fn record_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().to_string_lossy().ends_with(RECORD_SUFFIX))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Serialize a record and replace its file in one rename
pub fn write_file<T: Serialize>(path: &Path, record: &T) -> Result<(), StoreError> {
    let content =
        serde_yml::to_string(record).map_err(|e| StoreError::Serialize(e.to_string()))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, content).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}
