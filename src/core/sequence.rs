//! Atomic per-key counters for business numbers
//!
//! A counter only ever moves forward. Callers pass a floor (for NCRs, the
//! number of records already stored) so that a fresh counter over an
//! existing data set continues after the records it did not issue.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::core::error::StoreError;

/// Source of unique, increasing sequence values
pub trait SequenceGenerator: Send + Sync {
    /// Reserve the next value for `key`: `max(last issued, floor) + 1`
    fn next(&self, key: &str, floor: u64) -> Result<u64, StoreError>;
}

fn advance(counters: &mut BTreeMap<String, u64>, key: &str, floor: u64) -> u64 {
    let current = counters.get(key).copied().unwrap_or(0).max(floor);
    let next = current + 1;
    counters.insert(key.to_string(), next);
    next
}

/// Counters held in memory
#[derive(Debug, Default)]
pub struct MemorySequence {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl MemorySequence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceGenerator for MemorySequence {
    fn next(&self, key: &str, floor: u64) -> Result<u64, StoreError> {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        Ok(advance(&mut counters, key, floor))
    }
}

/// Counters persisted as JSON (`.qms/sequences.json`)
#[derive(Debug)]
pub struct FileSequence {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileSequence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    fn save(&self, counters: &BTreeMap<String, u64>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(counters)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::io(&self.path, e))
    }
}

impl SequenceGenerator for FileSequence {
    fn next(&self, key: &str, floor: u64) -> Result<u64, StoreError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut counters = self.load()?;
        let next = advance(&mut counters, key, floor);
        self.save(&counters)?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_floor_applies_to_fresh_counter() {
        let seq = MemorySequence::new();
        assert_eq!(seq.next("NCR-2025", 2).unwrap(), 3);
        assert_eq!(seq.next("NCR-2025", 2).unwrap(), 4);
        // Keys are independent
        assert_eq!(seq.next("NCR-2026", 0).unwrap(), 1);
    }

    #[test]
    fn test_counter_never_goes_back() {
        let seq = MemorySequence::new();
        assert_eq!(seq.next("k", 10).unwrap(), 11);
        assert_eq!(seq.next("k", 0).unwrap(), 12);
    }

    #[test]
    fn test_concurrent_callers_get_distinct_values() {
        let seq = Arc::new(MemorySequence::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || seq.next("NCR-2025", 0).unwrap())
            })
            .collect();

        let mut values: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        values.sort_unstable();
        assert_eq!(values, (1..=8).collect::<Vec<_>>());
    }

    #[test]
    fn test_file_sequence_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sequences.json");

        assert_eq!(FileSequence::new(&path).next("NCR-2025", 0).unwrap(), 1);
        assert_eq!(FileSequence::new(&path).next("NCR-2025", 0).unwrap(), 2);

        let saved: BTreeMap<String, u64> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["NCR-2025"], 2);
    }

    #[test]
    fn test_file_sequence_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sequences.json");
        fs::write(&path, "not json").unwrap();

        let err = FileSequence::new(&path).next("NCR-2025", 0).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
