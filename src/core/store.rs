//! Record stores: one logical table per record family, keyed by ID

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::core::entity::Entity;
use crate::core::error::StoreError;
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::loader;
use crate::core::project::Project;

/// Durable storage for quality records
///
/// Reads return owned copies; nothing a caller does to a fetched record is
/// visible until it is persisted again.
pub trait RecordStore {
    /// Load one record, `None` if absent
    fn fetch<R: Entity>(&self, id: &EntityId) -> Result<Option<R>, StoreError>;

    /// Load every record of a family, in no particular order
    fn fetch_all<R: Entity>(&self) -> Result<Vec<R>, StoreError>;

    /// Insert or replace a record
    fn persist<R: Entity>(&mut self, record: &R) -> Result<(), StoreError>;

    /// Remove a record, returning whether it existed
    fn remove<R: Entity>(&mut self, id: &EntityId) -> Result<bool, StoreError>;

    /// Number of records in a family
    fn count<R: Entity>(&self) -> Result<usize, StoreError> {
        Ok(self.fetch_all::<R>()?.len())
    }
}

/// In-process store; records are kept in serialized form
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<EntityPrefix, BTreeMap<EntityId, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn fetch<R: Entity>(&self, id: &EntityId) -> Result<Option<R>, StoreError> {
        self.tables
            .get(&R::PREFIX)
            .and_then(|table| table.get(id))
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(StoreError::from)
    }

    fn fetch_all<R: Entity>(&self) -> Result<Vec<R>, StoreError> {
        let Some(table) = self.tables.get(&R::PREFIX) else {
            return Ok(Vec::new());
        };
        table
            .values()
            .map(|value| serde_json::from_value(value.clone()).map_err(StoreError::from))
            .collect()
    }

    fn persist<R: Entity>(&mut self, record: &R) -> Result<(), StoreError> {
        let value = serde_json::to_value(record)?;
        self.tables
            .entry(R::PREFIX)
            .or_default()
            .insert(record.id().clone(), value);
        Ok(())
    }

    fn remove<R: Entity>(&mut self, id: &EntityId) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .get_mut(&R::PREFIX)
            .is_some_and(|table| table.remove(id).is_some()))
    }

    fn count<R: Entity>(&self) -> Result<usize, StoreError> {
        Ok(self.tables.get(&R::PREFIX).map_or(0, BTreeMap::len))
    }
}

/// One YAML file per record inside a project tree
#[derive(Debug, Clone)]
pub struct YamlStore {
    project: Project,
}

impl YamlStore {
    pub fn new(project: Project) -> Self {
        Self { project }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }
}

impl RecordStore for YamlStore {
    fn fetch<R: Entity>(&self, id: &EntityId) -> Result<Option<R>, StoreError> {
        let path = self.project.entity_path(R::PREFIX, id);
        if !path.exists() {
            return Ok(None);
        }
        tracing::debug!(path = %path.display(), "reading record");
        loader::load_file(&path).map(Some)
    }

    fn fetch_all<R: Entity>(&self) -> Result<Vec<R>, StoreError> {
        loader::load_all(&self.project.family_dir(R::PREFIX))
    }

    fn persist<R: Entity>(&mut self, record: &R) -> Result<(), StoreError> {
        let path = self.project.entity_path(R::PREFIX, record.id());
        tracing::debug!(path = %path.display(), "writing record");
        loader::write_file(&path, record)
    }

    fn remove<R: Entity>(&mut self, id: &EntityId) -> Result<bool, StoreError> {
        let path = self.project.entity_path(R::PREFIX, id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
        Ok(true)
    }

    fn count<R: Entity>(&self) -> Result<usize, StoreError> {
        Ok(loader::record_files(&self.project.family_dir(R::PREFIX)).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Severity;
    use crate::entities::{Capa, CapaType, Ncr};
    use tempfile::tempdir;

    fn ncr(number: &str) -> Ncr {
        let mut ncr = Ncr::new("Burr on flange", Severity::Major, "qa");
        ncr.ncr_number = number.to_string();
        ncr
    }

    #[test]
    fn test_memory_store_returns_copies() {
        let mut store = MemoryStore::new();
        let record = ncr("NCR-2025-001");
        store.persist(&record).unwrap();

        let mut fetched: Ncr = store.fetch(&record.id).unwrap().unwrap();
        fetched.title = "changed".to_string();

        let again: Ncr = store.fetch(&record.id).unwrap().unwrap();
        assert_eq!(again.title, "Burr on flange");
    }

    #[test]
    fn test_memory_store_keeps_families_apart() {
        let mut store = MemoryStore::new();
        store.persist(&ncr("NCR-2025-001")).unwrap();
        store
            .persist(&Capa::new("CAPA-1", "Fix deburring", CapaType::Corrective, "qa"))
            .unwrap();

        assert_eq!(store.count::<Ncr>().unwrap(), 1);
        assert_eq!(store.count::<Capa>().unwrap(), 1);
        assert_eq!(store.fetch_all::<Ncr>().unwrap().len(), 1);
    }

    #[test]
    fn test_memory_store_remove() {
        let mut store = MemoryStore::new();
        let record = ncr("NCR-2025-001");
        store.persist(&record).unwrap();

        assert!(store.remove::<Ncr>(&record.id).unwrap());
        assert!(!store.remove::<Ncr>(&record.id).unwrap());
        assert!(store.fetch::<Ncr>(&record.id).unwrap().is_none());
    }

    #[test]
    fn test_yaml_store_round_trips_through_files() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        let mut store = YamlStore::new(project.clone());

        let record = ncr("NCR-2025-007");
        store.persist(&record).unwrap();
        assert!(project.entity_path(EntityPrefix::Ncr, &record.id).exists());

        let fetched: Ncr = store.fetch(&record.id).unwrap().unwrap();
        assert_eq!(fetched.ncr_number, "NCR-2025-007");
        assert_eq!(store.count::<Ncr>().unwrap(), 1);

        assert!(store.remove::<Ncr>(&record.id).unwrap());
        assert!(store.fetch::<Ncr>(&record.id).unwrap().is_none());
    }

    #[test]
    fn test_yaml_store_missing_family_is_empty() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        let store = YamlStore::new(project);
        assert!(store.fetch_all::<Capa>().unwrap().is_empty());
    }
}
