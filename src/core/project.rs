//! Project discovery and structure

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::identity::{EntityId, EntityPrefix};

/// Name of the hidden project directory
pub const PROJECT_DIR: &str = ".qms";

/// File suffix for record files
pub const RECORD_SUFFIX: &str = ".qms.yaml";

/// A quality records project rooted at the parent of `.qms/`
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    /// Find project root by walking up from the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let current = std::env::current_dir().map_err(|e| ProjectError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find project root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        loop {
            if current.join(PROJECT_DIR).is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(ProjectError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Create a new project structure at the given path
    pub fn init(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if root.join(PROJECT_DIR).exists() {
            return Err(ProjectError::AlreadyExists(root));
        }

        Self::init_force(&root)
    }

    /// Initialize even if `.qms/` exists; existing records are left alone
    pub fn init_force(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let qms_dir = root.join(PROJECT_DIR);

        std::fs::create_dir_all(&qms_dir).map_err(|e| ProjectError::IoError(e.to_string()))?;

        let config_path = qms_dir.join("config.yaml");
        if !config_path.exists() {
            std::fs::write(&config_path, Self::default_config())
                .map_err(|e| ProjectError::IoError(e.to_string()))?;
        }

        for prefix in EntityPrefix::all() {
            std::fs::create_dir_all(root.join(Self::entity_directory(*prefix)))
                .map_err(|e| ProjectError::IoError(e.to_string()))?;
        }

        Ok(Self { root })
    }

    fn default_config() -> &'static str {
        r#"# Quality records project configuration

# Default author for new records and transition sign-offs
# author: ""

# Default output format (auto, yaml, tsv, json, csv, md, id)
# default_format: auto

# Which records accept field edits through `update`:
#   unrestricted  - any status
#   non_terminal  - any status with outgoing transitions (default)
#   initial_only  - only records still in their initial status
# update_policy: non_terminal

# Prefix and zero-padding for auto-numbered NCRs (NCR-2025-003)
# ncr_prefix: NCR
# number_width: 3
"#
    }

    /// Get the project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .qms configuration directory
    pub fn qms_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    /// Path of the persisted sequence counters
    pub fn sequences_path(&self) -> PathBuf {
        self.qms_dir().join("sequences.json")
    }

    /// Get the path for a record file
    pub fn entity_path(&self, prefix: EntityPrefix, id: &EntityId) -> PathBuf {
        self.root
            .join(Self::entity_directory(prefix))
            .join(format!("{}{}", id, RECORD_SUFFIX))
    }

    /// Absolute directory holding one family's records
    pub fn family_dir(&self, prefix: EntityPrefix) -> PathBuf {
        self.root.join(Self::entity_directory(prefix))
    }

    /// Get the directory for a given record prefix
    pub fn entity_directory(prefix: EntityPrefix) -> &'static str {
        match prefix {
            EntityPrefix::Ncr => "quality/ncrs",
            EntityPrefix::Nc => "quality/nonconformances",
            EntityPrefix::Capa => "quality/capas",
            EntityPrefix::Ca => "quality/corrective_actions",
            EntityPrefix::Pa => "quality/preventive_actions",
            EntityPrefix::Aud => "audits/plans",
            EntityPrefix::Fnd => "audits/findings",
            EntityPrefix::Insp => "inspections/records",
            EntityPrefix::Ires => "inspections/results",
            EntityPrefix::Qct => "qc/templates",
            EntityPrefix::Qcp => "qc/parameters",
        }
    }
}

/// Errors that can occur during project operations
#[derive(Debug, Error, Diagnostic)]
pub enum ProjectError {
    #[error("not a quality records project (searched from {searched_from:?})")]
    #[diagnostic(code(qms::project::not_found), help("run 'qms init' to create one"))]
    NotFound { searched_from: PathBuf },

    #[error("project already exists at {0:?}")]
    #[diagnostic(code(qms::project::exists), help("use 'qms init --force' to repair the layout"))]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    #[diagnostic(code(qms::project::io))]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_project_init_creates_structure() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();

        assert!(project.qms_dir().join("config.yaml").exists());
        assert!(project.root().join("quality/ncrs").is_dir());
        assert!(project.root().join("quality/capas").is_dir());
        assert!(project.root().join("audits/findings").is_dir());
        assert!(project.root().join("inspections/results").is_dir());
        assert!(project.root().join("qc/parameters").is_dir());
    }

    #[test]
    fn test_project_init_fails_if_exists() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let err = Project::init(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::AlreadyExists(_)));
        assert!(Project::init_force(tmp.path()).is_ok());
    }

    #[test]
    fn test_project_discover_finds_qms_dir() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let subdir = tmp.path().join("some/nested/dir");
        std::fs::create_dir_all(&subdir).unwrap();

        let project = Project::discover_from(&subdir).unwrap();
        assert_eq!(
            project.root().canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_project_discover_fails_without_qms_dir() {
        let tmp = tempdir().unwrap();
        let err = Project::discover_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::NotFound { .. }));
    }

    #[test]
    fn test_entity_path_uses_family_directory() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        let id = EntityId::new(EntityPrefix::Ires);
        let path = project.entity_path(EntityPrefix::Ires, &id);
        assert!(path.ends_with(format!("inspections/results/{}.qms.yaml", id)));
    }
}
