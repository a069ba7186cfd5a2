//! Error taxonomy for quality record operations

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::identity::IdParseError;
use crate::core::workflow::WorkflowError;
use crate::yaml::YamlSyntaxError;

/// Errors surfaced by every service operation
///
/// A failed operation persists nothing.
#[derive(Debug, Error, Diagnostic)]
pub enum QualityError {
    #[error("{family} '{id}' not found")]
    #[diagnostic(code(qms::not_found), help("use the list command to see existing records"))]
    NotFound { family: &'static str, id: String },

    #[error("{family} number '{number}' already exists")]
    #[diagnostic(code(qms::conflict), help("business numbers must be unique within a family"))]
    Conflict { family: &'static str, number: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    PreconditionFailed(#[from] WorkflowError),

    #[error("invalid input: {message}")]
    #[diagnostic(code(qms::validation))]
    Validation { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

impl QualityError {
    pub fn validation(message: impl Into<String>) -> Self {
        QualityError::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(family: &'static str, id: impl ToString) -> Self {
        QualityError::NotFound {
            family,
            id: id.to_string(),
        }
    }

    /// True for transition or delete guards
    pub fn is_precondition(&self) -> bool {
        matches!(self, QualityError::PreconditionFailed(_))
    }
}

impl From<IdParseError> for QualityError {
    fn from(err: IdParseError) -> Self {
        QualityError::validation(err.to_string())
    }
}

/// Errors raised by record stores and sequence generators
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    #[diagnostic(code(qms::store::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Yaml(#[from] YamlSyntaxError),

    #[error("failed to serialize record: {0}")]
    #[diagnostic(code(qms::store::serialize))]
    Serialize(String),

    #[error("JSON error: {0}")]
    #[diagnostic(code(qms::store::json))]
    Json(#[from] serde_json::Error),

    #[error("corrupt record store at {path}: {message}")]
    #[diagnostic(code(qms::store::corrupt))]
    Corrupt { path: PathBuf, message: String },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type QualityResult<T> = Result<T, QualityError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::EntityId;

    #[test]
    fn test_id_parse_error_becomes_validation() {
        let err: QualityError = EntityId::parse("bogus").unwrap_err().into();
        assert!(matches!(err, QualityError::Validation { .. }));
    }

    #[test]
    fn test_workflow_error_is_precondition() {
        let err: QualityError = WorkflowError::NotDeletable {
            family: "CAPA",
            status: "approved".to_string(),
        }
        .into();
        assert!(err.is_precondition());
        assert_eq!(err.to_string(), "CAPA in 'approved' status cannot be deleted");
    }
}
