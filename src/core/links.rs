//! Weak cross-references between records
//!
//! A [`BackRef`] names another record by ID and caches its business number
//! for display. Nothing checks that the referenced record exists, and
//! deleting the target leaves the reference in place.

use serde::{Deserialize, Serialize};

use crate::core::identity::{EntityId, EntityPrefix};

/// Informational link to a related record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
}

impl BackRef {
    pub fn new(id: Option<EntityId>, number: Option<String>) -> Self {
        Self { id, number }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.number.is_none()
    }

    /// Overwrite with whatever parts are supplied; absent parts are kept
    pub fn annotate(&mut self, id: Option<EntityId>, number: Option<String>) {
        if id.is_some() {
            self.id = id;
        }
        if number.is_some() {
            self.number = number;
        }
    }

    /// ID or number, whichever is known, for display
    pub fn label(&self) -> Option<String> {
        self.number
            .clone()
            .or_else(|| self.id.as_ref().map(|id| id.to_string()))
    }
}

/// Log a cross-reference annotation; the target is never looked up
pub fn log_annotation(source: &EntityId, field: &str, target: &BackRef, expected: EntityPrefix) {
    match &target.id {
        Some(id) if id.prefix() != expected => tracing::warn!(
            source = %source,
            field,
            target = %id,
            "reference points at a {} rather than a {}",
            id.prefix().family(),
            expected.family()
        ),
        _ => tracing::info!(
            source = %source,
            field,
            target = target.label().unwrap_or_default(),
            "linked unverified {} reference",
            expected.family()
        ),
    }
}
