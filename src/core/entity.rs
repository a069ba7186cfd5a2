//! Entity trait - common interface for all quality record types

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::core::identity::{EntityId, EntityPrefix};

/// Fields every record owns outright; Update can never patch them
pub const COMMON_LOCKED_FIELDS: &[&str] = &["id", "created", "author", "entity_revision", "status"];

/// Default ordering for list results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    /// Creation time, newest first
    NewestFirst,
    /// Sequence number, ascending (parameters, results)
    SequenceAscending,
}

/// Common trait for all quality records
pub trait Entity: Serialize + DeserializeOwned + Clone {
    /// The record type prefix (e.g., CAPA, INSP)
    const PREFIX: EntityPrefix;

    /// Ordering used by List
    const ORDER: ListOrder = ListOrder::NewestFirst;

    /// Lifecycle-owned fields beyond [`COMMON_LOCKED_FIELDS`]
    const LOCKED_FIELDS: &'static [&'static str] = &[];

    /// Get the record's unique ID
    fn id(&self) -> &EntityId;

    /// Get the record's title
    fn title(&self) -> &str;

    /// Get the record's status name
    fn status(&self) -> &str;

    /// Get the creation timestamp
    fn created(&self) -> DateTime<Utc>;

    /// Get the author
    fn author(&self) -> &str;

    /// Unique human-readable key, checked for duplicates on create
    fn business_number(&self) -> Option<String> {
        None
    }

    /// Foreign-key style fields available to list filters
    fn references(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Position within the parent collection
    fn sequence(&self) -> u32 {
        0
    }

    /// Field-level checks run before every save
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Increment the revision counter after a successful mutation
    fn bump_revision(&mut self);
}

/// Who performed a transition and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signoff {
    /// Acting user identifier
    pub by: String,

    /// Server timestamp of the transition
    pub at: DateTime<Utc>,

    /// Optional remark captured with the transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Signoff {
    pub fn new(by: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            by: by.into(),
            at,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }
}

/// A boolean that can be raised but never lowered again
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Latch(bool);

impl Latch {
    pub fn is_set(self) -> bool {
        self.0
    }

    pub fn raise(&mut self) {
        self.0 = true;
    }

    /// Raise only when `condition` holds; a raised latch stays raised
    pub fn raise_if(&mut self, condition: bool) {
        if condition {
            self.0 = true;
        }
    }
}

/// Severity shared by NCRs, findings and inspection defects
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Minor,
    Major,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Minor => write!(f, "minor"),
            Severity::Major => write!(f, "major"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minor" => Ok(Severity::Minor),
            "major" => Ok(Severity::Major),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!(
                "Invalid severity: {}. Use minor, major, or critical",
                s
            )),
        }
    }
}

/// Priority values common across record types
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

pub(crate) fn default_revision() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_never_lowers() {
        let mut latch = Latch::default();
        assert!(!latch.is_set());
        latch.raise_if(false);
        assert!(!latch.is_set());
        latch.raise();
        latch.raise_if(false);
        assert!(latch.is_set());
    }

    #[test]
    fn test_latch_serializes_as_bool() {
        let mut latch = Latch::default();
        latch.raise();
        assert_eq!(serde_json::to_string(&latch).unwrap(), "true");
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("Critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("fatal".parse::<Severity>().is_err());
        assert!(Severity::Critical > Severity::Minor);
    }
}
