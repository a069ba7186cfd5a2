//! Shallow field patches and the policy deciding which records accept them

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::core::entity::{Entity, COMMON_LOCKED_FIELDS};
use crate::core::error::QualityError;
use crate::core::workflow::{Lifecycle, State, WorkflowError};

/// Which lifecycle states accept content edits through Update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    /// Any status, including terminal ones
    Unrestricted,
    /// Any status that still has an outgoing transition
    #[default]
    NonTerminal,
    /// Only the family's initial status
    InitialOnly,
}

impl UpdatePolicy {
    /// Refuse the edit if `record`'s status is closed under this policy
    ///
    /// A record that refuses edits in its current state stays locked even
    /// under `Unrestricted`.
    pub fn check<R: Lifecycle>(self, record: &R) -> Result<(), WorkflowError> {
        let machine = R::machine();
        let allowed = record.accepts_edits()
            && match self {
                UpdatePolicy::Unrestricted => true,
                UpdatePolicy::NonTerminal => !machine.is_terminal(record.state()),
                UpdatePolicy::InitialOnly => record.state() == machine.initial(),
            };
        if allowed {
            Ok(())
        } else {
            Err(WorkflowError::Locked {
                family: machine.family(),
                status: record.state().as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdatePolicy::Unrestricted => write!(f, "unrestricted"),
            UpdatePolicy::NonTerminal => write!(f, "non_terminal"),
            UpdatePolicy::InitialOnly => write!(f, "initial_only"),
        }
    }
}

impl FromStr for UpdatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "unrestricted" => Ok(UpdatePolicy::Unrestricted),
            "non_terminal" => Ok(UpdatePolicy::NonTerminal),
            "initial_only" => Ok(UpdatePolicy::InitialOnly),
            _ => Err(format!(
                "Invalid update policy: {}. Use unrestricted, non_terminal, or initial_only",
                s
            )),
        }
    }
}

/// Shallow-merge `patch` onto `record`, returning the merged copy
///
/// Top-level keys replace the stored value; a `null` clears an optional
/// field. Identity, status, sign-offs and other lifecycle-owned fields are
/// refused. The input record is never modified.
pub fn apply_patch<R: Entity>(record: &R, patch: Value) -> Result<R, QualityError> {
    let Value::Object(fields) = patch else {
        return Err(QualityError::validation("patch must be a mapping of field names to values"));
    };

    if let Some(locked) = fields
        .keys()
        .find(|k| COMMON_LOCKED_FIELDS.contains(&k.as_str()) || R::LOCKED_FIELDS.contains(&k.as_str()))
    {
        return Err(QualityError::validation(format!(
            "field '{}' is managed by the {} lifecycle and cannot be updated",
            locked,
            R::PREFIX.family()
        )));
    }

    let mut base = serde_json::to_value(record).map_err(|e| QualityError::validation(e.to_string()))?;
    let Value::Object(ref mut target) = base else {
        return Err(QualityError::validation("record does not serialize to a mapping"));
    };

    for (key, value) in fields {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }

    let mut merged: R =
        serde_json::from_value(base).map_err(|e| QualityError::validation(e.to_string()))?;
    merged.bump_revision();
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_str() {
        assert_eq!("non-terminal".parse::<UpdatePolicy>().unwrap(), UpdatePolicy::NonTerminal);
        assert_eq!("initial_only".parse::<UpdatePolicy>().unwrap(), UpdatePolicy::InitialOnly);
        assert!("sometimes".parse::<UpdatePolicy>().is_err());
        assert_eq!(UpdatePolicy::default().to_string(), "non_terminal");
    }
}
