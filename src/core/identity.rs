//! Record identity system using type-prefixed ULIDs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

/// Record type prefixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityPrefix {
    /// Non-conformance report (simple variant)
    Ncr,
    /// Non-conformance (full investigation variant)
    Nc,
    /// Combined corrective and preventive action
    Capa,
    /// Corrective action
    Ca,
    /// Preventive action
    Pa,
    /// Audit plan
    Aud,
    /// Audit finding
    Fnd,
    /// Inspection record
    Insp,
    /// Inspection result (one checked parameter)
    Ires,
    /// QC template
    Qct,
    /// QC template parameter
    Qcp,
}

impl EntityPrefix {
    /// Get the string representation of the prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPrefix::Ncr => "NCR",
            EntityPrefix::Nc => "NC",
            EntityPrefix::Capa => "CAPA",
            EntityPrefix::Ca => "CA",
            EntityPrefix::Pa => "PA",
            EntityPrefix::Aud => "AUD",
            EntityPrefix::Fnd => "FND",
            EntityPrefix::Insp => "INSP",
            EntityPrefix::Ires => "IRES",
            EntityPrefix::Qct => "QCT",
            EntityPrefix::Qcp => "QCP",
        }
    }

    /// Human-readable family name used in messages
    pub fn family(&self) -> &'static str {
        match self {
            EntityPrefix::Ncr => "NCR",
            EntityPrefix::Nc => "non-conformance",
            EntityPrefix::Capa => "CAPA",
            EntityPrefix::Ca => "corrective action",
            EntityPrefix::Pa => "preventive action",
            EntityPrefix::Aud => "audit plan",
            EntityPrefix::Fnd => "audit finding",
            EntityPrefix::Insp => "inspection",
            EntityPrefix::Ires => "inspection result",
            EntityPrefix::Qct => "QC template",
            EntityPrefix::Qcp => "QC parameter",
        }
    }

    /// Get all valid prefixes
    pub fn all() -> &'static [EntityPrefix] {
        &[
            EntityPrefix::Ncr,
            EntityPrefix::Nc,
            EntityPrefix::Capa,
            EntityPrefix::Ca,
            EntityPrefix::Pa,
            EntityPrefix::Aud,
            EntityPrefix::Fnd,
            EntityPrefix::Insp,
            EntityPrefix::Ires,
            EntityPrefix::Qct,
            EntityPrefix::Qcp,
        ]
    }
}

impl fmt::Display for EntityPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityPrefix {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NCR" => Ok(EntityPrefix::Ncr),
            "NC" => Ok(EntityPrefix::Nc),
            "CAPA" => Ok(EntityPrefix::Capa),
            "CA" => Ok(EntityPrefix::Ca),
            "PA" => Ok(EntityPrefix::Pa),
            "AUD" => Ok(EntityPrefix::Aud),
            "FND" => Ok(EntityPrefix::Fnd),
            "INSP" => Ok(EntityPrefix::Insp),
            "IRES" => Ok(EntityPrefix::Ires),
            "QCT" => Ok(EntityPrefix::Qct),
            "QCP" => Ok(EntityPrefix::Qcp),
            _ => Err(IdParseError::InvalidPrefix(s.to_string())),
        }
    }
}

/// A unique record identifier combining a type prefix and ULID
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId {
    prefix: EntityPrefix,
    ulid: Ulid,
}

impl EntityId {
    /// Create a new EntityId with the given prefix
    pub fn new(prefix: EntityPrefix) -> Self {
        Self {
            prefix,
            ulid: Ulid::new(),
        }
    }

    /// Get the record prefix
    pub fn prefix(&self) -> EntityPrefix {
        self.prefix
    }

    /// Parse an EntityId from a string
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        s.parse()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, self.ulid)
    }
}

impl FromStr for EntityId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix_str, ulid_str) = s
            .split_once('-')
            .ok_or_else(|| IdParseError::MissingDelimiter(s.to_string()))?;

        let prefix = prefix_str.parse()?;
        let ulid = Ulid::from_string(ulid_str)
            .map_err(|e| IdParseError::InvalidUlid(ulid_str.to_string(), e.to_string()))?;

        Ok(Self { prefix, ulid })
    }
}

impl Serialize for EntityId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing record IDs
#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("invalid record prefix: '{0}' (valid: NCR, NC, CAPA, CA, PA, AUD, FND, INSP, IRES, QCT, QCP)")]
    InvalidPrefix(String),

    #[error("missing '-' delimiter in record ID: '{0}'")]
    MissingDelimiter(String),

    #[error("invalid ULID '{0}': {1}")]
    InvalidUlid(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_generation() {
        let id = EntityId::new(EntityPrefix::Capa);
        assert!(id.to_string().starts_with("CAPA-"));
        assert_eq!(id.to_string().len(), 31); // CAPA- (5) + ULID (26)
    }

    #[test]
    fn test_entity_id_roundtrip() {
        let original = EntityId::new(EntityPrefix::Insp);
        let parsed = EntityId::parse(&original.to_string()).unwrap();
        assert_eq!(parsed.prefix(), EntityPrefix::Insp);
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_business_number_is_not_an_id() {
        // NCR-2025-003 splits into a valid prefix but an invalid ULID
        let err = EntityId::parse("NCR-2025-003").unwrap_err();
        assert!(matches!(err, IdParseError::InvalidUlid(_, _)));
    }

    #[test]
    fn test_entity_id_invalid_prefix() {
        let err = EntityId::parse("XXX-01HQ3K4N5M6P7R8S9T0UVWXYZ").unwrap_err();
        assert!(matches!(err, IdParseError::InvalidPrefix(_)));
    }

    #[test]
    fn test_entity_id_missing_delimiter() {
        let err = EntityId::parse("CAPA01HQ3K4N5M6P7R8S9T0UVWXYZ").unwrap_err();
        assert!(matches!(err, IdParseError::MissingDelimiter(_)));
    }

    #[test]
    fn test_all_prefixes_parse() {
        for prefix in EntityPrefix::all() {
            let id = EntityId::new(*prefix);
            let parsed = EntityId::parse(&id.to_string()).unwrap();
            assert_eq!(parsed.prefix(), *prefix);
        }
    }
}
