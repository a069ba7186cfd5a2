//! QC parameter entity type - one characteristic checked by a template

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::compliance::ensure_finite;
use crate::core::entity::{default_revision, Entity, ListOrder, Severity};
use crate::core::identity::{EntityId, EntityPrefix};

/// How the characteristic is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    #[default]
    Numeric,
    Textual,
}

impl std::fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterKind::Numeric => write!(f, "numeric"),
            ParameterKind::Textual => write!(f, "textual"),
        }
    }
}

impl std::str::FromStr for ParameterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "numeric" | "number" => Ok(ParameterKind::Numeric),
            "textual" | "text" => Ok(ParameterKind::Textual),
            _ => Err(format!("Invalid parameter kind: {}. Use numeric or textual", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QcParameter {
    pub id: EntityId,

    /// Owning template
    pub template: EntityId,

    #[serde(default)]
    pub sequence: u32,

    pub name: String,

    #[serde(default)]
    pub kind: ParameterKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_limit: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_limit: Option<f64>,

    /// Measurement method or gauge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Defect severity assigned to failing results
    #[serde(default)]
    pub criticality: Severity,

    #[serde(default)]
    pub mandatory: bool,

    pub created: DateTime<Utc>,

    pub author: String,

    #[serde(default = "default_revision")]
    pub entity_revision: u32,
}

impl Entity for QcParameter {
    const PREFIX: EntityPrefix = EntityPrefix::Qcp;
    const ORDER: ListOrder = ListOrder::SequenceAscending;
    const LOCKED_FIELDS: &'static [&'static str] = &["template"];

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn title(&self) -> &str {
        &self.name
    }

    fn status(&self) -> &str {
        match self.kind {
            ParameterKind::Numeric => "numeric",
            ParameterKind::Textual => "textual",
        }
    }

    fn created(&self) -> DateTime<Utc> {
        self.created
    }

    fn author(&self) -> &str {
        &self.author
    }

    fn references(&self) -> Vec<(&'static str, String)> {
        vec![("template_id", self.template.to_string())]
    }

    fn sequence(&self) -> u32 {
        self.sequence
    }

    fn validate(&self) -> Result<(), String> {
        ensure_finite("target", self.target)?;
        ensure_finite("lower_limit", self.lower_limit)?;
        ensure_finite("upper_limit", self.upper_limit)?;
        if let (Some(lsl), Some(usl)) = (self.lower_limit, self.upper_limit) {
            if lsl > usl {
                return Err(format!("lower limit {} is above upper limit {}", lsl, usl));
            }
        }
        if self.kind == ParameterKind::Textual
            && (self.lower_limit.is_some() || self.upper_limit.is_some())
        {
            return Err(format!("textual parameter '{}' cannot carry limits", self.name));
        }
        Ok(())
    }

    fn bump_revision(&mut self) {
        self.entity_revision += 1;
    }
}

impl QcParameter {
    pub fn new(template: EntityId, sequence: u32, name: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Qcp),
            template,
            sequence,
            name: name.into(),
            kind: ParameterKind::default(),
            unit: None,
            target: None,
            lower_limit: None,
            upper_limit: None,
            method: None,
            criticality: Severity::default(),
            mandatory: false,
            created: Utc::now(),
            author: author.into(),
            entity_revision: 1,
        }
    }

    /// Copy under another template, with a fresh ID
    pub fn copy_to(&self, template: EntityId, author: impl Into<String>) -> QcParameter {
        QcParameter {
            id: EntityId::new(EntityPrefix::Qcp),
            template,
            created: Utc::now(),
            author: author.into(),
            entity_revision: 1,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::compliance::ResultStatus;
    use crate::entities::inspection_result::InspectionResult;

    fn parameter() -> QcParameter {
        let mut p = QcParameter::new(EntityId::new(EntityPrefix::Qct), 3, "Thread pitch", "test");
        p.lower_limit = Some(1.45);
        p.upper_limit = Some(1.55);
        p.target = Some(1.5);
        p.criticality = Severity::Critical;
        p
    }

    #[test]
    fn test_seeded_result_carries_limits() {
        let p = parameter();
        let insp = EntityId::new(EntityPrefix::Insp);
        let mut r = InspectionResult::from_parameter(insp.clone(), &p, "inspector");
        assert_eq!(r.inspection, insp);
        assert_eq!(r.sequence, 3);
        assert_eq!(r.status, ResultStatus::Pending);

        r.record("inspector", Utc::now(), Some(1.6), None, None);
        assert_eq!(r.defect(), Some(Severity::Critical));
    }

    #[test]
    fn test_copy_to_new_template() {
        let p = parameter();
        let v2 = EntityId::new(EntityPrefix::Qct);
        let copy = p.copy_to(v2.clone(), "eng");
        assert_eq!(copy.template, v2);
        assert_eq!(copy.name, p.name);
        assert_ne!(copy.id, p.id);
    }

    #[test]
    fn test_validate_limits() {
        let mut p = parameter();
        assert!(p.validate().is_ok());
        p.lower_limit = Some(2.0);
        assert!(p.validate().is_err());

        let mut text = QcParameter::new(EntityId::new(EntityPrefix::Qct), 1, "Label legible", "test");
        text.kind = ParameterKind::Textual;
        assert!(text.validate().is_ok());
        text.upper_limit = Some(1.0);
        assert!(text.validate().is_err());
    }
}
