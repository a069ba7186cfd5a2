//! QC template entity type - a versioned checklist of inspection parameters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::{default_revision, Entity, Signoff};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::links::BackRef;
use crate::core::workflow::{advance, Action, Lifecycle, Rule, State, StateMachine, WorkflowError};
use crate::entities::inspection::InspectionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TemplateStatus {
    #[default]
    Draft,
    Active,
    Inactive,
    Obsolete,
}

impl State for TemplateStatus {
    fn as_str(&self) -> &'static str {
        match self {
            TemplateStatus::Draft => "draft",
            TemplateStatus::Active => "active",
            TemplateStatus::Inactive => "inactive",
            TemplateStatus::Obsolete => "obsolete",
        }
    }
}

impl std::fmt::Display for TemplateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TemplateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TEMPLATE_WORKFLOW.parse(s)
    }
}

pub static TEMPLATE_WORKFLOW: StateMachine<TemplateStatus> = StateMachine::new(
    "QC template",
    TemplateStatus::Draft,
    &[
        Rule::on(
            Action::Activate,
            &[TemplateStatus::Draft, TemplateStatus::Inactive],
            TemplateStatus::Active,
        ),
        Rule::on(Action::Deactivate, &[TemplateStatus::Active], TemplateStatus::Inactive),
        Rule::on(
            Action::Obsolete,
            &[TemplateStatus::Active, TemplateStatus::Inactive],
            TemplateStatus::Obsolete,
        ),
    ],
);

/// A QC template; parameters live in their own records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QcTemplate {
    pub id: EntityId,

    /// Template code, unique together with `version`
    pub code: String,

    #[serde(default = "default_revision")]
    pub version: u32,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub inspection_type: InspectionType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<String>,

    /// Acceptable quality limit, percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aql: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_plan: Option<String>,

    /// Version this one was forked from
    #[serde(default, skip_serializing_if = "BackRef::is_empty")]
    pub previous_version: BackRef,

    #[serde(default)]
    pub status: TemplateStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deactivated: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obsoleted: Option<Signoff>,

    pub created: DateTime<Utc>,

    pub author: String,

    #[serde(default = "default_revision")]
    pub entity_revision: u32,
}

impl Entity for QcTemplate {
    const PREFIX: EntityPrefix = EntityPrefix::Qct;
    const LOCKED_FIELDS: &'static [&'static str] = &[
        "code",
        "version",
        "previous_version",
        "activated",
        "deactivated",
        "obsoleted",
    ];

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn status(&self) -> &str {
        self.status.as_str()
    }

    fn created(&self) -> DateTime<Utc> {
        self.created
    }

    fn author(&self) -> &str {
        &self.author
    }

    fn business_number(&self) -> Option<String> {
        Some(template_key(&self.code, self.version))
    }

    fn references(&self) -> Vec<(&'static str, String)> {
        self.previous_version
            .id
            .as_ref()
            .map(|id| ("previous_version_id", id.to_string()))
            .into_iter()
            .collect()
    }

    fn validate(&self) -> Result<(), String> {
        match self.aql {
            Some(aql) if !(0.0..=100.0).contains(&aql) => {
                Err(format!("AQL must be between 0 and 100, got {}", aql))
            }
            _ => Ok(()),
        }
    }

    fn bump_revision(&mut self) {
        self.entity_revision += 1;
    }
}

impl Lifecycle for QcTemplate {
    type State = TemplateStatus;

    fn machine() -> &'static StateMachine<TemplateStatus> {
        &TEMPLATE_WORKFLOW
    }

    fn state(&self) -> TemplateStatus {
        self.status
    }

    fn set_state(&mut self, state: TemplateStatus) {
        self.status = state;
    }

    /// Anything but an active template may be deleted
    fn is_deletable(&self) -> bool {
        self.status != TemplateStatus::Active
    }

    /// Once activated a version is frozen; changes go into a new version
    fn accepts_edits(&self) -> bool {
        self.status == TemplateStatus::Draft
    }
}

/// Business key of a template version, e.g. "QCT-BORE v2"
pub fn template_key(code: &str, version: u32) -> String {
    format!("{} v{}", code, version)
}

impl QcTemplate {
    pub fn new(code: impl Into<String>, title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Qct),
            code: code.into(),
            version: 1,
            title: title.into(),
            description: None,
            inspection_type: InspectionType::default(),
            part_number: None,
            aql: None,
            sampling_plan: None,
            previous_version: BackRef::default(),
            status: TemplateStatus::default(),
            activated: None,
            deactivated: None,
            obsoleted: None,
            created: Utc::now(),
            author: author.into(),
            entity_revision: 1,
        }
    }

    /// Parameters may only change while the template is a draft
    pub fn ensure_editable(&self) -> Result<(), WorkflowError> {
        if self.status == TemplateStatus::Draft {
            Ok(())
        } else {
            Err(WorkflowError::WrongStatus {
                family: TEMPLATE_WORKFLOW.family(),
                expected: TemplateStatus::Draft.to_string(),
                current: self.status.to_string(),
            })
        }
    }

    /// Draft copy of this template under the next version number
    pub fn next_version(&self, author: impl Into<String>) -> QcTemplate {
        let mut fork = QcTemplate::new(self.code.clone(), self.title.clone(), author);
        fork.version = self.version + 1;
        fork.description = self.description.clone();
        fork.inspection_type = self.inspection_type;
        fork.part_number = self.part_number.clone();
        fork.aql = self.aql;
        fork.sampling_plan = self.sampling_plan.clone();
        fork.previous_version = BackRef::new(
            Some(self.id.clone()),
            Some(template_key(&self.code, self.version)),
        );
        fork
    }

    pub fn activate(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        advance(self, Action::Activate)?;
        self.activated = Some(Signoff::new(actor, now));
        Ok(())
    }

    pub fn deactivate(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        advance(self, Action::Deactivate)?;
        self.deactivated = Some(Signoff::new(actor, now));
        Ok(())
    }

    pub fn obsolete(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        advance(self, Action::Obsolete)?;
        self.obsoleted = Some(Signoff::new(actor, now));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> QcTemplate {
        QcTemplate::new("BORE-CHK", "Bore check", "test")
    }

    #[test]
    fn test_reactivation_cycle() {
        let mut t = template();
        let now = Utc::now();
        t.activate("qa", now).unwrap();
        t.deactivate("qa", now).unwrap();
        t.activate("qa", now).unwrap();
        t.obsolete("qa", now).unwrap();
        assert_eq!(t.status, TemplateStatus::Obsolete);
        assert!(t.activate("qa", now).is_err());
    }

    #[test]
    fn test_only_active_blocks_delete() {
        let mut t = template();
        assert!(t.is_deletable());
        t.activate("qa", Utc::now()).unwrap();
        assert!(!t.is_deletable());
        t.obsolete("qa", Utc::now()).unwrap();
        assert!(t.is_deletable());
    }

    #[test]
    fn test_next_version_is_draft() {
        let mut t = template();
        t.aql = Some(1.5);
        t.activate("qa", Utc::now()).unwrap();

        let v2 = t.next_version("eng");
        assert_eq!(v2.version, 2);
        assert_eq!(v2.status, TemplateStatus::Draft);
        assert_eq!(v2.aql, Some(1.5));
        assert_eq!(v2.previous_version.id.as_ref(), Some(&t.id));
        assert_eq!(v2.business_number().as_deref(), Some("BORE-CHK v2"));
        assert_ne!(v2.id, t.id);
    }

    #[test]
    fn test_parameters_locked_after_activation() {
        let mut t = template();
        assert!(t.ensure_editable().is_ok());
        t.activate("qa", Utc::now()).unwrap();
        assert!(matches!(
            t.ensure_editable(),
            Err(WorkflowError::WrongStatus { .. })
        ));
    }

    #[test]
    fn test_content_frozen_after_activation() {
        let mut t = template();
        assert!(t.accepts_edits());
        t.activate("qa", Utc::now()).unwrap();
        assert!(!t.accepts_edits());
        t.deactivate("qa", Utc::now()).unwrap();
        assert!(!t.accepts_edits());
    }

    #[test]
    fn test_aql_range() {
        let mut t = template();
        t.aql = Some(101.0);
        assert!(t.validate().is_err());
    }
}
