//! Audit finding entity type

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::{default_revision, Entity, Latch, Severity, Signoff};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::links::BackRef;
use crate::core::workflow::{advance, Action, Lifecycle, Rule, State, StateMachine, WorkflowError};

/// Classification of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    MajorNonconformity,
    MinorNonconformity,
    #[default]
    Observation,
    OpportunityForImprovement,
}

impl std::fmt::Display for FindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingType::MajorNonconformity => write!(f, "major_nonconformity"),
            FindingType::MinorNonconformity => write!(f, "minor_nonconformity"),
            FindingType::Observation => write!(f, "observation"),
            FindingType::OpportunityForImprovement => write!(f, "opportunity_for_improvement"),
        }
    }
}

impl std::str::FromStr for FindingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "major_nonconformity" | "major" => Ok(FindingType::MajorNonconformity),
            "minor_nonconformity" | "minor" => Ok(FindingType::MinorNonconformity),
            "observation" => Ok(FindingType::Observation),
            "opportunity_for_improvement" | "ofi" => Ok(FindingType::OpportunityForImprovement),
            _ => Err(format!(
                "Invalid finding type: {}. Use major, minor, observation, or ofi",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    #[default]
    Open,
    Acknowledged,
    Verified,
    Closed,
    Rejected,
}

impl State for FindingStatus {
    fn as_str(&self) -> &'static str {
        match self {
            FindingStatus::Open => "open",
            FindingStatus::Acknowledged => "acknowledged",
            FindingStatus::Verified => "verified",
            FindingStatus::Closed => "closed",
            FindingStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FindingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FINDING_WORKFLOW.parse(s)
    }
}

pub static FINDING_WORKFLOW: StateMachine<FindingStatus> = StateMachine::new(
    "audit finding",
    FindingStatus::Open,
    &[
        Rule::on(Action::Acknowledge, &[FindingStatus::Open], FindingStatus::Acknowledged),
        Rule::on(Action::Verify, &[FindingStatus::Acknowledged], FindingStatus::Verified),
        Rule::on(Action::Close, &[FindingStatus::Verified], FindingStatus::Closed),
        Rule::on(Action::Reject, &[FindingStatus::Open], FindingStatus::Rejected),
    ],
);

/// A finding raised during an audit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditFinding {
    pub id: EntityId,

    /// Business number (e.g., "FND-2025-004")
    pub finding_number: String,

    /// Audit that produced this finding
    #[serde(default, skip_serializing_if = "BackRef::is_empty")]
    pub audit_plan: BackRef,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub finding_type: FindingType,

    #[serde(default)]
    pub severity: Severity,

    /// Standard clause the finding refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clause: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,

    /// Auditee response captured on acknowledgement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    #[serde(default)]
    pub requires_capa: Latch,

    #[serde(default, skip_serializing_if = "BackRef::is_empty")]
    pub capa: BackRef,

    #[serde(default)]
    pub status: FindingStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<Signoff>,

    #[serde(default)]
    pub is_verified: Latch,

    #[serde(default)]
    pub is_effective: Latch,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,

    pub created: DateTime<Utc>,

    pub author: String,

    #[serde(default = "default_revision")]
    pub entity_revision: u32,
}

impl Entity for AuditFinding {
    const PREFIX: EntityPrefix = EntityPrefix::Fnd;
    const LOCKED_FIELDS: &'static [&'static str] = &[
        "finding_number",
        "response",
        "requires_capa",
        "capa",
        "acknowledged",
        "verified",
        "is_verified",
        "is_effective",
        "closed",
        "rejected",
        "rejection_reason",
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
        Some(self.finding_number.clone())
    }

    fn references(&self) -> Vec<(&'static str, String)> {
        let mut refs = Vec::new();
        if let Some(id) = &self.audit_plan.id {
            refs.push(("audit_plan_id", id.to_string()));
        }
        if let Some(id) = &self.capa.id {
            refs.push(("capa_id", id.to_string()));
        }
        refs
    }

    fn bump_revision(&mut self) {
        self.entity_revision += 1;
    }
}

impl Lifecycle for AuditFinding {
    type State = FindingStatus;

    fn machine() -> &'static StateMachine<FindingStatus> {
        &FINDING_WORKFLOW
    }

    fn state(&self) -> FindingStatus {
        self.status
    }

    fn set_state(&mut self, state: FindingStatus) {
        self.status = state;
    }
}

impl AuditFinding {
    pub fn new(
        finding_number: impl Into<String>,
        title: impl Into<String>,
        finding_type: FindingType,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Fnd),
            finding_number: finding_number.into(),
            audit_plan: BackRef::default(),
            title: title.into(),
            description: None,
            finding_type,
            severity: Severity::default(),
            clause: None,
            evidence: None,
            responsible: None,
            due_date: None,
            response: None,
            requires_capa: Latch::default(),
            capa: BackRef::default(),
            status: FindingStatus::default(),
            acknowledged: None,
            verified: None,
            is_verified: Latch::default(),
            is_effective: Latch::default(),
            closed: None,
            rejected: None,
            rejection_reason: None,
            created: Utc::now(),
            author: author.into(),
            entity_revision: 1,
        }
    }

    pub fn with_audit_plan(mut self, id: Option<EntityId>, number: Option<String>) -> Self {
        self.audit_plan.annotate(id, number);
        self
    }

    pub fn acknowledge(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
        response: Option<String>,
    ) -> Result<(), WorkflowError> {
        advance(self, Action::Acknowledge)?;
        self.acknowledged = Some(Signoff::new(actor, now));
        self.response = response;
        Ok(())
    }

    pub fn verify(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
        is_effective: bool,
        notes: Option<String>,
    ) -> Result<(), WorkflowError> {
        advance(self, Action::Verify)?;
        self.verified = Some(Signoff::new(actor, now).with_comment(notes));
        self.is_verified.raise();
        self.is_effective.raise_if(is_effective);
        Ok(())
    }

    pub fn close(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        advance(self, Action::Close)?;
        self.closed = Some(Signoff::new(actor, now));
        Ok(())
    }

    pub fn reject(&mut self, actor: &str, now: DateTime<Utc>, reason: String) -> Result<(), WorkflowError> {
        advance(self, Action::Reject)?;
        self.rejected = Some(Signoff::new(actor, now));
        self.rejection_reason = Some(reason);
        Ok(())
    }

    /// Note that a CAPA answers this finding
    pub fn raise_capa(
        &mut self,
        capa_id: Option<EntityId>,
        capa_number: Option<String>,
    ) -> Result<(), WorkflowError> {
        if self.is_terminal() {
            return Err(WorkflowError::Locked {
                family: FINDING_WORKFLOW.family(),
                status: self.status.to_string(),
            });
        }
        self.requires_capa.raise();
        self.capa.annotate(capa_id, capa_number);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding() -> AuditFinding {
        AuditFinding::new(
            "FND-2025-001",
            "Calibration records incomplete",
            FindingType::MinorNonconformity,
            "test",
        )
    }

    #[test]
    fn test_finding_lifecycle() {
        let mut f = finding();
        let now = Utc::now();
        f.acknowledge("auditee", now, Some("will fix".to_string()))
            .unwrap();
        f.verify("auditor", now, true, None).unwrap();
        f.close("auditor", now).unwrap();
        assert_eq!(f.status, FindingStatus::Closed);
        assert!(f.is_verified.is_set());
        assert!(f.is_effective.is_set());
    }

    #[test]
    fn test_reject_only_from_open() {
        let now = Utc::now();
        let mut f = finding();
        f.acknowledge("auditee", now, None).unwrap();
        assert!(f.reject("auditor", now, "duplicate".to_string()).is_err());
        assert!(f.rejection_reason.is_none());

        let mut g = finding();
        g.reject("auditor", now, "not a finding".to_string()).unwrap();
        assert_eq!(g.status, FindingStatus::Rejected);
    }

    #[test]
    fn test_raise_capa_refused_when_closed() {
        let now = Utc::now();
        let mut f = finding();
        f.raise_capa(None, Some("CAPA-2025-004".to_string())).unwrap();
        assert!(f.requires_capa.is_set());

        f.acknowledge("a", now, None).unwrap();
        f.verify("b", now, false, None).unwrap();
        f.close("b", now).unwrap();
        assert!(f.raise_capa(None, None).is_err());
    }

    #[test]
    fn test_references_include_audit_plan() {
        let plan = EntityId::new(EntityPrefix::Aud);
        let f = finding().with_audit_plan(Some(plan.clone()), None);
        assert_eq!(f.references(), vec![("audit_plan_id", plan.to_string())]);
    }
}
