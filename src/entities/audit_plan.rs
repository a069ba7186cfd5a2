//! Audit plan entity type

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::{default_revision, Entity, Signoff};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::workflow::{advance, Action, Lifecycle, Rule, State, StateMachine, WorkflowError};

/// Kind of audit being planned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditType {
    #[default]
    Internal,
    External,
    Supplier,
    Certification,
    Process,
    Product,
}

impl std::fmt::Display for AuditType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditType::Internal => write!(f, "internal"),
            AuditType::External => write!(f, "external"),
            AuditType::Supplier => write!(f, "supplier"),
            AuditType::Certification => write!(f, "certification"),
            AuditType::Process => write!(f, "process"),
            AuditType::Product => write!(f, "product"),
        }
    }
}

impl std::str::FromStr for AuditType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "internal" => Ok(AuditType::Internal),
            "external" => Ok(AuditType::External),
            "supplier" => Ok(AuditType::Supplier),
            "certification" => Ok(AuditType::Certification),
            "process" => Ok(AuditType::Process),
            "product" => Ok(AuditType::Product),
            _ => Err(format!(
                "Invalid audit type: {}. Use internal, external, supplier, certification, process, or product",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    #[default]
    Draft,
    Scheduled,
    InProgress,
    Completed,
    Closed,
    Cancelled,
}

impl State for AuditStatus {
    fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Draft => "draft",
            AuditStatus::Scheduled => "scheduled",
            AuditStatus::InProgress => "in_progress",
            AuditStatus::Completed => "completed",
            AuditStatus::Closed => "closed",
            AuditStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AUDIT_WORKFLOW.parse(s)
    }
}

pub static AUDIT_WORKFLOW: StateMachine<AuditStatus> = StateMachine::new(
    "audit plan",
    AuditStatus::Draft,
    &[
        Rule::on(Action::Schedule, &[AuditStatus::Draft], AuditStatus::Scheduled),
        Rule::on(Action::Start, &[AuditStatus::Scheduled], AuditStatus::InProgress),
        Rule::on(Action::Complete, &[AuditStatus::InProgress], AuditStatus::Completed),
        Rule::on(Action::Close, &[AuditStatus::Completed], AuditStatus::Closed),
        Rule::on(
            Action::Cancel,
            &[AuditStatus::Draft, AuditStatus::Scheduled],
            AuditStatus::Cancelled,
        ),
    ],
);

/// A planned audit and its execution record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditPlan {
    pub id: EntityId,

    /// Business number (e.g., "AUD-2025-Q1-01")
    pub audit_number: String,

    pub title: String,

    #[serde(default)]
    pub audit_type: AuditType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objectives: Option<String>,

    /// Standard audited against (e.g., "ISO 9001:2015")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_auditor: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auditors: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auditee: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_start: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_end: Option<NaiveDate>,

    /// Report summary captured on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default)]
    pub status: AuditStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<Signoff>,

    pub created: DateTime<Utc>,

    pub author: String,

    #[serde(default = "default_revision")]
    pub entity_revision: u32,
}

impl Entity for AuditPlan {
    const PREFIX: EntityPrefix = EntityPrefix::Aud;
    const LOCKED_FIELDS: &'static [&'static str] = &[
        "audit_number",
        "summary",
        "scheduled",
        "started",
        "completed",
        "closed",
        "cancelled",
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
        Some(self.audit_number.clone())
    }

    fn validate(&self) -> Result<(), String> {
        self.validate_window()
    }

    fn bump_revision(&mut self) {
        self.entity_revision += 1;
    }
}

impl Lifecycle for AuditPlan {
    type State = AuditStatus;

    fn machine() -> &'static StateMachine<AuditStatus> {
        &AUDIT_WORKFLOW
    }

    fn state(&self) -> AuditStatus {
        self.status
    }

    fn set_state(&mut self, state: AuditStatus) {
        self.status = state;
    }
}

impl AuditPlan {
    pub fn new(
        audit_number: impl Into<String>,
        title: impl Into<String>,
        audit_type: AuditType,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Aud),
            audit_number: audit_number.into(),
            title: title.into(),
            audit_type,
            scope: None,
            objectives: None,
            standard: None,
            area: None,
            lead_auditor: None,
            auditors: Vec::new(),
            auditee: None,
            planned_start: None,
            planned_end: None,
            summary: None,
            status: AuditStatus::default(),
            scheduled: None,
            started: None,
            completed: None,
            closed: None,
            cancelled: None,
            created: Utc::now(),
            author: author.into(),
            entity_revision: 1,
        }
    }

    /// Check the planned window; an end before the start is rejected
    pub fn validate_window(&self) -> Result<(), String> {
        match (self.planned_start, self.planned_end) {
            (Some(start), Some(end)) if end < start => Err(format!(
                "planned end {} is before planned start {}",
                end, start
            )),
            _ => Ok(()),
        }
    }

    /// Fix the audit dates; supplied dates replace the planned ones
    pub fn schedule(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(), WorkflowError> {
        advance(self, Action::Schedule)?;
        if start.is_some() {
            self.planned_start = start;
        }
        if end.is_some() {
            self.planned_end = end;
        }
        self.scheduled = Some(Signoff::new(actor, now));
        Ok(())
    }

    pub fn start(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        advance(self, Action::Start)?;
        self.started = Some(Signoff::new(actor, now));
        Ok(())
    }

    pub fn complete(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
        summary: Option<String>,
    ) -> Result<(), WorkflowError> {
        advance(self, Action::Complete)?;
        self.completed = Some(Signoff::new(actor, now));
        self.summary = summary;
        Ok(())
    }

    pub fn close(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        advance(self, Action::Close)?;
        self.closed = Some(Signoff::new(actor, now));
        Ok(())
    }

    pub fn cancel(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<(), WorkflowError> {
        advance(self, Action::Cancel)?;
        self.cancelled = Some(Signoff::new(actor, now).with_comment(reason));
        Ok(())
    }
}
