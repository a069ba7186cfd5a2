//! Shared lifecycle for CAPA, corrective action and preventive action records
//!
//! All three families move through the same graph and capture the same
//! sign-offs, so the transitions live here as provided methods of
//! [`ActionRecord`]; each record type only supplies access to its
//! [`ActionProgress`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::{Latch, Signoff};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::links::BackRef;
use crate::core::workflow::{advance, Action, Lifecycle, Rule, State, StateMachine, WorkflowError};

/// Status shared by the action families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    #[default]
    Draft,
    Submitted,
    Approved,
    Implemented,
    PendingVerification,
    Verified,
    Closed,
    Rejected,
    Cancelled,
}

impl State for ActionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Draft => "draft",
            ActionStatus::Submitted => "submitted",
            ActionStatus::Approved => "approved",
            ActionStatus::Implemented => "implemented",
            ActionStatus::PendingVerification => "pending_verification",
            ActionStatus::Verified => "verified",
            ActionStatus::Closed => "closed",
            ActionStatus::Rejected => "rejected",
            ActionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CAPA_WORKFLOW.parse(s)
    }
}

use ActionStatus::*;

const ACTION_RULES: &[Rule<ActionStatus>] = &[
    Rule::on(Action::Submit, &[Draft], Submitted),
    Rule::on(Action::Approve, &[Submitted], Approved),
    Rule::on(Action::Reject, &[Draft, Submitted], Rejected),
    Rule::on(Action::Cancel, &[Draft, Submitted], Cancelled),
    Rule::on(Action::Implement, &[Approved], Implemented),
    Rule::on(Action::RequestVerification, &[Implemented], PendingVerification),
    Rule::on(Action::Verify, &[Implemented, PendingVerification], Verified),
    Rule::on(Action::Close, &[Verified], Closed),
];

pub static CAPA_WORKFLOW: StateMachine<ActionStatus> =
    StateMachine::new("CAPA", Draft, ACTION_RULES);

pub static CORRECTIVE_WORKFLOW: StateMachine<ActionStatus> =
    StateMachine::new("corrective action", Draft, ACTION_RULES);

pub static PREVENTIVE_WORKFLOW: StateMachine<ActionStatus> =
    StateMachine::new("preventive action", Draft, ACTION_RULES);

/// Sign-offs and monotonic flags captured along the action lifecycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implemented: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_requested: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closure_notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<Signoff>,

    #[serde(default)]
    pub is_implemented: Latch,

    #[serde(default)]
    pub is_verified: Latch,

    #[serde(default)]
    pub is_effective: Latch,
}

/// Where an action record originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    Ncr,
    NonConformance,
    AuditFinding,
    CustomerComplaint,
    Inspection,
    #[default]
    Internal,
    Other,
}

impl std::fmt::Display for ActionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionSource::Ncr => write!(f, "ncr"),
            ActionSource::NonConformance => write!(f, "non_conformance"),
            ActionSource::AuditFinding => write!(f, "audit_finding"),
            ActionSource::CustomerComplaint => write!(f, "customer_complaint"),
            ActionSource::Inspection => write!(f, "inspection"),
            ActionSource::Internal => write!(f, "internal"),
            ActionSource::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for ActionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "ncr" => Ok(ActionSource::Ncr),
            "non_conformance" | "nc" => Ok(ActionSource::NonConformance),
            "audit_finding" | "finding" => Ok(ActionSource::AuditFinding),
            "customer_complaint" => Ok(ActionSource::CustomerComplaint),
            "inspection" => Ok(ActionSource::Inspection),
            "internal" => Ok(ActionSource::Internal),
            "other" => Ok(ActionSource::Other),
            _ => Err(format!(
                "Invalid action source: {}. Use ncr, non_conformance, audit_finding, customer_complaint, inspection, internal, or other",
                s
            )),
        }
    }
}

impl ActionSource {
    /// Infer the source kind from a referenced record's prefix
    pub fn from_prefix(prefix: EntityPrefix) -> Option<Self> {
        match prefix {
            EntityPrefix::Ncr => Some(ActionSource::Ncr),
            EntityPrefix::Nc => Some(ActionSource::NonConformance),
            EntityPrefix::Fnd => Some(ActionSource::AuditFinding),
            EntityPrefix::Insp => Some(ActionSource::Inspection),
            _ => None,
        }
    }
}

/// Filter key under which a source reference is listed
pub(crate) fn source_reference(source: &BackRef) -> Option<(&'static str, String)> {
    let id = source.id.as_ref()?;
    let key = match id.prefix() {
        EntityPrefix::Ncr | EntityPrefix::Nc => "ncr_id",
        EntityPrefix::Fnd => "finding_id",
        EntityPrefix::Insp => "inspection_id",
        _ => "source_id",
    };
    Some((key, id.to_string()))
}

/// A record driven by the shared action lifecycle
pub trait ActionRecord: Lifecycle<State = ActionStatus> {
    fn progress(&self) -> &ActionProgress;

    fn progress_mut(&mut self) -> &mut ActionProgress;

    fn submit(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        advance(self, Action::Submit)?;
        self.progress_mut().submitted = Some(Signoff::new(actor, now));
        Ok(())
    }

    fn approve(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
        comment: Option<String>,
    ) -> Result<(), WorkflowError> {
        advance(self, Action::Approve)?;
        self.progress_mut().approved = Some(Signoff::new(actor, now).with_comment(comment));
        Ok(())
    }

    fn reject(&mut self, actor: &str, now: DateTime<Utc>, reason: String) -> Result<(), WorkflowError> {
        advance(self, Action::Reject)?;
        let progress = self.progress_mut();
        progress.rejected = Some(Signoff::new(actor, now));
        progress.rejection_reason = Some(reason);
        Ok(())
    }

    fn implement(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        advance(self, Action::Implement)?;
        let progress = self.progress_mut();
        progress.implemented = Some(Signoff::new(actor, now));
        progress.is_implemented.raise();
        Ok(())
    }

    fn request_verification(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        advance(self, Action::RequestVerification)?;
        self.progress_mut().verification_requested = Some(Signoff::new(actor, now));
        Ok(())
    }

    fn verify(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
        is_effective: bool,
        notes: Option<String>,
    ) -> Result<(), WorkflowError> {
        advance(self, Action::Verify)?;
        let progress = self.progress_mut();
        progress.verified = Some(Signoff::new(actor, now).with_comment(notes));
        progress.is_verified.raise();
        progress.is_effective.raise_if(is_effective);
        Ok(())
    }

    fn close(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<(), WorkflowError> {
        advance(self, Action::Close)?;
        let progress = self.progress_mut();
        progress.closed = Some(Signoff::new(actor, now));
        progress.closure_notes = notes;
        Ok(())
    }

    fn cancel(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<(), WorkflowError> {
        advance(self, Action::Cancel)?;
        self.progress_mut().cancelled = Some(Signoff::new(actor, now).with_comment(reason));
        Ok(())
    }
}

/// Attach a source record to an action, filling in the source kind
pub(crate) fn link_source(
    record_id: &EntityId,
    source: &mut ActionSource,
    link: &mut BackRef,
    id: Option<EntityId>,
    number: Option<String>,
) {
    if let Some(kind) = id.as_ref().and_then(|id| ActionSource::from_prefix(id.prefix())) {
        *source = kind;
    }
    link.annotate(id, number);
    tracing::debug!(record = %record_id, source = %source, "action source recorded");
}
