//! Inspection entity type
//!
//! An inspection owns an ordered set of [`InspectionResult`] records (stored
//! separately, linked by `inspection`). The status tally and defect counters
//! kept here are maintained by the service as results change; `submit`
//! freezes the tally and derives the overall result.
//!
//! [`InspectionResult`]: crate::entities::InspectionResult

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::aggregate::{DefectCounts, InspectionStatistics, LotQuantities, OverallResult, Tally};
use crate::core::entity::{default_revision, Entity, Severity, Signoff};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::links::BackRef;
use crate::core::workflow::{advance, Action, Lifecycle, Rule, State, StateMachine, WorkflowError};

/// Inspection stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InspectionType {
    #[default]
    Incoming,
    InProcess,
    Final,
    FirstArticle,
    Audit,
}

impl std::fmt::Display for InspectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InspectionType::Incoming => write!(f, "incoming"),
            InspectionType::InProcess => write!(f, "in_process"),
            InspectionType::Final => write!(f, "final"),
            InspectionType::FirstArticle => write!(f, "first_article"),
            InspectionType::Audit => write!(f, "audit"),
        }
    }
}

impl std::str::FromStr for InspectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "incoming" => Ok(InspectionType::Incoming),
            "in_process" => Ok(InspectionType::InProcess),
            "final" => Ok(InspectionType::Final),
            "first_article" | "fai" => Ok(InspectionType::FirstArticle),
            "audit" => Ok(InspectionType::Audit),
            _ => Err(format!(
                "Invalid inspection type: {}. Use incoming, in_process, final, first_article, or audit",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    #[default]
    Draft,
    Scheduled,
    InProgress,
    Completed,
    Approved,
    Rejected,
    Cancelled,
}

impl State for InspectionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            InspectionStatus::Draft => "draft",
            InspectionStatus::Scheduled => "scheduled",
            InspectionStatus::InProgress => "in_progress",
            InspectionStatus::Completed => "completed",
            InspectionStatus::Approved => "approved",
            InspectionStatus::Rejected => "rejected",
            InspectionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InspectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        INSPECTION_WORKFLOW.parse(s)
    }
}

pub static INSPECTION_WORKFLOW: StateMachine<InspectionStatus> = StateMachine::new(
    "inspection",
    InspectionStatus::Draft,
    &[
        Rule::on(Action::Schedule, &[InspectionStatus::Draft], InspectionStatus::Scheduled),
        Rule::on(
            Action::Start,
            &[InspectionStatus::Draft, InspectionStatus::Scheduled],
            InspectionStatus::InProgress,
        ),
        Rule::on(Action::Submit, &[InspectionStatus::InProgress], InspectionStatus::Completed),
        Rule::on(Action::Approve, &[InspectionStatus::Completed], InspectionStatus::Approved),
        Rule::on(Action::Reject, &[InspectionStatus::Completed], InspectionStatus::Rejected),
        Rule::on(
            Action::Cancel,
            &[
                InspectionStatus::Draft,
                InspectionStatus::Scheduled,
                InspectionStatus::InProgress,
            ],
            InspectionStatus::Cancelled,
        ),
    ],
);

/// An inspection of a lot, part or process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Inspection {
    pub id: EntityId,

    /// Business number (e.g., "INSP-2025-0042")
    pub inspection_number: String,

    pub title: String,

    #[serde(default)]
    pub inspection_type: InspectionType,

    /// QC template the results were seeded from
    #[serde(default, skip_serializing_if = "BackRef::is_empty")]
    pub template: BackRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspector: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<NaiveDate>,

    #[serde(default)]
    pub quantities: LotQuantities,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,

    #[serde(default)]
    pub tally: Tally,

    #[serde(default)]
    pub defects: DefectCounts,

    #[serde(default)]
    pub overall_result: OverallResult,

    /// NCR raised from this inspection
    #[serde(default, skip_serializing_if = "BackRef::is_empty")]
    pub ncr: BackRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,

    #[serde(default)]
    pub status: InspectionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<Signoff>,

    pub created: DateTime<Utc>,

    pub author: String,

    #[serde(default = "default_revision")]
    pub entity_revision: u32,
}

impl Entity for Inspection {
    const PREFIX: EntityPrefix = EntityPrefix::Insp;
    const LOCKED_FIELDS: &'static [&'static str] = &[
        "inspection_number",
        "template",
        "quantities",
        "start_time",
        "end_time",
        "duration_minutes",
        "tally",
        "defects",
        "overall_result",
        "ncr",
        "scheduled",
        "started",
        "submitted",
        "approved",
        "rejected",
        "rejection_reason",
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
        Some(self.inspection_number.clone())
    }

    fn references(&self) -> Vec<(&'static str, String)> {
        let mut refs = Vec::new();
        if let Some(id) = &self.template.id {
            refs.push(("template_id", id.to_string()));
        }
        if let Some(id) = &self.ncr.id {
            refs.push(("ncr_id", id.to_string()));
        }
        refs
    }

    fn validate(&self) -> Result<(), String> {
        self.quantities.validate()
    }

    fn bump_revision(&mut self) {
        self.entity_revision += 1;
    }
}

impl Lifecycle for Inspection {
    type State = InspectionStatus;

    fn machine() -> &'static StateMachine<InspectionStatus> {
        &INSPECTION_WORKFLOW
    }

    fn state(&self) -> InspectionStatus {
        self.status
    }

    fn set_state(&mut self, state: InspectionStatus) {
        self.status = state;
    }
}

/// Whole minutes between two instants, floored
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_milliseconds().div_euclid(60_000)
}

impl Inspection {
    pub fn new(
        inspection_number: impl Into<String>,
        title: impl Into<String>,
        inspection_type: InspectionType,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Insp),
            inspection_number: inspection_number.into(),
            title: title.into(),
            inspection_type,
            template: BackRef::default(),
            part_number: None,
            lot_number: None,
            supplier: None,
            inspector: None,
            scheduled_date: None,
            quantities: LotQuantities::default(),
            start_time: None,
            end_time: None,
            duration_minutes: None,
            tally: Tally::default(),
            defects: DefectCounts::default(),
            overall_result: OverallResult::default(),
            ncr: BackRef::default(),
            remarks: None,
            status: InspectionStatus::default(),
            scheduled: None,
            started: None,
            submitted: None,
            approved: None,
            rejected: None,
            rejection_reason: None,
            cancelled: None,
            created: Utc::now(),
            author: author.into(),
            entity_revision: 1,
        }
    }

    pub fn with_template(mut self, id: Option<EntityId>, label: Option<String>) -> Self {
        self.template.annotate(id, label);
        self
    }

    /// Results may be added, edited or removed only before submission
    pub fn accepts_results(&self) -> bool {
        matches!(
            self.status,
            InspectionStatus::Draft | InspectionStatus::Scheduled | InspectionStatus::InProgress
        )
    }

    /// Guard used by result operations
    pub fn ensure_accepts_results(&self) -> Result<(), WorkflowError> {
        if self.accepts_results() {
            Ok(())
        } else {
            Err(WorkflowError::WrongStatus {
                family: INSPECTION_WORKFLOW.family(),
                expected: "draft, scheduled or in_progress".to_string(),
                current: self.status.to_string(),
            })
        }
    }

    /// Swap one result's defect contribution for another
    pub fn adjust_defects(&mut self, removed: Option<Severity>, added: Option<Severity>) {
        if let Some(severity) = removed {
            self.defects.retract(severity);
        }
        if let Some(severity) = added {
            self.defects.record(severity);
        }
    }

    /// Replace the stored tally with a fresh count over the results
    pub fn refresh_tally(&mut self, tally: Tally) {
        self.tally = tally;
    }

    /// Record lot dispositions, refusing totals larger than the lot
    pub fn record_quantities(&mut self, quantities: LotQuantities) -> Result<(), String> {
        quantities.validate()?;
        self.quantities = quantities;
        Ok(())
    }

    pub fn schedule(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
        date: Option<NaiveDate>,
    ) -> Result<(), WorkflowError> {
        advance(self, Action::Schedule)?;
        if date.is_some() {
            self.scheduled_date = date;
        }
        self.scheduled = Some(Signoff::new(actor, now));
        Ok(())
    }

    pub fn start(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        advance(self, Action::Start)?;
        self.start_time = Some(now);
        self.started = Some(Signoff::new(actor, now));
        if self.inspector.is_none() {
            self.inspector = Some(actor.to_string());
        }
        Ok(())
    }

    /// Finish inspecting: stamp the end, freeze the tally, derive the result
    ///
    /// Duration stays unset when the start was never recorded.
    pub fn submit(&mut self, actor: &str, now: DateTime<Utc>, tally: Tally) -> Result<(), WorkflowError> {
        advance(self, Action::Submit)?;
        self.end_time = Some(now);
        self.duration_minutes = self.start_time.map(|start| duration_minutes(start, now));
        self.tally = tally;
        self.overall_result = OverallResult::from_tally(&tally);
        self.submitted = Some(Signoff::new(actor, now));
        Ok(())
    }

    pub fn approve(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
        comment: Option<String>,
    ) -> Result<(), WorkflowError> {
        advance(self, Action::Approve)?;
        self.approved = Some(Signoff::new(actor, now).with_comment(comment));
        Ok(())
    }

    pub fn reject(&mut self, actor: &str, now: DateTime<Utc>, reason: String) -> Result<(), WorkflowError> {
        advance(self, Action::Reject)?;
        self.rejected = Some(Signoff::new(actor, now));
        self.rejection_reason = Some(reason);
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

    /// Note the NCR raised for this inspection
    pub fn raise_ncr(&mut self, ncr_id: Option<EntityId>, ncr_number: Option<String>) {
        self.ncr.annotate(ncr_id, ncr_number);
    }

    /// Statistics over a tally (live or frozen) plus the stored counters
    pub fn statistics(&self, tally: &Tally) -> InspectionStatistics {
        let overall = if self.submitted.is_some() {
            self.overall_result
        } else {
            OverallResult::from_tally(tally)
        };
        InspectionStatistics::compute(
            self.id.to_string(),
            tally,
            &self.defects,
            &self.quantities,
            overall,
        )
    }
}
