//! Non-conformance entity type - full investigation variant of the NCR

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::{default_revision, Entity, Latch, Priority, Severity, Signoff};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::links::BackRef;
use crate::core::workflow::{advance, Action, Lifecycle, Rule, State, StateMachine, WorkflowError};

/// Where the non-conformance was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    IncomingInspection,
    #[default]
    InProcess,
    FinalInspection,
    Customer,
    Supplier,
    Audit,
    Other,
}

impl std::fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionSource::IncomingInspection => write!(f, "incoming_inspection"),
            DetectionSource::InProcess => write!(f, "in_process"),
            DetectionSource::FinalInspection => write!(f, "final_inspection"),
            DetectionSource::Customer => write!(f, "customer"),
            DetectionSource::Supplier => write!(f, "supplier"),
            DetectionSource::Audit => write!(f, "audit"),
            DetectionSource::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for DetectionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "incoming_inspection" | "incoming" => Ok(DetectionSource::IncomingInspection),
            "in_process" => Ok(DetectionSource::InProcess),
            "final_inspection" | "final" => Ok(DetectionSource::FinalInspection),
            "customer" => Ok(DetectionSource::Customer),
            "supplier" => Ok(DetectionSource::Supplier),
            "audit" => Ok(DetectionSource::Audit),
            "other" => Ok(DetectionSource::Other),
            _ => Err(format!(
                "Invalid detection source: {}. Use incoming_inspection, in_process, final_inspection, customer, supplier, audit, or other",
                s
            )),
        }
    }
}

/// Containment action status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContainmentStatus {
    #[default]
    Open,
    Completed,
}

impl std::fmt::Display for ContainmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainmentStatus::Open => write!(f, "open"),
            ContainmentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Immediate step taken to stop affected product from moving on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainmentAction {
    pub sequence: u32,

    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub status: ContainmentStatus,

    pub recorded: Signoff,

    /// Completion sign-off; the comment holds the outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<Signoff>,
}

impl ContainmentAction {
    pub fn new(action: impl Into<String>, actor: &str, now: DateTime<Utc>) -> Self {
        Self {
            sequence: 0,
            action: action.into(),
            owner: None,
            due_date: None,
            status: ContainmentStatus::Open,
            recorded: Signoff::new(actor, now),
            completed: None,
        }
    }

    pub fn complete(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
        outcome: Option<String>,
    ) -> Result<(), WorkflowError> {
        if self.status == ContainmentStatus::Completed {
            return Err(WorkflowError::WrongStatus {
                family: "containment action",
                expected: ContainmentStatus::Open.to_string(),
                current: self.status.to_string(),
            });
        }
        self.status = ContainmentStatus::Completed;
        self.completed = Some(Signoff::new(actor, now).with_comment(outcome));
        Ok(())
    }
}

/// What happens to the non-conforming material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispositionDecision {
    UseAsIs,
    Rework,
    Repair,
    Scrap,
    ReturnToSupplier,
    SortAndScreen,
    CustomerConcession,
    Downgrade,
}

impl std::fmt::Display for DispositionDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispositionDecision::UseAsIs => write!(f, "use_as_is"),
            DispositionDecision::Rework => write!(f, "rework"),
            DispositionDecision::Repair => write!(f, "repair"),
            DispositionDecision::Scrap => write!(f, "scrap"),
            DispositionDecision::ReturnToSupplier => write!(f, "return_to_supplier"),
            DispositionDecision::SortAndScreen => write!(f, "sort_and_screen"),
            DispositionDecision::CustomerConcession => write!(f, "customer_concession"),
            DispositionDecision::Downgrade => write!(f, "downgrade"),
        }
    }
}

impl std::str::FromStr for DispositionDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "use_as_is" => Ok(DispositionDecision::UseAsIs),
            "rework" => Ok(DispositionDecision::Rework),
            "repair" => Ok(DispositionDecision::Repair),
            "scrap" => Ok(DispositionDecision::Scrap),
            "return_to_supplier" | "rts" => Ok(DispositionDecision::ReturnToSupplier),
            "sort_and_screen" | "sort" => Ok(DispositionDecision::SortAndScreen),
            "customer_concession" | "concession" => Ok(DispositionDecision::CustomerConcession),
            "downgrade" => Ok(DispositionDecision::Downgrade),
            _ => Err(format!(
                "Invalid disposition: {}. Use use_as_is, rework, repair, scrap, return_to_supplier, sort_and_screen, customer_concession, or downgrade",
                s
            )),
        }
    }
}

/// Approved decision for part of the affected quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Disposition {
    pub decision: DispositionDecision,

    pub quantity: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,

    pub approved: Signoff,
}

impl Disposition {
    pub fn new(decision: DispositionDecision, quantity: u32, actor: &str, now: DateTime<Utc>) -> Self {
        Self {
            decision,
            quantity,
            cost: None,
            justification: None,
            approved: Signoff::new(actor, now),
        }
    }
}

/// Non-conformance workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NcStatus {
    #[default]
    Draft,
    Submitted,
    UnderInvestigation,
    CapaRequired,
    Closed,
    Cancelled,
}

impl State for NcStatus {
    fn as_str(&self) -> &'static str {
        match self {
            NcStatus::Draft => "draft",
            NcStatus::Submitted => "submitted",
            NcStatus::UnderInvestigation => "under_investigation",
            NcStatus::CapaRequired => "capa_required",
            NcStatus::Closed => "closed",
            NcStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for NcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NcStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NC_WORKFLOW.parse(s)
    }
}

pub static NC_WORKFLOW: StateMachine<NcStatus> = StateMachine::new(
    "non-conformance",
    NcStatus::Draft,
    &[
        Rule::on(Action::Submit, &[NcStatus::Draft], NcStatus::Submitted),
        Rule::on(
            Action::Investigate,
            &[NcStatus::Submitted],
            NcStatus::UnderInvestigation,
        ),
        Rule::on(
            Action::RequireCapa,
            &[NcStatus::UnderInvestigation],
            NcStatus::CapaRequired,
        ),
        Rule::on(
            Action::Close,
            &[NcStatus::UnderInvestigation, NcStatus::CapaRequired],
            NcStatus::Closed,
        ),
        Rule::on(
            Action::Cancel,
            &[
                NcStatus::Draft,
                NcStatus::Submitted,
                NcStatus::UnderInvestigation,
                NcStatus::CapaRequired,
            ],
            NcStatus::Cancelled,
        ),
    ],
);

/// A non-conformance record with investigation and CAPA escalation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NonConformance {
    pub id: EntityId,

    /// Business number (e.g., "NC-2025-017")
    pub nc_number: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub detected_in: DetectionSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_affected: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containment_actions: Vec<ContainmentAction>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dispositions: Vec<Disposition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,

    #[serde(default)]
    pub requires_capa: Latch,

    #[serde(default, skip_serializing_if = "BackRef::is_empty")]
    pub capa: BackRef,

    #[serde(default)]
    pub status: NcStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_started: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capa_requested: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<Signoff>,

    pub created: DateTime<Utc>,

    pub author: String,

    #[serde(default = "default_revision")]
    pub entity_revision: u32,
}

impl Entity for NonConformance {
    const PREFIX: EntityPrefix = EntityPrefix::Nc;
    const LOCKED_FIELDS: &'static [&'static str] = &[
        "nc_number",
        "containment_actions",
        "dispositions",
        "requires_capa",
        "capa",
        "submitted",
        "investigation_started",
        "capa_requested",
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
        Some(self.nc_number.clone())
    }

    fn references(&self) -> Vec<(&'static str, String)> {
        self.capa
            .id
            .as_ref()
            .map(|id| ("capa_id", id.to_string()))
            .into_iter()
            .collect()
    }

    fn validate(&self) -> Result<(), String> {
        for disposition in &self.dispositions {
            match disposition.cost {
                Some(cost) if !cost.is_finite() || cost < 0.0 => {
                    return Err(format!("disposition cost must be a non-negative number, got {}", cost))
                }
                _ => {}
            }
        }
        if let Some(affected) = self.quantity_affected {
            let disposed = self.disposed_quantity();
            if disposed > affected {
                return Err(format!(
                    "dispositions cover {} units but only {} are affected",
                    disposed, affected
                ));
            }
        }
        Ok(())
    }

    fn bump_revision(&mut self) {
        self.entity_revision += 1;
    }
}

impl Lifecycle for NonConformance {
    type State = NcStatus;

    fn machine() -> &'static StateMachine<NcStatus> {
        &NC_WORKFLOW
    }

    fn state(&self) -> NcStatus {
        self.status
    }

    fn set_state(&mut self, state: NcStatus) {
        self.status = state;
    }
}

impl NonConformance {
    pub fn new(
        nc_number: impl Into<String>,
        title: impl Into<String>,
        severity: Severity,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Nc),
            nc_number: nc_number.into(),
            title: title.into(),
            description: None,
            severity,
            priority: Priority::default(),
            detected_in: DetectionSource::default(),
            part_number: None,
            lot_number: None,
            quantity_affected: None,
            containment_actions: Vec::new(),
            dispositions: Vec::new(),
            investigation_summary: None,
            root_cause: None,
            requires_capa: Latch::default(),
            capa: BackRef::default(),
            status: NcStatus::default(),
            submitted: None,
            investigation_started: None,
            capa_requested: None,
            closed: None,
            cancelled: None,
            created: Utc::now(),
            author: author.into(),
            entity_revision: 1,
        }
    }

    /// Append a containment action, numbering it after the existing ones
    pub fn add_containment(&mut self, mut action: ContainmentAction) -> &ContainmentAction {
        action.sequence = self
            .containment_actions
            .iter()
            .map(|a| a.sequence)
            .max()
            .unwrap_or(0)
            + 1;
        self.containment_actions.push(action);
        &self.containment_actions[self.containment_actions.len() - 1]
    }

    pub fn containment_mut(&mut self, sequence: u32) -> Option<&mut ContainmentAction> {
        self.containment_actions
            .iter_mut()
            .find(|a| a.sequence == sequence)
    }

    /// Containment actions not yet completed
    pub fn open_containment(&self) -> usize {
        self.containment_actions
            .iter()
            .filter(|a| a.status == ContainmentStatus::Open)
            .count()
    }

    pub fn add_disposition(&mut self, disposition: Disposition) {
        self.dispositions.push(disposition);
    }

    pub fn disposed_quantity(&self) -> u32 {
        self.dispositions.iter().map(|d| d.quantity).sum()
    }

    pub fn total_disposition_cost(&self) -> f64 {
        self.dispositions.iter().filter_map(|d| d.cost).sum()
    }

    pub fn submit(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        advance(self, Action::Submit)?;
        self.submitted = Some(Signoff::new(actor, now));
        Ok(())
    }

    pub fn investigate(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        advance(self, Action::Investigate)?;
        self.investigation_started = Some(Signoff::new(actor, now));
        Ok(())
    }

    /// Escalate to CAPA; the CAPA record itself is created separately
    pub fn require_capa(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
        capa_id: Option<EntityId>,
        capa_number: Option<String>,
    ) -> Result<(), WorkflowError> {
        advance(self, Action::RequireCapa)?;
        self.capa_requested = Some(Signoff::new(actor, now));
        self.requires_capa.raise();
        self.capa.annotate(capa_id, capa_number);
        Ok(())
    }

    pub fn close(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<(), WorkflowError> {
        advance(self, Action::Close)?;
        self.closed = Some(Signoff::new(actor, now).with_comment(notes));
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

#[cfg(test)]
mod tests {
    use super::*;

    fn nc() -> NonConformance {
        NonConformance::new("NC-2025-001", "Porosity in casting", Severity::Major, "test")
    }

    #[test]
    fn test_escalation_path() {
        let mut nc = nc();
        let now = Utc::now();
        nc.submit("a", now).unwrap();
        nc.investigate("b", now).unwrap();
        nc.require_capa("b", now, None, Some("CAPA-2025-009".to_string()))
            .unwrap();
        assert!(nc.requires_capa.is_set());
        nc.close("c", now, None).unwrap();
        assert_eq!(nc.status, NcStatus::Closed);
        assert!(nc.capa_requested.is_some());
    }

    #[test]
    fn test_close_directly_after_investigation() {
        let mut nc = nc();
        let now = Utc::now();
        nc.submit("a", now).unwrap();
        nc.investigate("b", now).unwrap();
        nc.close("c", now, Some("no systemic cause".to_string())).unwrap();
        assert!(!nc.requires_capa.is_set());
    }

    #[test]
    fn test_cancel_from_any_open_state() {
        let now = Utc::now();
        let mut draft = nc();
        draft.cancel("a", now, None).unwrap();
        assert_eq!(draft.status, NcStatus::Cancelled);

        let mut escalated = nc();
        escalated.submit("a", now).unwrap();
        escalated.investigate("a", now).unwrap();
        escalated.require_capa("a", now, None, None).unwrap();
        escalated.cancel("a", now, Some("raised in error".to_string())).unwrap();

        let mut closed = nc();
        closed.submit("a", now).unwrap();
        closed.investigate("a", now).unwrap();
        closed.close("a", now, None).unwrap();
        assert!(closed.cancel("a", now, None).is_err());
        assert!(closed.cancelled.is_none());
    }

    #[test]
    fn test_containment_numbering_and_completion() {
        let mut nc = nc();
        let now = Utc::now();
        nc.add_containment(ContainmentAction::new("Quarantine lot 7", "a", now));
        let second = nc
            .add_containment(ContainmentAction::new("Sort WIP at station 3", "a", now))
            .sequence;
        assert_eq!(second, 2);
        assert_eq!(nc.open_containment(), 2);

        let action = nc.containment_mut(1).unwrap();
        action.complete("b", now, Some("42 pcs held".to_string())).unwrap();
        assert!(action.complete("b", now, None).is_err());
        assert_eq!(nc.open_containment(), 1);
        assert!(nc.containment_mut(9).is_none());
    }

    #[test]
    fn test_dispositions_bounded_by_affected_quantity() {
        let mut nc = nc();
        let now = Utc::now();
        nc.quantity_affected = Some(10);

        let mut rework = Disposition::new(DispositionDecision::Rework, 6, "mrb", now);
        rework.cost = Some(120.0);
        nc.add_disposition(rework);
        let mut scrap = Disposition::new(DispositionDecision::Scrap, 4, "mrb", now);
        scrap.cost = Some(80.5);
        nc.add_disposition(scrap);
        assert!(nc.validate().is_ok());
        assert_eq!(nc.total_disposition_cost(), 200.5);

        nc.add_disposition(Disposition::new(DispositionDecision::UseAsIs, 1, "mrb", now));
        assert!(nc.validate().is_err());
    }

    #[test]
    fn test_disposition_parse() {
        assert_eq!(
            "return-to-supplier".parse::<DispositionDecision>(),
            Ok(DispositionDecision::ReturnToSupplier)
        );
        assert!("melt".parse::<DispositionDecision>().is_err());
    }

    #[test]
    fn test_investigate_requires_submission() {
        let mut nc = nc();
        assert!(nc.investigate("b", Utc::now()).is_err());
        assert!(nc.investigation_started.is_none());
        assert_eq!(nc.status, NcStatus::Draft);
    }
}
