//! CAPA entity type - combined Corrective and Preventive Actions

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::{default_revision, Entity, Priority, Signoff};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::links::BackRef;
use crate::core::workflow::{Lifecycle, State, StateMachine, WorkflowError};
use crate::entities::action::{
    link_source, source_reference, ActionProgress, ActionRecord, ActionSource, ActionStatus,
    CAPA_WORKFLOW,
};

/// CAPA type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CapaType {
    #[default]
    Corrective,
    Preventive,
    Both,
}

impl std::fmt::Display for CapaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapaType::Corrective => write!(f, "corrective"),
            CapaType::Preventive => write!(f, "preventive"),
            CapaType::Both => write!(f, "both"),
        }
    }
}

impl std::str::FromStr for CapaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "corrective" => Ok(CapaType::Corrective),
            "preventive" => Ok(CapaType::Preventive),
            "both" => Ok(CapaType::Both),
            _ => Err(format!(
                "Invalid CAPA type: {}. Use corrective, preventive, or both",
                s
            )),
        }
    }
}

/// Kind of work an action item covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    RootCause,
    #[default]
    Corrective,
    Preventive,
    Verification,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::RootCause => write!(f, "root_cause"),
            ItemKind::Corrective => write!(f, "corrective"),
            ItemKind::Preventive => write!(f, "preventive"),
            ItemKind::Verification => write!(f, "verification"),
        }
    }
}

impl std::str::FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "root_cause" | "rca" => Ok(ItemKind::RootCause),
            "corrective" => Ok(ItemKind::Corrective),
            "preventive" => Ok(ItemKind::Preventive),
            "verification" => Ok(ItemKind::Verification),
            _ => Err(format!(
                "Invalid action item kind: {}. Use root_cause, corrective, preventive, or verification",
                s
            )),
        }
    }
}

/// Progress of a single action item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Delayed,
    Cancelled,
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::NotStarted => write!(f, "not_started"),
            ItemStatus::InProgress => write!(f, "in_progress"),
            ItemStatus::Completed => write!(f, "completed"),
            ItemStatus::Delayed => write!(f, "delayed"),
            ItemStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "not_started" | "open" => Ok(ItemStatus::NotStarted),
            "in_progress" => Ok(ItemStatus::InProgress),
            "completed" | "done" => Ok(ItemStatus::Completed),
            "delayed" => Ok(ItemStatus::Delayed),
            "cancelled" => Ok(ItemStatus::Cancelled),
            _ => Err(format!(
                "Invalid action item status: {}. Use not_started, in_progress, completed, delayed, or cancelled",
                s
            )),
        }
    }
}

/// One planned task within a CAPA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionItem {
    pub sequence: u32,

    pub description: String,

    #[serde(default)]
    pub kind: ItemKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub status: ItemStatus,

    /// Set when the item reaches `completed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl ActionItem {
    pub fn new(description: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            sequence: 0,
            description: description.into(),
            kind,
            owner: None,
            due_date: None,
            status: ItemStatus::NotStarted,
            completed: None,
            evidence: None,
        }
    }

    /// Move to `status`; completed and cancelled items are final
    pub fn set_status(
        &mut self,
        status: ItemStatus,
        actor: &str,
        now: DateTime<Utc>,
        evidence: Option<String>,
    ) -> Result<(), WorkflowError> {
        if matches!(self.status, ItemStatus::Completed | ItemStatus::Cancelled) {
            return Err(WorkflowError::WrongStatus {
                family: "action item",
                expected: "not_started, in_progress or delayed".to_string(),
                current: self.status.to_string(),
            });
        }
        self.status = status;
        if status == ItemStatus::Completed {
            self.completed = Some(Signoff::new(actor, now));
        }
        if evidence.is_some() {
            self.evidence = evidence;
        }
        Ok(())
    }
}

/// Completed share of the live (non-cancelled) action items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ItemProgress {
    pub total: u32,
    pub completed: u32,
    /// Whole percent, 0 when there are no live items
    pub percent: u32,
}

/// A review of whether the implemented actions stopped recurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EffectivenessReview {
    pub reviewed: Signoff,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<String>,

    /// The problem was seen again during the review window
    #[serde(default)]
    pub recurrence: bool,

    pub effective: bool,

    #[serde(default)]
    pub further_action_required: bool,

    pub conclusion: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_review: Option<NaiveDate>,
}

impl EffectivenessReview {
    pub fn new(effective: bool, conclusion: impl Into<String>, actor: &str, now: DateTime<Utc>) -> Self {
        Self {
            reviewed: Signoff::new(actor, now),
            criteria: Vec::new(),
            recurrence: false,
            effective,
            further_action_required: false,
            conclusion: conclusion.into(),
            next_review: None,
        }
    }
}

/// Statuses in which effectiveness reviews are accepted
pub const REVIEWABLE: &[ActionStatus] = &[
    ActionStatus::Implemented,
    ActionStatus::PendingVerification,
    ActionStatus::Verified,
];

/// A CAPA entity - combined Corrective and Preventive Action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Capa {
    /// Unique identifier
    pub id: EntityId,

    /// Business number (e.g., "CAPA-2025-001")
    pub capa_number: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub capa_type: CapaType,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub source: ActionSource,

    /// Originating NCR, non-conformance or finding
    #[serde(default, skip_serializing_if = "BackRef::is_empty")]
    pub source_ref: BackRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_statement: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_plan: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effectiveness_criteria: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub status: ActionStatus,

    #[serde(default)]
    pub progress: ActionProgress,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_items: Vec<ActionItem>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effectiveness_reviews: Vec<EffectivenessReview>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    pub created: DateTime<Utc>,

    pub author: String,

    #[serde(default = "default_revision")]
    pub entity_revision: u32,
}

impl Entity for Capa {
    const PREFIX: EntityPrefix = EntityPrefix::Capa;
    const LOCKED_FIELDS: &'static [&'static str] = &[
        "capa_number",
        "progress",
        "action_items",
        "effectiveness_reviews",
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
        Some(self.capa_number.clone())
    }

    fn references(&self) -> Vec<(&'static str, String)> {
        source_reference(&self.source_ref).into_iter().collect()
    }

    fn bump_revision(&mut self) {
        self.entity_revision += 1;
    }
}

impl Lifecycle for Capa {
    type State = ActionStatus;

    fn machine() -> &'static StateMachine<ActionStatus> {
        &CAPA_WORKFLOW
    }

    fn state(&self) -> ActionStatus {
        self.status
    }

    fn set_state(&mut self, state: ActionStatus) {
        self.status = state;
    }
}

impl ActionRecord for Capa {
    fn progress(&self) -> &ActionProgress {
        &self.progress
    }

    fn progress_mut(&mut self) -> &mut ActionProgress {
        &mut self.progress
    }
}

impl Capa {
    /// Create a new CAPA in `draft` status
    pub fn new(
        capa_number: impl Into<String>,
        title: impl Into<String>,
        capa_type: CapaType,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Capa),
            capa_number: capa_number.into(),
            title: title.into(),
            description: None,
            capa_type,
            priority: Priority::default(),
            source: ActionSource::default(),
            source_ref: BackRef::default(),
            problem_statement: None,
            root_cause: None,
            action_plan: None,
            effectiveness_criteria: None,
            owner: None,
            due_date: None,
            status: ActionStatus::default(),
            progress: ActionProgress::default(),
            action_items: Vec::new(),
            effectiveness_reviews: Vec::new(),
            tags: Vec::new(),
            created: Utc::now(),
            author: author.into(),
            entity_revision: 1,
        }
    }

    /// Record the NCR, non-conformance or finding this CAPA answers
    pub fn with_source(mut self, id: Option<EntityId>, number: Option<String>) -> Self {
        link_source(&self.id, &mut self.source, &mut self.source_ref, id, number);
        self
    }

    /// Append an action item, numbering it after the existing ones
    pub fn add_item(&mut self, mut item: ActionItem) -> &ActionItem {
        item.sequence = self.action_items.iter().map(|i| i.sequence).max().unwrap_or(0) + 1;
        self.action_items.push(item);
        &self.action_items[self.action_items.len() - 1]
    }

    pub fn item_mut(&mut self, sequence: u32) -> Option<&mut ActionItem> {
        self.action_items.iter_mut().find(|i| i.sequence == sequence)
    }

    pub fn item_progress(&self) -> ItemProgress {
        let live: Vec<&ActionItem> = self
            .action_items
            .iter()
            .filter(|i| i.status != ItemStatus::Cancelled)
            .collect();
        let total = live.len() as u32;
        let completed = live
            .iter()
            .filter(|i| i.status == ItemStatus::Completed)
            .count() as u32;
        let percent = if total == 0 {
            0
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u32
        };
        ItemProgress {
            total,
            completed,
            percent,
        }
    }

    /// Record an effectiveness review once the actions are in place
    ///
    /// Reviews are evidence only; `verify` remains the transition that
    /// settles effectiveness.
    pub fn add_review(&mut self, review: EffectivenessReview) -> Result<(), WorkflowError> {
        if !REVIEWABLE.contains(&self.status) {
            return Err(WorkflowError::WrongStatus {
                family: CAPA_WORKFLOW.family(),
                expected: "implemented, pending_verification or verified".to_string(),
                current: self.status.to_string(),
            });
        }
        self.effectiveness_reviews.push(review);
        Ok(())
    }

    /// Outcome of the most recent effectiveness review
    pub fn latest_review(&self) -> Option<&EffectivenessReview> {
        self.effectiveness_reviews.iter().max_by_key(|r| r.reviewed.at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::workflow::WorkflowError;

    fn capa() -> Capa {
        Capa::new("CAPA-2025-001", "Recurring bore defects", CapaType::Corrective, "test")
    }

    #[test]
    fn test_capa_full_sequence() {
        let mut capa = capa();
        let now = Utc::now();

        capa.submit("alice", now).unwrap();
        capa.approve("qa-lead", now, None).unwrap();
        capa.implement("alice", now).unwrap();
        capa.verify("auditor", now, true, None).unwrap();
        capa.close("qa-lead", now, Some("effective".to_string())).unwrap();

        assert_eq!(capa.status, ActionStatus::Closed);
        assert!(capa.progress.is_implemented.is_set());
        assert!(capa.progress.is_verified.is_set());
        assert!(capa.progress.is_effective.is_set());
        assert_eq!(capa.progress.approved.as_ref().unwrap().by, "qa-lead");
        assert_eq!(capa.progress.closure_notes.as_deref(), Some("effective"));
    }

    #[test]
    fn test_close_from_draft_fails() {
        let mut capa = capa();
        let before = capa.progress.clone();
        let err = capa.close("qa-lead", Utc::now(), None).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        assert_eq!(capa.status, ActionStatus::Draft);
        assert_eq!(capa.progress, before);
    }

    #[test]
    fn test_approve_requires_submitted() {
        let mut capa = capa();
        assert!(capa.approve("qa-lead", Utc::now(), None).is_err());
        assert!(capa.progress.approved.is_none());
    }

    #[test]
    fn test_ineffective_verification() {
        let mut capa = capa();
        let now = Utc::now();
        capa.submit("a", now).unwrap();
        capa.approve("b", now, None).unwrap();
        capa.implement("a", now).unwrap();
        capa.request_verification("a", now).unwrap();
        capa.verify("c", now, false, Some("defect recurred".to_string())).unwrap();

        assert!(capa.progress.is_verified.is_set());
        assert!(!capa.progress.is_effective.is_set());
        assert!(capa.progress.verification_requested.is_some());
    }

    #[test]
    fn test_reject_stores_reason() {
        let mut capa = capa();
        capa.submit("a", Utc::now()).unwrap();
        capa.reject("b", Utc::now(), "duplicate of CAPA-2025-000".to_string()).unwrap();
        assert_eq!(capa.status, ActionStatus::Rejected);
        assert!(capa.is_terminal());
        assert_eq!(
            capa.progress.rejection_reason.as_deref(),
            Some("duplicate of CAPA-2025-000")
        );
    }

    #[test]
    fn test_source_link_sets_kind() {
        let ncr = EntityId::new(EntityPrefix::Ncr);
        let capa = capa().with_source(Some(ncr.clone()), Some("NCR-2025-001".to_string()));
        assert_eq!(capa.source, ActionSource::Ncr);
        assert_eq!(capa.references(), vec![("ncr_id", ncr.to_string())]);
    }

    #[test]
    fn test_item_progress_ignores_cancelled() {
        let mut capa = capa();
        let now = Utc::now();
        assert_eq!(capa.item_progress().percent, 0);

        capa.add_item(ActionItem::new("5-why on bore defects", ItemKind::RootCause));
        capa.add_item(ActionItem::new("Replace locator pin", ItemKind::Corrective));
        let third = capa.add_item(ActionItem::new("Add pin to PM list", ItemKind::Preventive)).sequence;
        assert_eq!(third, 3);

        capa.item_mut(1).unwrap().set_status(ItemStatus::Completed, "a", now, None).unwrap();
        capa.item_mut(3).unwrap().set_status(ItemStatus::Cancelled, "a", now, None).unwrap();

        let progress = capa.item_progress();
        assert_eq!((progress.total, progress.completed, progress.percent), (2, 1, 50));
        assert!(capa.action_items[0].completed.is_some());
    }

    #[test]
    fn test_finished_items_are_final() {
        let mut item = ActionItem::new("Replace locator pin", ItemKind::Corrective);
        let now = Utc::now();
        item.set_status(ItemStatus::Completed, "a", now, Some("WO-881".to_string())).unwrap();
        assert!(item.set_status(ItemStatus::InProgress, "a", now, None).is_err());
        assert_eq!(item.evidence.as_deref(), Some("WO-881"));
    }

    #[test]
    fn test_reviews_only_after_implementation() {
        let mut capa = capa();
        let now = Utc::now();
        let review = EffectivenessReview::new(true, "no recurrence in 90 days", "qa", now);
        assert!(matches!(
            capa.add_review(review.clone()),
            Err(WorkflowError::WrongStatus { .. })
        ));

        capa.submit("a", now).unwrap();
        capa.approve("b", now, None).unwrap();
        capa.implement("a", now).unwrap();
        capa.add_review(review).unwrap();
        assert!(capa.latest_review().unwrap().effective);
        // A review does not move the CAPA
        assert_eq!(capa.status, ActionStatus::Implemented);
        assert!(!capa.progress.is_effective.is_set());
    }

    #[test]
    fn test_capa_roundtrip() {
        let mut capa = capa();
        capa.submit("alice", Utc::now()).unwrap();
        let yaml = serde_yml::to_string(&capa).unwrap();
        let parsed: Capa = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(parsed.status, ActionStatus::Submitted);
        assert_eq!(parsed.progress, capa.progress);
    }
}
