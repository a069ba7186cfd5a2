//! NCR entity type - Non-Conformance Reports (simple three-state variant)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::{default_revision, Entity, Latch, Severity, Signoff};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::links::BackRef;
use crate::core::workflow::{advance, Action, Lifecycle, Rule, State, StateMachine, WorkflowError};

/// NCR category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NcrCategory {
    Material,
    #[default]
    Process,
    Equipment,
    HumanError,
    Design,
    Supplier,
    CustomerComplaint,
    Documentation,
    Other,
}

impl std::fmt::Display for NcrCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NcrCategory::Material => write!(f, "material"),
            NcrCategory::Process => write!(f, "process"),
            NcrCategory::Equipment => write!(f, "equipment"),
            NcrCategory::HumanError => write!(f, "human_error"),
            NcrCategory::Design => write!(f, "design"),
            NcrCategory::Supplier => write!(f, "supplier"),
            NcrCategory::CustomerComplaint => write!(f, "customer_complaint"),
            NcrCategory::Documentation => write!(f, "documentation"),
            NcrCategory::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for NcrCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "material" => Ok(NcrCategory::Material),
            "process" => Ok(NcrCategory::Process),
            "equipment" => Ok(NcrCategory::Equipment),
            "human_error" => Ok(NcrCategory::HumanError),
            "design" => Ok(NcrCategory::Design),
            "supplier" => Ok(NcrCategory::Supplier),
            "customer_complaint" => Ok(NcrCategory::CustomerComplaint),
            "documentation" => Ok(NcrCategory::Documentation),
            "other" => Ok(NcrCategory::Other),
            _ => Err(format!(
                "Invalid NCR category: {}. Use material, process, equipment, human_error, design, supplier, customer_complaint, documentation, or other",
                s
            )),
        }
    }
}

/// NCR workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NcrStatus {
    #[default]
    Open,
    InProgress,
    Closed,
}

impl State for NcrStatus {
    fn as_str(&self) -> &'static str {
        match self {
            NcrStatus::Open => "open",
            NcrStatus::InProgress => "in_progress",
            NcrStatus::Closed => "closed",
        }
    }
}

impl std::fmt::Display for NcrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NcrStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NCR_WORKFLOW.parse(s)
    }
}

pub static NCR_WORKFLOW: StateMachine<NcrStatus> = StateMachine::new(
    "NCR",
    NcrStatus::Open,
    &[
        Rule::on(Action::Start, &[NcrStatus::Open], NcrStatus::InProgress),
        Rule::on(Action::Close, &[NcrStatus::InProgress], NcrStatus::Closed),
    ],
);

/// A Non-Conformance Report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Ncr {
    /// Unique identifier
    pub id: EntityId,

    /// Business number (e.g., "NCR-2025-003"); generated when left empty
    #[serde(default)]
    pub ncr_number: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub category: NcrCategory,

    /// Where the deviation was detected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_affected: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disposition: Option<String>,

    /// Inspection that raised this NCR
    #[serde(default, skip_serializing_if = "BackRef::is_empty")]
    pub source_inspection: BackRef,

    /// Set once a CAPA is called for
    #[serde(default)]
    pub requires_capa: Latch,

    #[serde(default, skip_serializing_if = "BackRef::is_empty")]
    pub capa: BackRef,

    #[serde(default)]
    pub status: NcrStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed: Option<Signoff>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    pub created: DateTime<Utc>,

    pub author: String,

    #[serde(default = "default_revision")]
    pub entity_revision: u32,
}

impl Entity for Ncr {
    const PREFIX: EntityPrefix = EntityPrefix::Ncr;
    const LOCKED_FIELDS: &'static [&'static str] =
        &["ncr_number", "requires_capa", "capa", "started", "closed"];

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
        (!self.ncr_number.is_empty()).then(|| self.ncr_number.clone())
    }

    fn references(&self) -> Vec<(&'static str, String)> {
        let mut refs = Vec::new();
        if let Some(id) = &self.capa.id {
            refs.push(("capa_id", id.to_string()));
        }
        if let Some(id) = &self.source_inspection.id {
            refs.push(("inspection_id", id.to_string()));
        }
        refs
    }

    fn bump_revision(&mut self) {
        self.entity_revision += 1;
    }
}

impl Lifecycle for Ncr {
    type State = NcrStatus;

    fn machine() -> &'static StateMachine<NcrStatus> {
        &NCR_WORKFLOW
    }

    fn state(&self) -> NcrStatus {
        self.status
    }

    fn set_state(&mut self, state: NcrStatus) {
        self.status = state;
    }
}

impl Ncr {
    /// Create a new NCR in `open` status; the number is assigned on save
    pub fn new(title: impl Into<String>, severity: Severity, author: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Ncr),
            ncr_number: String::new(),
            title: title.into(),
            description: None,
            severity,
            category: NcrCategory::default(),
            detected_at: None,
            part_number: None,
            lot_number: None,
            quantity_affected: None,
            root_cause: None,
            disposition: None,
            source_inspection: BackRef::default(),
            requires_capa: Latch::default(),
            capa: BackRef::default(),
            status: NcrStatus::default(),
            started: None,
            closed: None,
            tags: Vec::new(),
            created: Utc::now(),
            author: author.into(),
            entity_revision: 1,
        }
    }

    pub fn start(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        advance(self, Action::Start)?;
        self.started = Some(Signoff::new(actor, now));
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

    /// Record that a CAPA is required and, optionally, which one
    pub fn link_capa(
        &mut self,
        capa_id: Option<EntityId>,
        capa_number: Option<String>,
    ) -> Result<(), WorkflowError> {
        if self.is_terminal() {
            return Err(WorkflowError::Locked {
                family: NCR_WORKFLOW.family(),
                status: self.status.to_string(),
            });
        }
        self.requires_capa.raise();
        self.capa.annotate(capa_id, capa_number);
        Ok(())
    }

    /// Days from creation to closure
    pub fn resolution_days(&self) -> Option<f64> {
        self.closed
            .as_ref()
            .map(|c| (c.at - self.created).num_seconds() as f64 / 86_400.0)
    }
}
