//! Corrective action entity type - standalone fix for an identified cause

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::{default_revision, Entity, Priority};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::links::BackRef;
use crate::core::workflow::{Lifecycle, State, StateMachine};
use crate::entities::action::{
    link_source, source_reference, ActionProgress, ActionRecord, ActionSource, ActionStatus,
    CORRECTIVE_WORKFLOW,
};

/// A corrective action, optionally split out of a CAPA
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrectiveAction {
    pub id: EntityId,

    /// Business number (e.g., "CA-2025-004")
    pub ca_number: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    /// Parent CAPA, if this action was split from one
    #[serde(default, skip_serializing_if = "BackRef::is_empty")]
    pub capa: BackRef,

    #[serde(default)]
    pub source: ActionSource,

    #[serde(default, skip_serializing_if = "BackRef::is_empty")]
    pub source_ref: BackRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_plan: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub status: ActionStatus,

    #[serde(default)]
    pub progress: ActionProgress,

    pub created: DateTime<Utc>,

    pub author: String,

    #[serde(default = "default_revision")]
    pub entity_revision: u32,
}

impl Entity for CorrectiveAction {
    const PREFIX: EntityPrefix = EntityPrefix::Ca;
    const LOCKED_FIELDS: &'static [&'static str] = &["ca_number", "progress"];

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
        Some(self.ca_number.clone())
    }

    fn references(&self) -> Vec<(&'static str, String)> {
        let mut refs: Vec<_> = source_reference(&self.source_ref).into_iter().collect();
        if let Some(id) = &self.capa.id {
            refs.push(("capa_id", id.to_string()));
        }
        refs
    }

    fn bump_revision(&mut self) {
        self.entity_revision += 1;
    }
}

impl Lifecycle for CorrectiveAction {
    type State = ActionStatus;

    fn machine() -> &'static StateMachine<ActionStatus> {
        &CORRECTIVE_WORKFLOW
    }

    fn state(&self) -> ActionStatus {
        self.status
    }

    fn set_state(&mut self, state: ActionStatus) {
        self.status = state;
    }
}

impl ActionRecord for CorrectiveAction {
    fn progress(&self) -> &ActionProgress {
        &self.progress
    }

    fn progress_mut(&mut self) -> &mut ActionProgress {
        &mut self.progress
    }
}

impl CorrectiveAction {
    pub fn new(
        ca_number: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Ca),
            ca_number: ca_number.into(),
            title: title.into(),
            description: None,
            priority: Priority::default(),
            capa: BackRef::default(),
            source: ActionSource::default(),
            source_ref: BackRef::default(),
            root_cause: None,
            action_plan: None,
            owner: None,
            due_date: None,
            status: ActionStatus::default(),
            progress: ActionProgress::default(),
            created: Utc::now(),
            author: author.into(),
            entity_revision: 1,
        }
    }

    pub fn with_source(mut self, id: Option<EntityId>, number: Option<String>) -> Self {
        link_source(&self.id, &mut self.source, &mut self.source_ref, id, number);
        self
    }

    pub fn with_capa(mut self, id: Option<EntityId>, number: Option<String>) -> Self {
        self.capa.annotate(id, number);
        self
    }
}
