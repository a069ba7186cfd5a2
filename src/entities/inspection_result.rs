//! Inspection result entity type - one measured parameter of an inspection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::aggregate::defect_contribution;
use crate::core::compliance::{deviation, ensure_finite, resolve, ResultStatus};
use crate::core::entity::{default_revision, Entity, ListOrder, Severity, Signoff};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::links::BackRef;
use crate::entities::parameter::QcParameter;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InspectionResult {
    pub id: EntityId,

    /// Owning inspection
    pub inspection: EntityId,

    /// Position within the inspection
    #[serde(default)]
    pub sequence: u32,

    /// QC parameter this result measures, when seeded from a template
    #[serde(default, skip_serializing_if = "BackRef::is_empty")]
    pub parameter: BackRef,

    pub parameter_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_limit: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_limit: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_value: Option<String>,

    /// Status given by the inspector for textual results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_status: Option<ResultStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_within_spec: Option<bool>,

    #[serde(default)]
    pub status: ResultStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviation: Option<f64>,

    /// Defect severity when this result fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured: Option<Signoff>,

    pub created: DateTime<Utc>,

    pub author: String,

    #[serde(default = "default_revision")]
    pub entity_revision: u32,
}

impl Entity for InspectionResult {
    const PREFIX: EntityPrefix = EntityPrefix::Ires;
    const ORDER: ListOrder = ListOrder::SequenceAscending;
    const LOCKED_FIELDS: &'static [&'static str] =
        &["inspection", "is_within_spec", "deviation", "measured"];

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn title(&self) -> &str {
        &self.parameter_name
    }

    fn status(&self) -> &str {
        match self.status {
            ResultStatus::Pass => "pass",
            ResultStatus::Fail => "fail",
            ResultStatus::Warning => "warning",
            ResultStatus::NotApplicable => "not_applicable",
            ResultStatus::Pending => "pending",
        }
    }

    fn created(&self) -> DateTime<Utc> {
        self.created
    }

    fn author(&self) -> &str {
        &self.author
    }

    fn references(&self) -> Vec<(&'static str, String)> {
        let mut refs = vec![("inspection_id", self.inspection.to_string())];
        if let Some(id) = &self.parameter.id {
            refs.push(("parameter_id", id.to_string()));
        }
        refs
    }

    fn sequence(&self) -> u32 {
        self.sequence
    }

    fn validate(&self) -> Result<(), String> {
        ensure_finite("numeric_value", self.numeric_value)?;
        ensure_finite("target", self.target)?;
        ensure_finite("lower_limit", self.lower_limit)?;
        ensure_finite("upper_limit", self.upper_limit)?;
        self.validate_limits()
    }

    fn bump_revision(&mut self) {
        self.entity_revision += 1;
    }
}

impl InspectionResult {
    pub fn new(
        inspection: EntityId,
        sequence: u32,
        parameter_name: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Ires),
            inspection,
            sequence,
            parameter: BackRef::default(),
            parameter_name: parameter_name.into(),
            unit: None,
            target: None,
            lower_limit: None,
            upper_limit: None,
            numeric_value: None,
            text_value: None,
            manual_status: None,
            is_within_spec: None,
            status: ResultStatus::Pending,
            deviation: None,
            severity: None,
            remarks: None,
            measured: None,
            created: Utc::now(),
            author: author.into(),
            entity_revision: 1,
        }
    }

    /// Pending result pre-filled with a parameter's limits
    pub fn from_parameter(inspection: EntityId, parameter: &QcParameter, author: impl Into<String>) -> Self {
        let mut result = Self::new(inspection, parameter.sequence, &parameter.name, author);
        result.parameter = BackRef::new(Some(parameter.id.clone()), Some(parameter.name.clone()));
        result.unit = parameter.unit.clone();
        result.target = parameter.target;
        result.lower_limit = parameter.lower_limit;
        result.upper_limit = parameter.upper_limit;
        result.severity = Some(parameter.criticality);
        result
    }

    /// Recompute verdict and deviation from the current value and limits
    pub fn evaluate(&mut self) {
        let verdict = resolve(
            self.numeric_value,
            self.lower_limit,
            self.upper_limit,
            self.manual_status,
        );
        self.is_within_spec = verdict.within_spec;
        self.status = verdict.status;
        self.deviation = self
            .numeric_value
            .and_then(|value| deviation(value, self.target));
    }

    /// Record a measurement and re-evaluate
    pub fn record(
        &mut self,
        actor: &str,
        now: DateTime<Utc>,
        numeric_value: Option<f64>,
        text_value: Option<String>,
        manual_status: Option<ResultStatus>,
    ) {
        self.numeric_value = numeric_value;
        self.text_value = text_value;
        self.manual_status = manual_status;
        self.evaluate();
        self.measured = Some(Signoff::new(actor, now));
    }

    /// Defect this result currently contributes to its inspection
    pub fn defect(&self) -> Option<Severity> {
        defect_contribution(self.status, self.severity)
    }

    pub fn validate_limits(&self) -> Result<(), String> {
        match (self.lower_limit, self.upper_limit) {
            (Some(lsl), Some(usl)) if lsl > usl => Err(format!(
                "lower limit {} is above upper limit {}",
                lsl, usl
            )),
            _ => Ok(()),
        }
    }
}
