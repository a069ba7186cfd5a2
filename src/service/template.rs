//! QC template parameters and versioning

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::core::entity::Entity;
use crate::core::error::{QualityError, QualityResult};
use crate::core::identity::EntityId;
use crate::core::patch::apply_patch;
use crate::core::store::RecordStore;
use crate::core::workflow::State;
use crate::entities::{Inspection, InspectionType, QcParameter, QcTemplate, TemplateStatus};
use crate::service::{QualityService, RecordFilter};

/// Counts across all QC templates
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemplateSummary {
    pub total: usize,
    pub active: usize,
    pub draft: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    /// Inspections seeded from any template
    pub usage: usize,
    /// Mean parameter count per template, 0 when there are none
    pub average_parameters: f64,
}

impl<S: RecordStore> QualityService<S> {
    /// Parameters of one template, in sequence order
    pub fn parameters(&self, template_id: &EntityId) -> QualityResult<Vec<QcParameter>> {
        self.list(&RecordFilter::new().with_ref("template_id", template_id))
    }

    /// Add a parameter to a draft template; a zero sequence goes last
    pub fn add_parameter(
        &mut self,
        template_id: &EntityId,
        mut parameter: QcParameter,
    ) -> QualityResult<QcParameter> {
        let template: QcTemplate = self.get(template_id)?;
        template.ensure_editable()?;

        parameter.template = template.id.clone();
        if parameter.sequence == 0 {
            parameter.sequence = self
                .parameters(template_id)?
                .iter()
                .map(|p| p.sequence)
                .max()
                .unwrap_or(0)
                + 1;
        }
        parameter.validate().map_err(QualityError::validation)?;
        self.store.persist(&parameter)?;
        tracing::info!(template = %template_id, parameter = %parameter.id, "parameter added");
        Ok(parameter)
    }

    fn parameter_with_parent(&self, parameter_id: &EntityId) -> QualityResult<QcParameter> {
        let parameter: QcParameter = self.get(parameter_id)?;
        let template: QcTemplate = self.get(&parameter.template)?;
        template.ensure_editable()?;
        Ok(parameter)
    }

    pub fn update_parameter(&mut self, parameter_id: &EntityId, patch: Value) -> QualityResult<QcParameter> {
        let parameter = self.parameter_with_parent(parameter_id)?;
        let updated = apply_patch(&parameter, patch)?;
        updated.validate().map_err(QualityError::validation)?;
        self.store.persist(&updated)?;
        tracing::info!(parameter = %parameter_id, "parameter updated");
        Ok(updated)
    }

    pub fn delete_parameter(&mut self, parameter_id: &EntityId) -> QualityResult<()> {
        self.parameter_with_parent(parameter_id)?;
        self.store.remove::<QcParameter>(parameter_id)?;
        tracing::info!(parameter = %parameter_id, "parameter deleted");
        Ok(())
    }

    /// Fork a draft at `version + 1`, copying parameters under fresh IDs
    ///
    /// The source template is left untouched. `Conflict` if the next
    /// version already exists.
    pub fn new_template_version(&mut self, template_id: &EntityId, actor: &str) -> QualityResult<QcTemplate> {
        let source: QcTemplate = self.get(template_id)?;
        let parameters = self.parameters(template_id)?;

        let fork = self.create(source.next_version(actor))?;
        for parameter in &parameters {
            self.store.persist(&parameter.copy_to(fork.id.clone(), actor))?;
        }
        tracing::info!(
            from = %template_id,
            to = %fork.id,
            version = fork.version,
            parameters = parameters.len(),
            "template version forked"
        );
        Ok(fork)
    }

    /// Delete a template that is not active, with its parameters
    pub fn delete_template(&mut self, template_id: &EntityId) -> QualityResult<()> {
        self.delete::<QcTemplate>(template_id)
    }

    /// Active templates offered for a new inspection of `inspection_type`
    pub fn active_templates(&self, inspection_type: InspectionType) -> QualityResult<Vec<QcTemplate>> {
        let filter = RecordFilter::new().status(TemplateStatus::Active.as_str());
        Ok(self
            .list::<QcTemplate>(&filter)?
            .into_iter()
            .filter(|t| t.inspection_type == inspection_type)
            .collect())
    }

    pub fn template_summary(&self) -> QualityResult<TemplateSummary> {
        let templates = self.store.fetch_all::<QcTemplate>()?;
        let parameters = self.store.count::<QcParameter>()?;
        let usage = self
            .store
            .fetch_all::<Inspection>()?
            .iter()
            .filter(|i| i.template.id.is_some())
            .count();

        let mut summary = TemplateSummary {
            total: templates.len(),
            usage,
            ..Default::default()
        };
        for template in &templates {
            match template.status {
                TemplateStatus::Active => summary.active += 1,
                TemplateStatus::Draft => summary.draft += 1,
                _ => {}
            }
            *summary
                .by_type
                .entry(template.inspection_type.to_string())
                .or_default() += 1;
            *summary
                .by_status
                .entry(template.status.as_str().to_string())
                .or_default() += 1;
        }
        if summary.total > 0 {
            let mean = parameters as f64 / summary.total as f64;
            summary.average_parameters = (mean * 100.0).round() / 100.0;
        }
        Ok(summary)
    }
}
