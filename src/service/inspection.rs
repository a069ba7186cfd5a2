//! Inspection results, lot quantities and statistics

use serde_json::Value;

use crate::core::aggregate::{InspectionStatistics, LotQuantities, Tally};
use crate::core::compliance::ResultStatus;
use crate::core::entity::{Entity, Severity};
use crate::core::error::{QualityError, QualityResult};
use crate::core::identity::EntityId;
use crate::core::patch::apply_patch;
use crate::core::store::RecordStore;
use crate::core::workflow::{Action, Lifecycle, State, WorkflowError};
use crate::entities::template::TEMPLATE_WORKFLOW;
use crate::entities::{Inspection, InspectionResult, QcParameter, QcTemplate, TemplateStatus};
use crate::service::{QualityService, RecordFilter};

/// Edit to a result's measured value
#[derive(Debug, Clone, Default)]
pub struct Measurement {
    pub numeric_value: Option<f64>,
    pub text_value: Option<String>,
    /// Inspector's verdict for textual results
    pub manual_status: Option<ResultStatus>,
}

impl<S: RecordStore> QualityService<S> {
    /// Results of one inspection, in sequence order
    pub fn results(&self, inspection_id: &EntityId) -> QualityResult<Vec<InspectionResult>> {
        self.list(&RecordFilter::new().with_ref("inspection_id", inspection_id))
    }

    fn live_tally(&self, inspection_id: &EntityId) -> QualityResult<Tally> {
        Ok(Tally::from_statuses(
            self.results(inspection_id)?.iter().map(|r| r.status),
        ))
    }

    /// Save the inspection after one of its results changed
    fn settle_inspection(
        &mut self,
        mut inspection: Inspection,
        removed: Option<Severity>,
        added: Option<Severity>,
    ) -> QualityResult<Inspection> {
        inspection.adjust_defects(removed, added);
        let tally = self.live_tally(&inspection.id)?;
        inspection.refresh_tally(tally);
        inspection.bump_revision();
        self.store.persist(&inspection)?;
        Ok(inspection)
    }

    /// Attach a result to an inspection that is still collecting results
    ///
    /// A zero sequence is replaced with the next free position.
    pub fn add_result(
        &mut self,
        inspection_id: &EntityId,
        mut result: InspectionResult,
    ) -> QualityResult<InspectionResult> {
        let inspection: Inspection = self.get(inspection_id)?;
        inspection.ensure_accepts_results()?;

        result.inspection = inspection.id.clone();
        if result.sequence == 0 {
            result.sequence = self.next_result_sequence(inspection_id)?;
        }
        result.evaluate();
        result.validate().map_err(QualityError::validation)?;

        self.store.persist(&result)?;
        let added = result.defect();
        self.settle_inspection(inspection, None, added)?;
        tracing::info!(
            inspection = %inspection_id,
            result = %result.id,
            status = %result.status,
            "result added"
        );
        Ok(result)
    }

    fn next_result_sequence(&self, inspection_id: &EntityId) -> QualityResult<u32> {
        Ok(self
            .results(inspection_id)?
            .iter()
            .map(|r| r.sequence)
            .max()
            .unwrap_or(0)
            + 1)
    }

    fn result_with_parent(&self, result_id: &EntityId) -> QualityResult<(InspectionResult, Inspection)> {
        let result: InspectionResult = self.get(result_id)?;
        let inspection: Inspection = self.get(&result.inspection)?;
        inspection.ensure_accepts_results()?;
        Ok((result, inspection))
    }

    /// Record a new measured value and re-evaluate it
    pub fn update_result_value(
        &mut self,
        result_id: &EntityId,
        actor: &str,
        measurement: Measurement,
    ) -> QualityResult<InspectionResult> {
        let (mut result, inspection) = self.result_with_parent(result_id)?;
        let before = result.defect();

        result.record(
            actor,
            self.now(),
            measurement.numeric_value,
            measurement.text_value,
            measurement.manual_status,
        );
        result.validate().map_err(QualityError::validation)?;
        result.bump_revision();
        self.store.persist(&result)?;
        self.settle_inspection(inspection, before, result.defect())?;
        tracing::info!(result = %result_id, status = %result.status, "result re-evaluated");
        Ok(result)
    }

    /// Patch a result's content (limits, name, remarks) and re-evaluate it
    pub fn update_result(&mut self, result_id: &EntityId, patch: Value) -> QualityResult<InspectionResult> {
        let (result, inspection) = self.result_with_parent(result_id)?;
        let before = result.defect();

        let mut updated = apply_patch(&result, patch)?;
        updated.evaluate();
        updated.validate().map_err(QualityError::validation)?;
        self.store.persist(&updated)?;
        self.settle_inspection(inspection, before, updated.defect())?;
        Ok(updated)
    }

    pub fn delete_result(&mut self, result_id: &EntityId) -> QualityResult<()> {
        let (result, inspection) = self.result_with_parent(result_id)?;
        self.store.remove::<InspectionResult>(result_id)?;
        self.settle_inspection(inspection, result.defect(), None)?;
        tracing::info!(result = %result_id, "result deleted");
        Ok(())
    }

    /// Create one pending result per template parameter
    ///
    /// The template must be active. Sequences continue after any results
    /// already on the inspection.
    pub fn seed_results_from_template(
        &mut self,
        inspection_id: &EntityId,
        template_id: &EntityId,
        actor: &str,
    ) -> QualityResult<Vec<InspectionResult>> {
        let mut inspection: Inspection = self.get(inspection_id)?;
        inspection.ensure_accepts_results()?;
        let template: QcTemplate = self.get(template_id)?;
        if template.status != TemplateStatus::Active {
            return Err(WorkflowError::WrongStatus {
                family: TEMPLATE_WORKFLOW.family(),
                expected: TemplateStatus::Active.to_string(),
                current: template.status.to_string(),
            }
            .into());
        }

        let parameters: Vec<QcParameter> = self.parameters(template_id)?;
        let offset = self.next_result_sequence(inspection_id)? - 1;
        let mut seeded = Vec::with_capacity(parameters.len());
        for (position, parameter) in parameters.iter().enumerate() {
            let mut result = InspectionResult::from_parameter(inspection.id.clone(), parameter, actor);
            result.sequence = offset + position as u32 + 1;
            self.store.persist(&result)?;
            seeded.push(result);
        }

        inspection.template.annotate(
            Some(template.id.clone()),
            template.business_number(),
        );
        self.settle_inspection(inspection, None, None)?;
        tracing::info!(
            inspection = %inspection_id,
            template = %template_id,
            count = seeded.len(),
            "results seeded from template"
        );
        Ok(seeded)
    }

    /// Record lot dispositions on a non-terminal inspection
    pub fn record_quantities(
        &mut self,
        inspection_id: &EntityId,
        quantities: LotQuantities,
    ) -> QualityResult<Inspection> {
        let mut inspection: Inspection = self.get(inspection_id)?;
        if inspection.is_terminal() {
            return Err(WorkflowError::Locked {
                family: Inspection::machine().family(),
                status: inspection.state().as_str().to_string(),
            }
            .into());
        }
        inspection
            .record_quantities(quantities)
            .map_err(QualityError::validation)?;
        inspection.bump_revision();
        self.store.persist(&inspection)?;
        Ok(inspection)
    }

    /// Finish an inspection, freezing the tally over its current results
    pub fn submit_inspection(&mut self, inspection_id: &EntityId, actor: &str) -> QualityResult<Inspection> {
        let tally = self.live_tally(inspection_id)?;
        self.transition::<Inspection, _>(inspection_id, Action::Submit, |insp, now| {
            insp.submit(actor, now, tally)
        })
    }

    pub fn statistics(&self, inspection_id: &EntityId) -> QualityResult<InspectionStatistics> {
        let inspection: Inspection = self.get(inspection_id)?;
        let tally = self.live_tally(inspection_id)?;
        Ok(inspection.statistics(&tally))
    }

    /// Delete an inspection and its results
    pub fn delete_inspection(&mut self, inspection_id: &EntityId) -> QualityResult<()> {
        self.delete::<Inspection>(inspection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregate::OverallResult;
    use crate::core::sequence::MemorySequence;
    use crate::core::store::MemoryStore;
    use crate::entities::{InspectionStatus, InspectionType};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn service() -> QualityService<MemoryStore> {
        QualityService::new(MemoryStore::new(), Box::new(MemorySequence::new()))
    }

    fn inspection(svc: &mut QualityService<MemoryStore>) -> Inspection {
        svc.create(Inspection::new("INSP-001", "Lot 7", InspectionType::Incoming, "t"))
            .unwrap()
    }

    fn limited(id: &EntityId, name: &str, lsl: f64, usl: f64) -> InspectionResult {
        let mut r = InspectionResult::new(id.clone(), 0, name, "t");
        r.lower_limit = Some(lsl);
        r.upper_limit = Some(usl);
        r
    }

    fn measure(value: f64) -> Measurement {
        Measurement {
            numeric_value: Some(value),
            ..Default::default()
        }
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        let mut svc = service();
        let insp = inspection(&mut svc);

        let mut nan = limited(&insp.id, "a", 10.0, 20.0);
        nan.numeric_value = Some(f64::NAN);
        assert!(matches!(
            svc.add_result(&insp.id, nan),
            Err(QualityError::Validation { .. })
        ));
        assert_eq!(svc.results(&insp.id).unwrap().len(), 0);

        let a = svc.add_result(&insp.id, limited(&insp.id, "a", 10.0, 20.0)).unwrap();
        svc.update_result_value(&a.id, "qa", measure(15.0)).unwrap();
        assert!(matches!(
            svc.update_result_value(&a.id, "qa", measure(f64::NAN)),
            Err(QualityError::Validation { .. })
        ));

        let stored: InspectionResult = svc.get(&a.id).unwrap();
        assert_eq!(stored.numeric_value, Some(15.0));
        assert_eq!(stored.status, ResultStatus::Pass);
    }

    #[test]
    fn test_results_drive_tally_and_defects() {
        let mut svc = service();
        let insp = inspection(&mut svc);
        let a = svc.add_result(&insp.id, limited(&insp.id, "a", 10.0, 20.0)).unwrap();
        let mut major = limited(&insp.id, "b", 10.0, 20.0);
        major.severity = Some(Severity::Major);
        let b = svc.add_result(&insp.id, major).unwrap();
        assert_eq!((a.sequence, b.sequence), (1, 2));

        svc.update_result_value(&a.id, "i", measure(10.0)).unwrap();
        let failed = svc.update_result_value(&b.id, "i", measure(5.0)).unwrap();
        assert_eq!(failed.status, ResultStatus::Fail);

        let stats = svc.statistics(&insp.id).unwrap();
        assert_eq!(stats.parameters_checked, 2);
        assert_eq!(stats.parameters_passed, 1);
        assert_eq!(stats.pass_rate, 50.0);
        assert_eq!(stats.major_defects, 1);

        // Bringing the value back into spec retracts the defect
        svc.update_result_value(&b.id, "i", measure(15.0)).unwrap();
        let stats = svc.statistics(&insp.id).unwrap();
        assert_eq!(stats.major_defects, 0);
        assert_eq!(stats.parameters_failed, 0);
    }

    #[test]
    fn test_limit_patch_re_evaluates() {
        let mut svc = service();
        let insp = inspection(&mut svc);
        let r = svc.add_result(&insp.id, limited(&insp.id, "a", 10.0, 20.0)).unwrap();
        svc.update_result_value(&r.id, "i", measure(21.0)).unwrap();

        let patched = svc
            .update_result(&r.id, serde_json::json!({"upper_limit": 25.0}))
            .unwrap();
        assert_eq!(patched.status, ResultStatus::Pass);
        let stored: Inspection = svc.get(&insp.id).unwrap();
        assert_eq!(stored.defects.total(), 0);
    }

    #[test]
    fn test_results_frozen_after_submit() {
        let mut svc = service();
        let insp = inspection(&mut svc);
        let r = svc.add_result(&insp.id, limited(&insp.id, "a", 0.0, 1.0)).unwrap();
        svc.transition::<Inspection, _>(&insp.id, Action::Start, |i, now| i.start("i", now))
            .unwrap();
        svc.submit_inspection(&insp.id, "i").unwrap();

        let err = svc.update_result_value(&r.id, "i", measure(0.5)).unwrap_err();
        assert!(err.is_precondition());
        assert!(svc.delete_result(&r.id).is_err());
        assert!(svc
            .add_result(&insp.id, limited(&insp.id, "b", 0.0, 1.0))
            .is_err());
    }

    fn fixed_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    fn fixed_end() -> DateTime<Utc> {
        fixed_start() + Duration::seconds(45 * 60 + 59)
    }

    #[test]
    fn test_submit_freezes_result_and_duration() {
        let mut svc = service().with_clock(fixed_start);
        let insp = inspection(&mut svc);
        let r = svc.add_result(&insp.id, limited(&insp.id, "a", 0.0, 1.0)).unwrap();
        svc.update_result_value(&r.id, "i", measure(0.5)).unwrap();
        svc.transition::<Inspection, _>(&insp.id, Action::Start, |i, now| i.start("i", now))
            .unwrap();

        let mut svc = svc.with_clock(fixed_end);
        let done = svc.submit_inspection(&insp.id, "i").unwrap();
        assert_eq!(done.status, InspectionStatus::Completed);
        assert_eq!(done.duration_minutes, Some(45));
        assert_eq!(done.overall_result, OverallResult::Pass);
        assert_eq!(done.tally.checked, 1);
    }

    #[test]
    fn test_quantities_invariant() {
        let mut svc = service();
        let insp = inspection(&mut svc);
        let too_many = LotQuantities {
            lot_quantity: Some(50),
            accepted: 40,
            scrap: 11,
            ..Default::default()
        };
        assert!(matches!(
            svc.record_quantities(&insp.id, too_many),
            Err(QualityError::Validation { .. })
        ));

        let ok = LotQuantities {
            lot_quantity: Some(50),
            accepted: 45,
            rework: 5,
            ..Default::default()
        };
        let saved = svc.record_quantities(&insp.id, ok).unwrap();
        assert_eq!(saved.quantities.accepted, 45);
        assert_eq!(svc.statistics(&insp.id).unwrap().acceptance_rate, Some(90.0));
    }

    #[test]
    fn test_seed_requires_active_template() {
        let mut svc = service();
        let insp = inspection(&mut svc);
        let template = svc.create(QcTemplate::new("T-1", "Check", "t")).unwrap();
        let mut p = QcParameter::new(template.id.clone(), 0, "Length", "t");
        p.lower_limit = Some(1.0);
        svc.add_parameter(&template.id, p).unwrap();
        svc.add_parameter(&template.id, QcParameter::new(template.id.clone(), 0, "Width", "t"))
            .unwrap();

        let err = svc
            .seed_results_from_template(&insp.id, &template.id, "i")
            .unwrap_err();
        assert!(err.is_precondition());

        svc.transition::<QcTemplate, _>(&template.id, Action::Activate, |t, now| t.activate("qa", now))
            .unwrap();
        let seeded = svc
            .seed_results_from_template(&insp.id, &template.id, "i")
            .unwrap();
        assert_eq!(seeded.len(), 2);
        assert_eq!(seeded[0].parameter_name, "Length");
        assert_eq!(seeded[0].lower_limit, Some(1.0));

        let stored: Inspection = svc.get(&insp.id).unwrap();
        assert_eq!(stored.template.id.as_ref(), Some(&template.id));
        assert_eq!(svc.statistics(&insp.id).unwrap().parameters_pending, 2);
    }

    #[test]
    fn test_delete_inspection_cascades() {
        let mut svc = service();
        let insp = inspection(&mut svc);
        svc.add_result(&insp.id, limited(&insp.id, "a", 0.0, 1.0)).unwrap();
        svc.add_result(&insp.id, limited(&insp.id, "b", 0.0, 1.0)).unwrap();

        svc.delete_inspection(&insp.id).unwrap();
        assert_eq!(svc.store().count::<InspectionResult>().unwrap(), 0);
        assert_eq!(svc.store().count::<Inspection>().unwrap(), 0);
    }
}
