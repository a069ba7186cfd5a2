//! Cross-reference annotations between records
//!
//! These only set informational fields on the source record. The target is
//! neither created nor looked up.

use crate::core::entity::Entity;
use crate::core::error::QualityResult;
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::links::{log_annotation, BackRef};
use crate::core::store::RecordStore;
use crate::core::workflow::{Action, WorkflowError};
use crate::entities::{AuditFinding, Inspection, Ncr, NonConformance};
use crate::service::QualityService;

impl<S: RecordStore> QualityService<S> {
    fn annotate<R, F>(
        &mut self,
        id: &EntityId,
        field: &str,
        target: BackRef,
        expected: EntityPrefix,
        apply: F,
    ) -> QualityResult<R>
    where
        R: Entity,
        F: FnOnce(&mut R, BackRef) -> Result<(), WorkflowError>,
    {
        let mut record: R = self.get(id)?;
        apply(&mut record, target.clone())?;
        record.bump_revision();
        self.store.persist(&record)?;
        log_annotation(id, field, &target, expected);
        Ok(record)
    }

    /// Mark an NCR as needing a CAPA, optionally naming it
    pub fn link_capa(&mut self, ncr_id: &EntityId, capa: BackRef) -> QualityResult<Ncr> {
        self.annotate(ncr_id, "capa", capa, EntityPrefix::Capa, |ncr: &mut Ncr, link| {
            ncr.link_capa(link.id, link.number)
        })
    }

    /// Escalate an investigated non-conformance to CAPA
    pub fn require_capa(&mut self, nc_id: &EntityId, actor: &str, capa: BackRef) -> QualityResult<NonConformance> {
        let nc = self.transition::<NonConformance, _>(nc_id, Action::RequireCapa, |nc, now| {
            nc.require_capa(actor, now, capa.id.clone(), capa.number.clone())
        })?;
        log_annotation(nc_id, "capa", &capa, EntityPrefix::Capa);
        Ok(nc)
    }

    /// Note that a CAPA answers an audit finding
    pub fn raise_capa(&mut self, finding_id: &EntityId, capa: BackRef) -> QualityResult<AuditFinding> {
        self.annotate(finding_id, "capa", capa, EntityPrefix::Capa, |finding: &mut AuditFinding, link| {
            finding.raise_capa(link.id, link.number)
        })
    }

    /// Note the NCR raised from an inspection, in any status
    pub fn raise_ncr(&mut self, inspection_id: &EntityId, ncr: BackRef) -> QualityResult<Inspection> {
        self.annotate(inspection_id, "ncr", ncr, EntityPrefix::Ncr, |insp: &mut Inspection, link| {
            insp.raise_ncr(link.id, link.number);
            Ok(())
        })
    }

    /// Create an NCR from an inspection and cross-link both records
    pub fn ncr_from_inspection(&mut self, inspection_id: &EntityId, mut ncr: Ncr) -> QualityResult<Ncr> {
        let inspection: Inspection = self.get(inspection_id)?;
        ncr.source_inspection = BackRef::new(
            Some(inspection.id.clone()),
            Some(inspection.inspection_number.clone()),
        );
        if ncr.part_number.is_none() {
            ncr.part_number = inspection.part_number.clone();
        }
        if ncr.lot_number.is_none() {
            ncr.lot_number = inspection.lot_number.clone();
        }
        let ncr = self.create_ncr(ncr)?;
        self.raise_ncr(
            inspection_id,
            BackRef::new(Some(ncr.id.clone()), Some(ncr.ncr_number.clone())),
        )?;
        Ok(ncr)
    }
}
