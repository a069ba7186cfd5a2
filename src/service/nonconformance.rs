//! Containment and disposition records on non-conformances

use crate::core::error::{QualityError, QualityResult};
use crate::core::identity::EntityId;
use crate::core::store::RecordStore;
use crate::entities::{ContainmentAction, Disposition, NonConformance};
use crate::service::QualityService;

impl<S: RecordStore> QualityService<S> {
    /// Record an immediate containment step on an open non-conformance
    pub fn add_containment_action(
        &mut self,
        nc_id: &EntityId,
        mut action: ContainmentAction,
    ) -> QualityResult<NonConformance> {
        let nc = self.amend::<NonConformance, _>(nc_id, |nc, now| {
            if action.action.trim().is_empty() {
                return Err(QualityError::validation("containment action needs a description"));
            }
            action.recorded.at = now;
            nc.add_containment(action);
            Ok(())
        })?;
        tracing::info!(nc = %nc_id, open = nc.open_containment(), "containment action added");
        Ok(nc)
    }

    /// Mark containment step `sequence` as done
    pub fn complete_containment_action(
        &mut self,
        nc_id: &EntityId,
        sequence: u32,
        actor: &str,
        outcome: Option<String>,
    ) -> QualityResult<NonConformance> {
        self.amend::<NonConformance, _>(nc_id, |nc, now| {
            let action = nc
                .containment_mut(sequence)
                .ok_or_else(|| QualityError::not_found("containment action", sequence))?;
            action.complete(actor, now, outcome)?;
            Ok(())
        })
    }

    /// Record a disposition decision for part of the affected quantity
    ///
    /// The dispositions together may not exceed `quantity_affected` when
    /// that is known.
    pub fn add_disposition(
        &mut self,
        nc_id: &EntityId,
        mut disposition: Disposition,
    ) -> QualityResult<NonConformance> {
        let decision = disposition.decision;
        let nc = self.amend::<NonConformance, _>(nc_id, |nc, now| {
            disposition.approved.at = now;
            nc.add_disposition(disposition);
            Ok(())
        })?;
        tracing::info!(
            nc = %nc_id,
            %decision,
            disposed = nc.disposed_quantity(),
            cost = nc.total_disposition_cost(),
            "disposition recorded"
        );
        Ok(nc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Severity;
    use crate::core::sequence::MemorySequence;
    use crate::core::store::MemoryStore;
    use crate::core::workflow::Action;
    use crate::entities::{DispositionDecision, NcStatus};
    use chrono::Utc;

    fn service() -> QualityService<MemoryStore> {
        QualityService::new(MemoryStore::new(), Box::new(MemorySequence::new()))
    }

    fn nc(svc: &mut QualityService<MemoryStore>) -> NonConformance {
        let mut nc = NonConformance::new("NC-2025-040", "Porosity", Severity::Major, "t");
        nc.quantity_affected = Some(20);
        svc.create(nc).unwrap()
    }

    #[test]
    fn test_containment_lifecycle() {
        let mut svc = service();
        let created = nc(&mut svc);
        let now = Utc::now();

        svc.add_containment_action(&created.id, ContainmentAction::new("Quarantine lot", "a", now))
            .unwrap();
        let nc = svc
            .add_containment_action(&created.id, ContainmentAction::new("Notify customer", "a", now))
            .unwrap();
        assert_eq!(nc.containment_actions[1].sequence, 2);
        assert_eq!(nc.entity_revision, 3);

        let nc = svc
            .complete_containment_action(&created.id, 1, "b", Some("held".to_string()))
            .unwrap();
        assert_eq!(nc.open_containment(), 1);

        assert!(matches!(
            svc.complete_containment_action(&created.id, 7, "b", None),
            Err(QualityError::NotFound { .. })
        ));
        assert!(svc
            .complete_containment_action(&created.id, 1, "b", None)
            .unwrap_err()
            .is_precondition());
        assert!(matches!(
            svc.add_containment_action(&created.id, ContainmentAction::new("  ", "a", now)),
            Err(QualityError::Validation { .. })
        ));
    }

    #[test]
    fn test_over_disposition_persists_nothing() {
        let mut svc = service();
        let created = nc(&mut svc);
        let now = Utc::now();

        svc.add_disposition(&created.id, Disposition::new(DispositionDecision::Rework, 15, "mrb", now))
            .unwrap();
        let err = svc
            .add_disposition(&created.id, Disposition::new(DispositionDecision::Scrap, 6, "mrb", now))
            .unwrap_err();
        assert!(matches!(err, QualityError::Validation { .. }));

        let stored: NonConformance = svc.get(&created.id).unwrap();
        assert_eq!(stored.dispositions.len(), 1);
        assert_eq!(stored.disposed_quantity(), 15);
    }

    #[test]
    fn test_closed_non_conformance_is_locked() {
        let mut svc = service();
        let created = nc(&mut svc);
        svc.transition::<NonConformance, _>(&created.id, Action::Cancel, |nc, now| {
            nc.cancel("a", now, None)
        })
        .unwrap();

        let err = svc
            .add_containment_action(&created.id, ContainmentAction::new("Too late", "a", Utc::now()))
            .unwrap_err();
        assert!(err.is_precondition());
        let stored: NonConformance = svc.get(&created.id).unwrap();
        assert_eq!(stored.status, NcStatus::Cancelled);
        assert!(stored.containment_actions.is_empty());
    }
}
