//! Quality service: request-scoped operations over a record store
//!
//! Every operation loads what it needs, mutates an owned copy, and persists
//! only once all guards have passed. A failed operation writes nothing.

mod capa;
mod filter;
mod inspection;
mod links;
mod ncr;
mod nonconformance;
mod template;

pub use capa::CapaSummary;
pub use filter::{sort_records, RecordFilter};
pub use inspection::Measurement;
pub use ncr::NcrSummary;
pub use template::TemplateSummary;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::core::config::Config;
use crate::core::entity::Entity;
use crate::core::error::{QualityError, QualityResult};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::patch::{apply_patch, UpdatePolicy};
use crate::core::sequence::SequenceGenerator;
use crate::core::store::RecordStore;
use crate::core::workflow::{Action, Lifecycle, State, WorkflowError};
use crate::entities::{InspectionResult, QcParameter};

/// Source of the server timestamp stamped on sign-offs
pub type Clock = fn() -> DateTime<Utc>;

pub struct QualityService<S: RecordStore> {
    store: S,
    sequence: Box<dyn SequenceGenerator>,
    policy: UpdatePolicy,
    ncr_prefix: String,
    number_width: usize,
    clock: Clock,
}

impl<S: RecordStore> QualityService<S> {
    pub fn new(store: S, sequence: Box<dyn SequenceGenerator>) -> Self {
        Self {
            store,
            sequence,
            policy: UpdatePolicy::default(),
            ncr_prefix: "NCR".to_string(),
            number_width: 3,
            clock: Utc::now,
        }
    }

    /// Take the update policy and NCR numbering settings from `config`
    pub fn with_config(mut self, config: &Config) -> Self {
        self.policy = config.update_policy();
        self.ncr_prefix = config.ncr_prefix().to_string();
        self.number_width = config.number_width();
        self
    }

    pub fn with_policy(mut self, policy: UpdatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> UpdatePolicy {
        self.policy
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Save a new record, refusing a business number already in use
    pub fn create<R: Entity>(&mut self, record: R) -> QualityResult<R> {
        record.validate().map_err(QualityError::validation)?;
        if let Some(number) = record.business_number() {
            if self.find_by_number::<R>(&number)?.is_some() {
                return Err(QualityError::Conflict {
                    family: R::PREFIX.family(),
                    number,
                });
            }
        }
        if self.store.fetch::<R>(record.id())?.is_some() {
            return Err(QualityError::Conflict {
                family: R::PREFIX.family(),
                number: record.id().to_string(),
            });
        }

        self.store.persist(&record)?;
        tracing::info!(
            id = %record.id(),
            number = record.business_number().unwrap_or_default(),
            "created {}",
            R::PREFIX.family()
        );
        Ok(record)
    }

    pub fn get<R: Entity>(&self, id: &EntityId) -> QualityResult<R> {
        if id.prefix() != R::PREFIX {
            return Err(QualityError::not_found(R::PREFIX.family(), id));
        }
        self.store
            .fetch::<R>(id)?
            .ok_or_else(|| QualityError::not_found(R::PREFIX.family(), id))
    }

    /// Look a record up by business number, ignoring case
    pub fn find_by_number<R: Entity>(&self, number: &str) -> QualityResult<Option<R>> {
        Ok(self.store.fetch_all::<R>()?.into_iter().find(|r| {
            r.business_number()
                .is_some_and(|n| n.eq_ignore_ascii_case(number))
        }))
    }

    /// Resolve a full ID or a business number
    pub fn resolve<R: Entity>(&self, key: &str) -> QualityResult<R> {
        if let Ok(id) = EntityId::parse(key) {
            return self.get(&id);
        }
        self.find_by_number(key)?
            .ok_or_else(|| QualityError::not_found(R::PREFIX.family(), key))
    }

    pub fn list<R: Entity>(&self, filter: &RecordFilter) -> QualityResult<Vec<R>> {
        Ok(filter.apply(self.store.fetch_all::<R>()?))
    }

    /// Shallow-merge `patch` onto a lifecycle record, subject to the update policy
    pub fn update<R: Lifecycle>(&mut self, id: &EntityId, patch: Value) -> QualityResult<R> {
        let record: R = self.get(id)?;
        self.policy.check(&record)?;
        let updated = apply_patch(&record, patch)?;
        updated.validate().map_err(QualityError::validation)?;
        self.store.persist(&updated)?;
        tracing::info!(id = %id, "updated {}", R::PREFIX.family());
        Ok(updated)
    }

    /// Remove a record still in a deletable state
    ///
    /// Records that own children (an inspection's results, a template's
    /// parameters) take them along.
    pub fn delete<R: Lifecycle>(&mut self, id: &EntityId) -> QualityResult<()> {
        let record: R = self.get(id)?;
        self.ensure_deletable(&record)?;
        self.store.remove::<R>(id)?;
        let children = self.remove_children(R::PREFIX, id)?;
        tracing::info!(id = %id, children, "deleted {}", R::PREFIX.family());
        Ok(())
    }

    fn remove_children(&mut self, parent: EntityPrefix, id: &EntityId) -> QualityResult<usize> {
        match parent {
            EntityPrefix::Insp => {
                let results = self.results(id)?;
                for result in &results {
                    self.store.remove::<InspectionResult>(&result.id)?;
                }
                Ok(results.len())
            }
            EntityPrefix::Qct => {
                let parameters = self.parameters(id)?;
                for parameter in &parameters {
                    self.store.remove::<QcParameter>(&parameter.id)?;
                }
                Ok(parameters.len())
            }
            _ => Ok(0),
        }
    }

    fn ensure_deletable<R: Lifecycle>(&self, record: &R) -> Result<(), WorkflowError> {
        if record.is_deletable() {
            Ok(())
        } else {
            Err(WorkflowError::NotDeletable {
                family: R::machine().family(),
                status: record.state().as_str().to_string(),
            })
        }
    }

    /// Run one named transition against the stored record
    ///
    /// `apply` receives the working copy and the server timestamp; the copy
    /// is saved only if it returns `Ok` and still passes field validation.
    pub fn transition<R, F>(&mut self, id: &EntityId, action: Action, apply: F) -> QualityResult<R>
    where
        R: Lifecycle,
        F: FnOnce(&mut R, DateTime<Utc>) -> Result<(), WorkflowError>,
    {
        let mut record: R = self.get(id)?;
        let from = record.state();
        apply(&mut record, self.now())?;
        record.validate().map_err(QualityError::validation)?;
        record.bump_revision();
        self.store.persist(&record)?;
        tracing::info!(
            id = %id,
            %action,
            from = from.as_str(),
            to = record.state().as_str(),
            "{} transition",
            R::machine().family()
        );
        Ok(record)
    }

    /// Change an open record's sub-records outside its transitions
    ///
    /// Terminal records are locked. The working copy must pass validation
    /// before it is saved.
    pub(crate) fn amend<R, F>(&mut self, id: &EntityId, apply: F) -> QualityResult<R>
    where
        R: Lifecycle,
        F: FnOnce(&mut R, DateTime<Utc>) -> QualityResult<()>,
    {
        let mut record: R = self.get(id)?;
        if record.is_terminal() {
            return Err(WorkflowError::Locked {
                family: R::machine().family(),
                status: record.state().as_str().to_string(),
            }
            .into());
        }
        apply(&mut record, self.now())?;
        record.validate().map_err(QualityError::validation)?;
        record.bump_revision();
        self.store.persist(&record)?;
        Ok(record)
    }

    /// Actions available from the record's current state
    pub fn allowed_actions<R: Lifecycle>(&self, id: &EntityId) -> QualityResult<Vec<Action>> {
        let record: R = self.get(id)?;
        Ok(R::machine().allowed_actions(record.state()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Severity;
    use crate::core::sequence::MemorySequence;
    use crate::core::store::MemoryStore;
    use crate::entities::{
        ActionRecord, AuditPlan, AuditStatus, AuditType, Capa, CapaType, CorrectiveAction, Inspection,
        InspectionType, Ncr, NcrStatus, PreventiveAction, QcTemplate, TemplateStatus,
    };
    use serde_json::json;

    fn service() -> QualityService<MemoryStore> {
        QualityService::new(MemoryStore::new(), Box::new(MemorySequence::new()))
    }

    fn capa(number: &str) -> Capa {
        Capa::new(number, "Fix fixture wear", CapaType::Corrective, "test")
    }

    #[test]
    fn test_duplicate_number_conflicts() {
        let mut svc = service();
        svc.create(capa("CAPA-2025-001")).unwrap();
        let err = svc.create(capa("capa-2025-001")).unwrap_err();
        assert!(matches!(err, QualityError::Conflict { .. }));
        assert_eq!(svc.store().count::<Capa>().unwrap(), 1);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let svc = service();
        let err = svc
            .get::<Capa>(&EntityId::new(crate::core::identity::EntityPrefix::Capa))
            .unwrap_err();
        assert!(matches!(err, QualityError::NotFound { .. }));
    }

    #[test]
    fn test_get_with_wrong_prefix_is_not_found() {
        let mut svc = service();
        let ncr = svc.create_ncr(Ncr::new("Scratch", Severity::Minor, "test")).unwrap();
        assert!(matches!(
            svc.get::<Capa>(&ncr.id),
            Err(QualityError::NotFound { .. })
        ));
    }

    #[test]
    fn test_failed_transition_persists_nothing() {
        let mut svc = service();
        let created = svc.create(capa("CAPA-2025-002")).unwrap();
        let err = svc
            .transition::<Capa, _>(&created.id, Action::Close, |c, now| {
                crate::entities::ActionRecord::close(c, "qa", now, None)
            })
            .unwrap_err();
        assert!(err.is_precondition());

        let stored: Capa = svc.get(&created.id).unwrap();
        assert_eq!(stored.entity_revision, 1);
        assert!(stored.progress.closed.is_none());
    }

    #[test]
    fn test_update_rejects_locked_fields() {
        let mut svc = service();
        let created = svc.create(capa("CAPA-2025-003")).unwrap();
        let err = svc
            .update::<Capa>(&created.id, json!({"status": "closed"}))
            .unwrap_err();
        assert!(matches!(err, QualityError::Validation { .. }));

        let err = svc
            .update::<Capa>(&created.id, json!({"owner": "jo", "no_such_field": 1}))
            .unwrap_err();
        assert!(matches!(err, QualityError::Validation { .. }));

        let err = svc
            .update::<Capa>(&created.id, json!({"capa_number": "CAPA-2025-099"}))
            .unwrap_err();
        assert!(matches!(err, QualityError::Validation { .. }));
    }

    #[test]
    fn test_update_merges_and_bumps_revision() {
        let mut svc = service();
        let created = svc.create(capa("CAPA-2025-004")).unwrap();
        let updated: Capa = svc
            .update(&created.id, json!({"root_cause": "worn locator pin", "owner": "jo"}))
            .unwrap();
        assert_eq!(updated.root_cause.as_deref(), Some("worn locator pin"));
        assert_eq!(updated.entity_revision, 2);

        let cleared: Capa = svc.update(&created.id, json!({"owner": null})).unwrap();
        assert!(cleared.owner.is_none());
    }

    #[test]
    fn test_update_policy_locks_terminal_records() {
        let mut svc = service();
        let ncr = svc.create_ncr(Ncr::new("Dent", Severity::Minor, "test")).unwrap();
        svc.transition::<Ncr, _>(&ncr.id, Action::Start, |n, now| n.start("a", now))
            .unwrap();
        svc.transition::<Ncr, _>(&ncr.id, Action::Close, |n, now| n.close("a", now, None))
            .unwrap();

        let err = svc
            .update::<Ncr>(&ncr.id, json!({"disposition": "scrap"}))
            .unwrap_err();
        assert!(err.is_precondition());

        let mut open = service().with_policy(UpdatePolicy::Unrestricted);
        let ncr = open.create_ncr(Ncr::new("Dent", Severity::Minor, "test")).unwrap();
        open.transition::<Ncr, _>(&ncr.id, Action::Start, |n, now| n.start("a", now))
            .unwrap();
        open.transition::<Ncr, _>(&ncr.id, Action::Close, |n, now| n.close("a", now, None))
            .unwrap();
        let patched: Ncr = open.update(&ncr.id, json!({"disposition": "scrap"})).unwrap();
        assert_eq!(patched.status, NcrStatus::Closed);
    }

    #[test]
    fn test_delete_guard_keeps_record() {
        let mut svc = service();
        let created = svc.create(capa("CAPA-2025-005")).unwrap();
        svc.transition::<Capa, _>(&created.id, Action::Submit, |c, now| {
            crate::entities::ActionRecord::submit(c, "a", now)
        })
        .unwrap();

        let err = svc.delete::<Capa>(&created.id).unwrap_err();
        assert!(err.is_precondition());
        assert!(svc.get::<Capa>(&created.id).is_ok());
    }

    fn submitted<R: ActionRecord>(svc: &mut QualityService<MemoryStore>, record: R) -> EntityId {
        let created = svc.create(record).unwrap();
        svc.transition::<R, _>(created.id(), Action::Submit, |r, now| r.submit("a", now))
            .unwrap();
        created.id().clone()
    }

    #[test]
    fn test_delete_guard_across_families() {
        let mut svc = service();

        let ncr = svc.create_ncr(Ncr::new("Burr", Severity::Minor, "test")).unwrap();
        svc.transition::<Ncr, _>(&ncr.id, Action::Start, |n, now| n.start("a", now))
            .unwrap();
        assert!(svc.delete::<Ncr>(&ncr.id).unwrap_err().is_precondition());
        assert_eq!(svc.get::<Ncr>(&ncr.id).unwrap().status, NcrStatus::InProgress);

        let plan = svc
            .create(AuditPlan::new("AUD-2025-01", "Receiving", AuditType::Internal, "test"))
            .unwrap();
        svc.transition::<AuditPlan, _>(&plan.id, Action::Schedule, |p, now| {
            p.schedule("a", now, None, None)
        })
        .unwrap();
        assert!(svc.delete::<AuditPlan>(&plan.id).unwrap_err().is_precondition());
        assert_eq!(svc.get::<AuditPlan>(&plan.id).unwrap().status, AuditStatus::Scheduled);

        let ca = submitted(&mut svc, CorrectiveAction::new("CA-2025-001", "Regrind", "test"));
        assert!(svc.delete::<CorrectiveAction>(&ca).unwrap_err().is_precondition());
        assert!(svc.get::<CorrectiveAction>(&ca).is_ok());

        let pa = submitted(&mut svc, PreventiveAction::new("PA-2025-001", "Poka-yoke", "test"));
        assert!(svc.delete::<PreventiveAction>(&pa).unwrap_err().is_precondition());
        assert!(svc.get::<PreventiveAction>(&pa).is_ok());

        // Still in their initial state, these go
        let draft = svc
            .create(AuditPlan::new("AUD-2025-02", "Shipping", AuditType::Internal, "test"))
            .unwrap();
        svc.delete::<AuditPlan>(&draft.id).unwrap();
        assert!(svc.get::<AuditPlan>(&draft.id).is_err());
    }

    #[test]
    fn test_generic_delete_takes_children_along() {
        let mut svc = service();
        let insp = svc
            .create(Inspection::new("INSP-900", "Lot 9", InspectionType::Incoming, "t"))
            .unwrap();
        svc.add_result(&insp.id, InspectionResult::new(insp.id.clone(), 0, "Length", "t"))
            .unwrap();
        svc.delete::<Inspection>(&insp.id).unwrap();
        assert_eq!(svc.store().count::<InspectionResult>().unwrap(), 0);

        let t = svc.create(QcTemplate::new("T-900", "Check", "t")).unwrap();
        svc.add_parameter(&t.id, QcParameter::new(t.id.clone(), 0, "Length", "t"))
            .unwrap();
        svc.delete::<QcTemplate>(&t.id).unwrap();
        assert_eq!(svc.store().count::<QcParameter>().unwrap(), 0);
    }

    #[test]
    fn test_released_template_content_is_frozen() {
        let mut svc = service();
        let t = svc.create(QcTemplate::new("T-901", "Check", "t")).unwrap();
        svc.update::<QcTemplate>(&t.id, json!({"aql": 2.5})).unwrap();
        svc.transition::<QcTemplate, _>(&t.id, Action::Activate, |t, now| t.activate("qa", now))
            .unwrap();

        for policy in [UpdatePolicy::NonTerminal, UpdatePolicy::Unrestricted] {
            svc.policy = policy;
            let err = svc
                .update::<QcTemplate>(&t.id, json!({"aql": 4.0, "sampling_plan": "changed"}))
                .unwrap_err();
            assert!(err.is_precondition());
        }

        let stored: QcTemplate = svc.get(&t.id).unwrap();
        assert_eq!(stored.aql, Some(2.5));
        assert!(stored.sampling_plan.is_none());
        assert_eq!(stored.status, TemplateStatus::Active);
    }

    #[test]
    fn test_resolve_by_number_or_id() {
        let mut svc = service();
        let created = svc.create(capa("CAPA-2025-006")).unwrap();
        let by_number: Capa = svc.resolve("CAPA-2025-006").unwrap();
        let by_id: Capa = svc.resolve(&created.id.to_string()).unwrap();
        assert_eq!(by_number.id, by_id.id);
        assert!(svc.resolve::<Capa>("CAPA-2025-999").is_err());
    }
}
