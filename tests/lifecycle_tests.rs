//! Cross-family lifecycle scenarios against the in-memory store

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use qms::core::aggregate::OverallResult;
use qms::core::compliance::ResultStatus;
use qms::core::entity::{Entity, Severity};
use qms::core::error::QualityError;
use qms::core::links::BackRef;
use qms::core::sequence::MemorySequence;
use qms::core::store::MemoryStore;
use qms::core::workflow::{Action, WorkflowError};
use qms::entities::{
    ActionRecord, ActionStatus, AuditFinding, AuditPlan, AuditStatus, AuditType, Capa, CapaType,
    CorrectiveAction, FindingStatus, FindingType, Inspection, InspectionResult, InspectionStatus,
    InspectionType, NcStatus, NonConformance, Ncr, NcrStatus, ParameterKind, QcParameter,
    QcTemplate, TemplateStatus,
};
use qms::service::{Measurement, QualityService, RecordFilter};

fn service() -> QualityService<MemoryStore> {
    QualityService::new(MemoryStore::new(), Box::new(MemorySequence::new()))
}

fn fixed_clock() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap()
}

/// Active template with a bore diameter (10..20) and a visual check
fn active_template(svc: &mut QualityService<MemoryStore>) -> QcTemplate {
    let template = svc.create(QcTemplate::new("QCT-BORE", "Bore check", "qa")).unwrap();

    let mut bore = QcParameter::new(template.id.clone(), 0, "Bore diameter", "qa");
    bore.unit = Some("mm".to_string());
    bore.lower_limit = Some(10.0);
    bore.upper_limit = Some(20.0);
    bore.criticality = Severity::Major;
    svc.add_parameter(&template.id, bore).unwrap();

    let mut visual = QcParameter::new(template.id.clone(), 0, "Surface finish", "qa");
    visual.kind = ParameterKind::Textual;
    svc.add_parameter(&template.id, visual).unwrap();

    svc.transition::<QcTemplate, _>(&template.id, Action::Activate, |t, now| t.activate("qa", now))
        .unwrap()
}

#[test]
fn test_inspection_to_ncr_to_capa() {
    let mut svc = service();
    let template = active_template(&mut svc);

    let inspection = svc
        .create(Inspection::new("INSP-2025-001", "Incoming lot 42", InspectionType::Incoming, "qa"))
        .unwrap();
    let seeded = svc
        .seed_results_from_template(&inspection.id, &template.id, "qa")
        .unwrap();
    assert_eq!(seeded.len(), 2);
    assert_eq!(seeded[0].sequence, 1);
    assert_eq!(seeded[0].lower_limit, Some(10.0));
    assert!(seeded.iter().all(|r| r.status == ResultStatus::Pending));

    svc.transition::<Inspection, _>(&inspection.id, Action::Start, |i, now| i.start("inspector", now))
        .unwrap();

    let bore = svc
        .update_result_value(
            &seeded[0].id,
            "inspector",
            Measurement {
                numeric_value: Some(5.0),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(bore.status, ResultStatus::Fail);
    assert_eq!(bore.is_within_spec, Some(false));

    svc.update_result_value(
        &seeded[1].id,
        "inspector",
        Measurement {
            text_value: Some("smooth".to_string()),
            manual_status: Some(ResultStatus::Pass),
            ..Default::default()
        },
    )
    .unwrap();

    let stats = svc.statistics(&inspection.id).unwrap();
    assert_eq!(stats.parameters_checked, 2);
    assert_eq!(stats.parameters_failed, 1);
    assert_eq!(stats.pass_rate, 50.0);
    assert_eq!(stats.major_defects, 1);

    let completed = svc.submit_inspection(&inspection.id, "inspector").unwrap();
    assert_eq!(completed.status, InspectionStatus::Completed);
    assert_eq!(completed.overall_result, OverallResult::Fail);

    let mut ncr = Ncr::new("Bore undersize", Severity::Major, "qa");
    ncr.description = Some("5 mm against a 10 mm lower limit".to_string());
    let ncr = svc.ncr_from_inspection(&inspection.id, ncr).unwrap();
    assert_eq!(ncr.source_inspection.id.as_ref(), Some(&inspection.id));

    let inspection: Inspection = svc.get(&inspection.id).unwrap();
    assert_eq!(inspection.ncr.id.as_ref(), Some(&ncr.id));

    let raised_from: Vec<Ncr> = svc
        .list(&RecordFilter::new().with_ref("inspection_id", &inspection.id))
        .unwrap();
    assert_eq!(raised_from.len(), 1);

    let capa = svc
        .create(
            Capa::new("CAPA-2025-001", "Recalibrate boring bar", CapaType::Corrective, "qa")
                .with_source(Some(ncr.id.clone()), Some(ncr.ncr_number.clone())),
        )
        .unwrap();
    let ncr = svc
        .link_capa(&ncr.id, BackRef::new(Some(capa.id.clone()), Some(capa.capa_number.clone())))
        .unwrap();
    assert!(ncr.requires_capa.is_set());

    let answering: Vec<Capa> = svc
        .list(&RecordFilter::new().with_ref("ncr_id", &ncr.id))
        .unwrap();
    assert_eq!(answering.len(), 1);
}

#[test]
fn test_capa_full_sequence_through_service() {
    let mut svc = service().with_clock(fixed_clock);
    let capa = svc
        .create(Capa::new("CAPA-7", "Supplier audit", CapaType::Preventive, "qa"))
        .unwrap();

    let closing = svc.transition::<Capa, _>(&capa.id, Action::Close, |c, now| c.close("qa", now, None));
    assert!(matches!(closing, Err(QualityError::PreconditionFailed(_))));

    let id = capa.id.clone();
    svc.transition::<Capa, _>(&id, Action::Submit, |c, now| c.submit("owner", now)).unwrap();
    svc.transition::<Capa, _>(&id, Action::Approve, |c, now| c.approve("manager", now, None))
        .unwrap();
    svc.transition::<Capa, _>(&id, Action::Implement, |c, now| c.implement("owner", now))
        .unwrap();
    svc.transition::<Capa, _>(&id, Action::RequestVerification, |c, now| {
        c.request_verification("owner", now)
    })
    .unwrap();
    svc.transition::<Capa, _>(&id, Action::Verify, |c, now| {
        c.verify("auditor", now, true, Some("no recurrence in 3 lots".to_string()))
    })
    .unwrap();
    let closed = svc
        .transition::<Capa, _>(&id, Action::Close, |c, now| {
            c.close("manager", now, Some("effective".to_string()))
        })
        .unwrap();

    assert_eq!(closed.status, ActionStatus::Closed);
    let progress = closed.progress();
    assert!(progress.is_implemented.is_set());
    assert!(progress.is_verified.is_set());
    assert!(progress.is_effective.is_set());
    assert_eq!(progress.closure_notes.as_deref(), Some("effective"));
    assert_eq!(progress.approved.as_ref().map(|s| s.at), Some(fixed_clock()));
    assert!(svc.allowed_actions::<Capa>(&id).unwrap().is_empty());
}

#[test]
fn test_corrective_action_under_capa() {
    let mut svc = service();
    let capa = svc
        .create(Capa::new("CAPA-9", "Weld porosity", CapaType::Corrective, "qa"))
        .unwrap();
    let ca = svc
        .create(
            CorrectiveAction::new("CA-9-1", "Replace gas regulator", "qa")
                .with_capa(Some(capa.id.clone()), Some(capa.capa_number.clone())),
        )
        .unwrap();

    let rejected = svc
        .transition::<CorrectiveAction, _>(&ca.id, Action::Reject, |r, now| {
            r.reject("manager", now, "duplicate of CA-9-0".to_string())
        })
        .unwrap();
    assert_eq!(rejected.status, ActionStatus::Rejected);
    assert_eq!(
        rejected.progress().rejection_reason.as_deref(),
        Some("duplicate of CA-9-0")
    );

    let under_capa: Vec<CorrectiveAction> = svc
        .list(&RecordFilter::new().with_ref("capa_id", &capa.id))
        .unwrap();
    assert_eq!(under_capa.len(), 1);
}

#[test]
fn test_nonconformance_escalates_to_capa() {
    let mut svc = service();
    let nc = svc
        .create(NonConformance::new("NC-2025-014", "Wrong resin lot", Severity::Critical, "qa"))
        .unwrap();

    // Escalation before investigation is refused
    let early = svc.require_capa(&nc.id, "qa", BackRef::default());
    assert!(matches!(early, Err(QualityError::PreconditionFailed(_))));

    svc.transition::<NonConformance, _>(&nc.id, Action::Submit, |n, now| n.submit("qa", now))
        .unwrap();
    svc.transition::<NonConformance, _>(&nc.id, Action::Investigate, |n, now| {
        n.investigate("engineer", now)
    })
    .unwrap();

    let escalated = svc
        .require_capa(&nc.id, "engineer", BackRef::new(None, Some("CAPA-2025-004".to_string())))
        .unwrap();
    assert_eq!(escalated.status, NcStatus::CapaRequired);
    assert!(escalated.requires_capa.is_set());
    assert_eq!(escalated.capa.number.as_deref(), Some("CAPA-2025-004"));

    let closed = svc
        .transition::<NonConformance, _>(&nc.id, Action::Close, |n, now| n.close("qa", now, None))
        .unwrap();
    assert_eq!(closed.status, NcStatus::Closed);
    assert!(closed.requires_capa.is_set());
}

#[test]
fn test_audit_plan_and_findings() {
    let mut svc = service();
    let plan = svc
        .create(AuditPlan::new("AUD-2025-003", "Process audit", AuditType::Internal, "lead"))
        .unwrap();

    // An end before the start is refused and nothing is saved
    let inverted = svc.transition::<AuditPlan, _>(&plan.id, Action::Schedule, |p, now| {
        p.schedule(
            "lead",
            now,
            NaiveDate::from_ymd_opt(2025, 5, 10),
            NaiveDate::from_ymd_opt(2025, 5, 2),
        )
    });
    assert!(matches!(inverted, Err(QualityError::Validation { .. })));
    let stored: AuditPlan = svc.get(&plan.id).unwrap();
    assert_eq!(stored.status, AuditStatus::Draft);
    assert!(stored.planned_start.is_none());

    svc.transition::<AuditPlan, _>(&plan.id, Action::Schedule, |p, now| {
        p.schedule(
            "lead",
            now,
            NaiveDate::from_ymd_opt(2025, 5, 2),
            NaiveDate::from_ymd_opt(2025, 5, 3),
        )
    })
    .unwrap();
    svc.transition::<AuditPlan, _>(&plan.id, Action::Start, |p, now| p.start("lead", now))
        .unwrap();

    let finding = svc
        .create(
            AuditFinding::new("FND-2025-011", "Uncontrolled work instruction", FindingType::MinorNonconformity, "lead")
                .with_audit_plan(Some(plan.id.clone()), Some(plan.audit_number.clone())),
        )
        .unwrap();
    let observation = svc
        .create(
            AuditFinding::new("FND-2025-012", "Labels fading", FindingType::Observation, "lead")
                .with_audit_plan(Some(plan.id.clone()), Some(plan.audit_number.clone())),
        )
        .unwrap();

    let finding = svc
        .raise_capa(&finding.id, BackRef::new(None, Some("CAPA-2025-010".to_string())))
        .unwrap();
    assert!(finding.requires_capa.is_set());

    svc.transition::<AuditFinding, _>(&finding.id, Action::Acknowledge, |f, now| {
        f.acknowledge("auditee", now, Some("document control updated".to_string()))
    })
    .unwrap();
    let verified = svc
        .transition::<AuditFinding, _>(&finding.id, Action::Verify, |f, now| {
            f.verify("lead", now, true, None)
        })
        .unwrap();
    assert!(verified.is_verified.is_set());
    assert!(verified.is_effective.is_set());
    let closed = svc
        .transition::<AuditFinding, _>(&finding.id, Action::Close, |f, now| f.close("lead", now))
        .unwrap();
    assert_eq!(closed.status, FindingStatus::Closed);

    let rejected = svc
        .transition::<AuditFinding, _>(&observation.id, Action::Reject, |f, now| {
            f.reject("lead", now, "outside audit scope".to_string())
        })
        .unwrap();
    assert_eq!(rejected.status, FindingStatus::Rejected);

    let for_plan: Vec<AuditFinding> = svc
        .list(&RecordFilter::new().with_ref("audit_plan_id", &plan.id))
        .unwrap();
    assert_eq!(for_plan.len(), 2);

    svc.transition::<AuditPlan, _>(&plan.id, Action::Complete, |p, now| {
        p.complete("lead", now, Some("2 findings".to_string()))
    })
    .unwrap();
    let closed = svc
        .transition::<AuditPlan, _>(&plan.id, Action::Close, |p, now| p.close("lead", now))
        .unwrap();
    assert_eq!(closed.status, AuditStatus::Closed);
}

#[test]
fn test_ncr_numbering_follows_store_count() {
    let mut svc = service();
    let year = Utc::now().year();

    svc.create_ncr(Ncr::new("First", Severity::Minor, "qa")).unwrap();
    svc.create_ncr(Ncr::new("Second", Severity::Minor, "qa")).unwrap();
    let third = svc.create_ncr(Ncr::new("Third", Severity::Major, "qa")).unwrap();

    assert_eq!(third.ncr_number, format!("NCR-{}-003", year));
    assert_eq!(third.status, NcrStatus::Open);
}

#[test]
fn test_failed_ncr_transition_leaves_record_untouched() {
    let mut svc = service();
    let ncr = svc.create_ncr(Ncr::new("Scratch", Severity::Minor, "qa")).unwrap();

    let result = svc.transition::<Ncr, _>(&ncr.id, Action::Close, |n, now| n.close("qa", now, None));
    match result {
        Err(QualityError::PreconditionFailed(WorkflowError::InvalidTransition { .. })) => {}
        other => panic!("expected an invalid transition, got {:?}", other.map(|n| n.status)),
    }

    let stored: Ncr = svc.get(&ncr.id).unwrap();
    assert_eq!(stored.status, NcrStatus::Open);
    assert_eq!(stored.entity_revision, ncr.entity_revision);
    assert_eq!(
        svc.allowed_actions::<Ncr>(&ncr.id).unwrap(),
        vec![Action::Start]
    );
}

#[test]
fn test_template_versions_and_inspection_results() {
    let mut svc = service();
    let v1 = active_template(&mut svc);

    let v2 = svc.new_template_version(&v1.id, "qa").unwrap();
    assert_eq!(v2.version, 2);
    assert_eq!(v2.status, TemplateStatus::Draft);
    assert_eq!(v2.business_number().as_deref(), Some("QCT-BORE v2"));
    assert_eq!(svc.parameters(&v2.id).unwrap().len(), 2);

    // The draft fork cannot feed an inspection until activated
    let inspection = svc
        .create(Inspection::new("INSP-2025-002", "Final check", InspectionType::Final, "qa"))
        .unwrap();
    assert!(svc.seed_results_from_template(&inspection.id, &v2.id, "qa").is_err());

    let resolved: QcTemplate = svc.resolve("QCT-BORE v1").unwrap();
    assert_eq!(resolved.id, v1.id);

    // Active templates are protected; obsolete ones can go
    assert!(svc.delete_template(&v1.id).is_err());
    svc.transition::<QcTemplate, _>(&v1.id, Action::Obsolete, |t, now| t.obsolete("qa", now))
        .unwrap();
    svc.delete_template(&v1.id).unwrap();
    assert!(svc.parameters(&v1.id).unwrap().is_empty());

    let mut manual = InspectionResult::new(inspection.id.clone(), 0, "Thread gauge", "qa");
    manual.manual_status = Some(ResultStatus::Warning);
    let manual = svc.add_result(&inspection.id, manual).unwrap();
    assert_eq!(manual.sequence, 1);

    let stats = svc.statistics(&inspection.id).unwrap();
    assert_eq!(stats.parameters_checked, 0);
    assert_eq!(stats.parameters_warning, 1);
    assert_eq!(stats.pass_rate, 0.0);

    svc.transition::<Inspection, _>(&inspection.id, Action::Start, |i, now| i.start("qa", now))
        .unwrap();
    let completed = svc.submit_inspection(&inspection.id, "qa").unwrap();
    assert_eq!(completed.overall_result, OverallResult::Conditional);
    assert!(!completed.accepts_results());
}
