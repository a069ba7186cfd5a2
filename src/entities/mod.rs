//! Entity type definitions
//!
//! QMS tracks the following record families:
//!
//! **Nonconformance:**
//! - [`Ncr`] - Lightweight nonconformance report with auto-numbering
//! - [`NonConformance`] - Full investigation record with CAPA escalation
//!
//! **Corrective and Preventive Action:**
//! - [`Capa`] - Combined corrective/preventive action
//! - [`CorrectiveAction`] - Stand-alone corrective action
//! - [`PreventiveAction`] - Stand-alone preventive action
//!
//! **Audits:**
//! - [`AuditPlan`] - Planned audit and its execution
//! - [`AuditFinding`] - Finding raised by an audit
//!
//! **Inspection:**
//! - [`Inspection`] - Inspection with result roll-up and lot dispositions
//! - [`InspectionResult`] - One measured parameter of an inspection
//! - [`QcTemplate`] - Versioned inspection checklist
//! - [`QcParameter`] - One characteristic on a template

pub mod action;
pub mod audit_plan;
pub mod capa;
pub mod corrective;
pub mod finding;
pub mod inspection;
pub mod inspection_result;
pub mod ncr;
pub mod nonconformance;
pub mod parameter;
pub mod preventive;
pub mod template;

pub use action::{ActionRecord, ActionSource, ActionStatus};
pub use audit_plan::{AuditPlan, AuditStatus, AuditType};
pub use capa::{ActionItem, Capa, CapaType, EffectivenessReview, ItemKind, ItemProgress, ItemStatus};
pub use corrective::CorrectiveAction;
pub use finding::{AuditFinding, FindingStatus, FindingType};
pub use inspection::{Inspection, InspectionStatus, InspectionType};
pub use inspection_result::InspectionResult;
pub use ncr::{Ncr, NcrCategory, NcrStatus};
pub use nonconformance::{
    ContainmentAction, ContainmentStatus, DetectionSource, Disposition, DispositionDecision, NcStatus,
    NonConformance,
};
pub use parameter::{ParameterKind, QcParameter};
pub use preventive::PreventiveAction;
pub use template::{QcTemplate, TemplateStatus};
