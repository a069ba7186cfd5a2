//! qms: quality record lifecycles
//!
//! NCRs, non-conformances, CAPAs with their corrective and preventive
//! actions, audit plans and findings, inspections and QC templates, kept
//! as plain YAML files and moved only along their status graphs.

pub mod cli;
pub mod core;
pub mod entities;
pub mod service;
pub mod yaml;
