//! CLI command implementations

pub mod common;

pub mod action;
pub mod audit;
pub mod capa;
pub mod init;
pub mod insp;
pub mod nc;
pub mod ncr;
pub mod tmpl;
