//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    action::ActionCommands, audit::AuditCommands, capa::CapaCommands, init::InitArgs,
    insp::InspCommands, nc::NcCommands, ncr::NcrCommands, tmpl::TmplCommands,
};

#[derive(Parser)]
#[command(name = "qms")]
#[command(author, version, about = "Quality record lifecycle engine")]
#[command(long_about = "Manage NCRs, CAPAs, audits, inspections and QC templates as plain-text YAML records, with every status change driven by an explicit workflow.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (info-level logs on stderr)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project root (default: auto-detect by finding .qms/)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    /// Who signs off transitions (default: configured author)
    #[arg(long, global = true, env = "QMS_ACTOR")]
    pub actor: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new quality records project
    Init(InitArgs),

    /// Non-conformance reports (open -> in_progress -> closed)
    #[command(subcommand)]
    Ncr(NcrCommands),

    /// Non-conformances with investigation and CAPA escalation
    #[command(subcommand)]
    Nc(NcCommands),

    /// Combined corrective and preventive actions
    #[command(subcommand)]
    Capa(CapaCommands),

    /// Corrective actions
    #[command(subcommand)]
    Ca(ActionCommands),

    /// Preventive actions
    #[command(subcommand)]
    Pa(ActionCommands),

    /// Audit plans and findings
    #[command(subcommand)]
    Audit(AuditCommands),

    /// Inspections and their results
    #[command(subcommand)]
    Insp(InspCommands),

    /// QC templates and their parameters
    #[command(subcommand)]
    Tmpl(TmplCommands),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Automatically detect based on context (yaml for show, table for list)
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
    /// Markdown tables
    Md,
    /// Just IDs, one per line
    Id,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["qms", "ncr", "list", "-f", "json", "--actor", "qa"]).unwrap();
        assert_eq!(cli.global.format, OutputFormat::Json);
        assert_eq!(cli.global.actor.as_deref(), Some("qa"));
    }
}
