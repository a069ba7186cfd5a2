//! `qms insp` command - Inspections, their results and lot quantities

use chrono::NaiveDate;
use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::commands::common::{
    report_created, report_deleted, report_transition, run_actions, run_list, run_show,
    run_transition, run_update, KeyArgs, LinkArgs, ListArgs, NotesArgs, ReasonArgs, UpdateArgs,
};
use crate::cli::helpers::{open_session, parse_patch, Session};
use crate::cli::table::{print_list, print_summary};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::aggregate::LotQuantities;
use crate::core::compliance::ResultStatus;
use crate::core::entity::{Entity, Severity};
use crate::core::identity::EntityId;
use crate::core::error::QualityError;
use crate::core::workflow::{Action, Lifecycle};
use crate::entities::{Inspection, InspectionResult, InspectionType, Ncr, QcTemplate};
use crate::service::Measurement;

#[derive(Subcommand, Debug)]
pub enum InspCommands {
    /// List inspections
    List(InspListArgs),

    /// Create an inspection in draft
    New(NewArgs),

    /// Show an inspection
    Show(KeyArgs),

    /// Change content fields (title, part_number, inspector, remarks, ...)
    Update(UpdateArgs),

    /// Delete a draft inspection together with its results
    Delete(KeyArgs),

    /// Plan the inspection (draft -> scheduled)
    Schedule(ScheduleArgs),

    /// Begin inspecting; stamps the start time
    Start(KeyArgs),

    /// Finish inspecting; freezes the tally and derives the overall result
    Submit(KeyArgs),

    /// Approve a completed inspection
    Approve(NotesArgs),

    /// Reject a completed inspection
    Reject(ReasonArgs),

    /// Cancel before completion
    Cancel(CancelArgs),

    /// Actions available from the current status
    Actions(KeyArgs),

    /// Record lot dispositions
    Quantities(QuantitiesArgs),

    /// Result counts, defects and rates
    Stats(KeyArgs),

    /// Create one pending result per parameter of an active template
    Seed(SeedArgs),

    /// Link an NCR to this inspection, or create one with --title
    RaiseNcr(RaiseNcrArgs),

    /// Per-parameter results
    #[command(subcommand)]
    Result(ResultCommands),
}

#[derive(Subcommand, Debug)]
pub enum ResultCommands {
    /// List the results of an inspection in sequence order
    List(KeyArgs),

    /// Add a result to an inspection
    Add(ResultAddArgs),

    /// Record a measured value and re-evaluate
    Set(ResultSetArgs),

    /// Change result fields (limits, name, remarks) and re-evaluate
    Update(ResultUpdateArgs),

    /// Remove a result
    Rm(ResultKeyArgs),
}

#[derive(clap::Args, Debug)]
pub struct InspListArgs {
    #[command(flatten)]
    pub common: ListArgs,

    /// Only inspections using this template ID
    #[arg(long)]
    pub template: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Business number, e.g. INSP-2025-042
    pub number: String,

    #[arg(long, short = 't')]
    pub title: String,

    /// Inspection type (incoming, in_process, final, first_article, audit)
    #[arg(long = "type", default_value = "incoming")]
    pub inspection_type: InspectionType,

    /// QC template (ID or `CODE vN`) this inspection follows
    #[arg(long)]
    pub template: Option<String>,

    #[arg(long)]
    pub part: Option<String>,

    #[arg(long)]
    pub lot: Option<String>,

    #[arg(long)]
    pub supplier: Option<String>,

    #[arg(long)]
    pub inspector: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ScheduleArgs {
    /// Record ID or business number
    pub key: String,

    /// Scheduled date (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

#[derive(clap::Args, Debug)]
pub struct CancelArgs {
    /// Record ID or business number
    pub key: String,

    #[arg(long, short = 'r')]
    pub reason: Option<String>,
}

/// Quantities not given keep their recorded value
#[derive(clap::Args, Debug)]
pub struct QuantitiesArgs {
    /// Record ID or business number
    pub key: String,

    #[arg(long)]
    pub lot_quantity: Option<u32>,

    #[arg(long)]
    pub sample_size: Option<u32>,

    #[arg(long)]
    pub accepted: Option<u32>,

    #[arg(long)]
    pub rejected: Option<u32>,

    #[arg(long)]
    pub rework: Option<u32>,

    #[arg(long)]
    pub scrap: Option<u32>,
}

impl QuantitiesArgs {
    fn merge_onto(&self, mut quantities: LotQuantities) -> LotQuantities {
        if self.lot_quantity.is_some() {
            quantities.lot_quantity = self.lot_quantity;
        }
        if self.sample_size.is_some() {
            quantities.sample_size = self.sample_size;
        }
        quantities.accepted = self.accepted.unwrap_or(quantities.accepted);
        quantities.rejected = self.rejected.unwrap_or(quantities.rejected);
        quantities.rework = self.rework.unwrap_or(quantities.rework);
        quantities.scrap = self.scrap.unwrap_or(quantities.scrap);
        quantities
    }
}

#[derive(clap::Args, Debug)]
pub struct SeedArgs {
    /// Inspection ID or business number
    pub key: String,

    /// Active QC template (ID or `CODE vN`)
    #[arg(long)]
    pub template: String,
}

#[derive(clap::Args, Debug)]
pub struct RaiseNcrArgs {
    #[command(flatten)]
    pub link: LinkArgs,

    /// Create a new NCR with this title instead of linking an existing one
    #[arg(long, short = 't', conflicts_with_all = ["to_id", "to_number"])]
    pub title: Option<String>,

    /// Severity of the created NCR
    #[arg(long, short = 'S', default_value = "major")]
    pub severity: Severity,
}

#[derive(clap::Args, Debug)]
pub struct ResultKeyArgs {
    /// Result ID
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct ResultAddArgs {
    /// Inspection ID or business number
    pub key: String,

    /// Parameter name
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub value: Option<f64>,

    #[arg(long)]
    pub text: Option<String>,

    /// Inspector's verdict, used when no numeric value is given
    #[arg(long)]
    pub status: Option<ResultStatus>,

    #[arg(long)]
    pub unit: Option<String>,

    #[arg(long)]
    pub target: Option<f64>,

    /// Lower specification limit
    #[arg(long, allow_hyphen_values = true)]
    pub lower: Option<f64>,

    /// Upper specification limit
    #[arg(long, allow_hyphen_values = true)]
    pub upper: Option<f64>,

    /// Defect severity if the result fails
    #[arg(long, short = 'S')]
    pub severity: Option<Severity>,

    #[arg(long)]
    pub remarks: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ResultSetArgs {
    /// Result ID
    pub id: String,

    #[arg(long, allow_hyphen_values = true)]
    pub value: Option<f64>,

    #[arg(long)]
    pub text: Option<String>,

    #[arg(long)]
    pub status: Option<ResultStatus>,
}

#[derive(clap::Args, Debug)]
pub struct ResultUpdateArgs {
    /// Result ID
    pub id: String,

    /// Fields to change as YAML, or `@file.yaml`
    #[arg(long, short = 'p', alias = "set")]
    pub patch: String,
}

fn parse_result_id(id: &str) -> Result<EntityId> {
    Ok(EntityId::parse(id).map_err(QualityError::from)?)
}

pub fn run(cmd: InspCommands, global: &GlobalOpts) -> Result<()> {
    let mut session = open_session(global)?;

    match cmd {
        InspCommands::List(args) => {
            let mut filter = args.common.filter();
            if let Some(template) = &args.template {
                filter = filter.with_ref("template_id", template);
            }
            run_list::<Inspection>(&session.service, filter, args.common.count, global)
        }
        InspCommands::New(args) => {
            let mut inspection = Inspection::new(args.number, args.title, args.inspection_type, &session.actor);
            if let Some(key) = &args.template {
                let template: QcTemplate = session.service.resolve(key)?;
                inspection = inspection.with_template(Some(template.id.clone()), template.business_number());
                if inspection.part_number.is_none() {
                    inspection.part_number = template.part_number.clone();
                }
            }
            if args.part.is_some() {
                inspection.part_number = args.part;
            }
            inspection.lot_number = args.lot;
            inspection.supplier = args.supplier;
            inspection.inspector = args.inspector;
            let inspection = session.service.create(inspection)?;
            report_created(&inspection, global);
            Ok(())
        }
        InspCommands::Show(args) => run_show::<Inspection>(&session.service, &args.key, global),
        InspCommands::Update(args) => run_update::<Inspection>(&mut session, &args, global),
        InspCommands::Delete(args) => {
            let inspection: Inspection = session.service.resolve(&args.key)?;
            session.service.delete_inspection(&inspection.id)?;
            report_deleted(&inspection, global);
            Ok(())
        }
        InspCommands::Schedule(args) => {
            let date = args.date;
            run_transition::<Inspection, _>(&mut session, &args.key, Action::Schedule, global, |i, actor, now| {
                i.schedule(actor, now, date)
            })?;
            Ok(())
        }
        InspCommands::Start(args) => {
            run_transition::<Inspection, _>(&mut session, &args.key, Action::Start, global, |i, actor, now| {
                i.start(actor, now)
            })?;
            Ok(())
        }
        InspCommands::Submit(args) => {
            let inspection: Inspection = session.service.resolve(&args.key)?;
            let from = inspection.state();
            let actor = session.actor.clone();
            let inspection = session.service.submit_inspection(&inspection.id, &actor)?;
            report_transition(&inspection, from, Action::Submit, global);
            if !global.quiet {
                println!(
                    "   {} {}  {} {}",
                    style("result").dim(),
                    style(inspection.overall_result).bold(),
                    style("minutes").dim(),
                    inspection
                        .duration_minutes
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
            Ok(())
        }
        InspCommands::Approve(args) => {
            let comment = args.notes;
            run_transition::<Inspection, _>(&mut session, &args.key, Action::Approve, global, |i, actor, now| {
                i.approve(actor, now, comment)
            })?;
            Ok(())
        }
        InspCommands::Reject(args) => {
            let reason = args.reason;
            run_transition::<Inspection, _>(&mut session, &args.key, Action::Reject, global, |i, actor, now| {
                i.reject(actor, now, reason)
            })?;
            Ok(())
        }
        InspCommands::Cancel(args) => {
            let reason = args.reason;
            run_transition::<Inspection, _>(&mut session, &args.key, Action::Cancel, global, |i, actor, now| {
                i.cancel(actor, now, reason)
            })?;
            Ok(())
        }
        InspCommands::Actions(args) => run_actions::<Inspection>(&session.service, &args.key),
        InspCommands::Quantities(args) => {
            let inspection: Inspection = session.service.resolve(&args.key)?;
            let quantities = args.merge_onto(inspection.quantities);
            let inspection = session.service.record_quantities(&inspection.id, quantities)?;
            if !global.quiet {
                println!(
                    "{} Recorded quantities on {}",
                    style("✓").green(),
                    style(&inspection.inspection_number).cyan()
                );
            }
            Ok(())
        }
        InspCommands::Stats(args) => {
            let inspection: Inspection = session.service.resolve(&args.key)?;
            let stats = session.service.statistics(&inspection.id)?;
            let rows = [
                ("Checked", stats.parameters_checked.to_string()),
                ("Passed", stats.parameters_passed.to_string()),
                ("Failed", stats.parameters_failed.to_string()),
                ("Warning", stats.parameters_warning.to_string()),
                ("Not applicable", stats.parameters_not_applicable.to_string()),
                ("Pending", stats.parameters_pending.to_string()),
                ("Pass rate %", format!("{:.2}", stats.pass_rate)),
                ("Fail rate %", format!("{:.2}", stats.fail_rate)),
                ("Critical defects", stats.critical_defects.to_string()),
                ("Major defects", stats.major_defects.to_string()),
                ("Minor defects", stats.minor_defects.to_string()),
                (
                    "Acceptance rate %",
                    stats
                        .acceptance_rate
                        .map(|r| format!("{:.2}", r))
                        .unwrap_or_else(|| "-".to_string()),
                ),
                ("Overall result", stats.overall_result.to_string()),
            ];
            let title = format!("Inspection {}", inspection.inspection_number);
            print_summary(&title, &rows, &stats, global.format)
        }
        InspCommands::Seed(args) => {
            let inspection: Inspection = session.service.resolve(&args.key)?;
            let template: QcTemplate = session.service.resolve(&args.template)?;
            let actor = session.actor.clone();
            let seeded = session
                .service
                .seed_results_from_template(&inspection.id, &template.id, &actor)?;
            if !global.quiet {
                println!(
                    "{} Seeded {} result(s) from {}",
                    style("✓").green(),
                    style(seeded.len()).cyan(),
                    style(template.business_number().unwrap_or_default()).cyan()
                );
            }
            Ok(())
        }
        InspCommands::RaiseNcr(args) => {
            let inspection: Inspection = session.service.resolve(&args.link.key)?;
            let ncr_label = match args.title {
                Some(title) => {
                    let ncr = Ncr::new(title, args.severity, &session.actor);
                    let ncr = session.service.ncr_from_inspection(&inspection.id, ncr)?;
                    report_created(&ncr, global);
                    ncr.ncr_number
                }
                None => {
                    let link = args.link.backref()?;
                    let linked = session.service.raise_ncr(&inspection.id, link)?;
                    linked.ncr.label().unwrap_or_default()
                }
            };
            if !global.quiet {
                println!(
                    "{} Inspection {} raised NCR {}",
                    style("✓").green(),
                    style(&inspection.inspection_number).cyan(),
                    style(ncr_label).cyan()
                );
            }
            Ok(())
        }
        InspCommands::Result(cmd) => run_result(&mut session, cmd, global),
    }
}

fn run_result(session: &mut Session, cmd: ResultCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ResultCommands::List(args) => {
            let inspection: Inspection = session.service.resolve(&args.key)?;
            let results = session.service.results(&inspection.id)?;
            print_list(&results, global.format, global.quiet)
        }
        ResultCommands::Add(args) => {
            let inspection: Inspection = session.service.resolve(&args.key)?;
            let mut result = InspectionResult::new(inspection.id.clone(), 0, args.name, &session.actor);
            result.numeric_value = args.value;
            result.text_value = args.text;
            result.manual_status = args.status;
            result.unit = args.unit;
            result.target = args.target;
            result.lower_limit = args.lower;
            result.upper_limit = args.upper;
            result.severity = args.severity;
            result.remarks = args.remarks;
            let result = session.service.add_result(&inspection.id, result)?;
            if global.quiet || global.format == OutputFormat::Id {
                println!("{}", result.id);
            } else {
                println!(
                    "{} Added result #{} {} ({})",
                    style("✓").green(),
                    result.sequence,
                    style(&result.parameter_name).cyan(),
                    style(result.status).bold()
                );
                println!("   {}", style(&result.id).dim());
            }
            Ok(())
        }
        ResultCommands::Set(args) => {
            let id = parse_result_id(&args.id)?;
            let measurement = Measurement {
                numeric_value: args.value,
                text_value: args.text,
                manual_status: args.status,
            };
            let actor = session.actor.clone();
            let result = session.service.update_result_value(&id, &actor, measurement)?;
            if !global.quiet {
                println!(
                    "{} {} is {}",
                    style("✓").green(),
                    style(&result.parameter_name).cyan(),
                    style(result.status).bold()
                );
            }
            Ok(())
        }
        ResultCommands::Update(args) => {
            let id = parse_result_id(&args.id)?;
            let patch = parse_patch(&args.patch)?;
            let result = session.service.update_result(&id, patch)?;
            if !global.quiet {
                println!(
                    "{} Updated {} ({})",
                    style("✓").green(),
                    style(&result.parameter_name).cyan(),
                    style(result.status).bold()
                );
            }
            Ok(())
        }
        ResultCommands::Rm(args) => {
            let id = parse_result_id(&args.id)?;
            session.service.delete_result(&id)?;
            if !global.quiet {
                println!("{} Removed result {}", style("✓").green(), style(&id).dim());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantities_merge_keeps_unset_fields() {
        let args = QuantitiesArgs {
            key: "INSP-1".to_string(),
            lot_quantity: None,
            sample_size: Some(20),
            accepted: Some(18),
            rejected: None,
            rework: None,
            scrap: Some(2),
        };
        let existing = LotQuantities {
            lot_quantity: Some(500),
            rejected: 1,
            ..Default::default()
        };
        let merged = args.merge_onto(existing);
        assert_eq!(merged.lot_quantity, Some(500));
        assert_eq!(merged.sample_size, Some(20));
        assert_eq!(merged.accepted, 18);
        assert_eq!(merged.rejected, 1);
        assert_eq!(merged.scrap, 2);
    }
}
