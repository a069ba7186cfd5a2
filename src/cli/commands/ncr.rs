//! `qms ncr` command - Non-conformance report management

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::commands::common::{
    report_created, run_actions, run_delete, run_list, run_show, run_transition, run_update,
    KeyArgs, LinkArgs, ListArgs, NotesArgs, UpdateArgs,
};
use crate::cli::helpers::{open_session, opt};
use crate::cli::table::print_summary;
use crate::cli::GlobalOpts;
use crate::core::entity::Severity;
use crate::core::workflow::Action;
use crate::entities::{Ncr, NcrCategory};

#[derive(Subcommand, Debug)]
pub enum NcrCommands {
    /// List NCRs with filtering
    List(NcrListArgs),

    /// Create a new NCR (numbered NCR-<year>-<seq> unless --number is given)
    New(NewArgs),

    /// Show an NCR's details
    Show(KeyArgs),

    /// Change content fields
    Update(UpdateArgs),

    /// Delete an NCR that is still open
    Delete(KeyArgs),

    /// Begin working the NCR (open -> in_progress)
    Start(KeyArgs),

    /// Close the NCR (in_progress -> closed)
    Close(NotesArgs),

    /// Mark the NCR as needing a CAPA, optionally naming it
    LinkCapa(LinkArgs),

    /// Actions available from the current status
    Actions(KeyArgs),

    /// Counts by status and severity
    Summary,
}

#[derive(clap::Args, Debug)]
pub struct NcrListArgs {
    #[command(flatten)]
    pub common: ListArgs,

    /// Filter by severity
    #[arg(long)]
    pub severity: Option<Severity>,

    /// Only NCRs raised from this inspection ID
    #[arg(long)]
    pub inspection: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// NCR title
    #[arg(long, short = 't')]
    pub title: String,

    /// Severity (minor, major, critical)
    #[arg(long, short = 'S', default_value = "minor")]
    pub severity: Severity,

    /// Category (material, process, equipment, human_error, ...)
    #[arg(long, short = 'c', default_value = "process")]
    pub category: NcrCategory,

    /// Explicit NCR number instead of the generated one
    #[arg(long)]
    pub number: Option<String>,

    #[arg(long, short = 'd')]
    pub description: Option<String>,

    #[arg(long)]
    pub part: Option<String>,

    #[arg(long)]
    pub lot: Option<String>,

    /// Where the deviation was detected
    #[arg(long)]
    pub detected_at: Option<String>,
}

impl NewArgs {
    /// Build the unsaved NCR
    pub fn into_ncr(self, author: &str) -> Ncr {
        let mut ncr = Ncr::new(self.title, self.severity, author);
        ncr.category = self.category;
        ncr.ncr_number = self.number.unwrap_or_default();
        ncr.description = self.description;
        ncr.part_number = self.part;
        ncr.lot_number = self.lot;
        ncr.detected_at = self.detected_at;
        ncr
    }
}

pub fn run(cmd: NcrCommands, global: &GlobalOpts) -> Result<()> {
    let mut session = open_session(global)?;

    match cmd {
        NcrCommands::List(args) => {
            let mut filter = args.common.filter();
            if let Some(inspection) = &args.inspection {
                filter = filter.with_ref("inspection_id", inspection);
            }
            match args.severity {
                None => run_list::<Ncr>(&session.service, filter, args.common.count, global),
                Some(severity) => {
                    // Severity is not a generic filter; narrow before the limit applies
                    let limit = filter.limit.take();
                    let mut ncrs: Vec<Ncr> = session.service.list(&filter)?;
                    ncrs.retain(|n| n.severity == severity);
                    if let Some(limit) = limit {
                        ncrs.truncate(limit);
                    }
                    if args.common.count {
                        println!("{}", ncrs.len());
                        return Ok(());
                    }
                    crate::cli::table::print_list(&ncrs, global.format, global.quiet)
                }
            }
        }
        NcrCommands::New(args) => {
            let ncr = args.into_ncr(&session.actor);
            let ncr = session.service.create_ncr(ncr)?;
            report_created(&ncr, global);
            Ok(())
        }
        NcrCommands::Show(args) => run_show::<Ncr>(&session.service, &args.key, global),
        NcrCommands::Update(args) => run_update::<Ncr>(&mut session, &args, global),
        NcrCommands::Delete(args) => run_delete::<Ncr>(&mut session, &args.key, global),
        NcrCommands::Start(args) => {
            run_transition::<Ncr, _>(&mut session, &args.key, Action::Start, global, |n, actor, now| {
                n.start(actor, now)
            })?;
            Ok(())
        }
        NcrCommands::Close(args) => {
            let notes = args.notes;
            run_transition::<Ncr, _>(&mut session, &args.key, Action::Close, global, |n, actor, now| {
                n.close(actor, now, notes)
            })?;
            Ok(())
        }
        NcrCommands::LinkCapa(args) => {
            let link = args.backref()?;
            let ncr: Ncr = session.service.resolve(&args.key)?;
            let ncr = session.service.link_capa(&ncr.id, link)?;
            if !global.quiet {
                println!(
                    "{} NCR {} requires a CAPA {}",
                    style("✓").green(),
                    style(&ncr.ncr_number).cyan(),
                    style(opt(ncr.capa.label())).dim()
                );
            }
            Ok(())
        }
        NcrCommands::Actions(args) => run_actions::<Ncr>(&session.service, &args.key),
        NcrCommands::Summary => {
            let summary = session.service.ncr_summary()?;
            let mut rows = vec![
                ("Total", summary.total.to_string()),
                ("Open", summary.open.to_string()),
                ("Closed", summary.closed.to_string()),
            ];
            for (severity, count) in &summary.by_severity {
                rows.push((severity.as_str(), count.to_string()));
            }
            rows.push((
                "Avg. days to close",
                summary
                    .average_resolution_days
                    .map(|d| format!("{:.2}", d))
                    .unwrap_or_else(|| "-".to_string()),
            ));
            print_summary("NCR summary", &rows, &summary, global.format)
        }
    }
}
