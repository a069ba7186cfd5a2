//! `qms nc` command - Non-conformances with investigation and CAPA escalation

use chrono::NaiveDate;
use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::commands::common::{
    report_created, report_transition, run_actions, run_delete, run_list, run_show,
    run_transition, run_update, KeyArgs, LinkArgs, ListArgs, NotesArgs, UpdateArgs,
};
use crate::cli::helpers::open_session;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::entity::{Priority, Severity};
use crate::core::workflow::{Action, Lifecycle};
use crate::entities::{
    ContainmentAction, DetectionSource, Disposition, DispositionDecision, NonConformance,
};

#[derive(Subcommand, Debug)]
pub enum NcCommands {
    /// List non-conformances
    List(ListArgs),

    /// Record a new non-conformance in draft
    New(NewArgs),

    /// Show a non-conformance's details
    Show(KeyArgs),

    /// Change content fields
    Update(UpdateArgs),

    /// Delete a draft non-conformance
    Delete(KeyArgs),

    /// Submit for review (draft -> submitted)
    Submit(KeyArgs),

    /// Begin the investigation (submitted -> under_investigation)
    Investigate(KeyArgs),

    /// Escalate to CAPA (under_investigation -> capa_required)
    RequireCapa(LinkArgs),

    /// Close after investigation or CAPA
    Close(NotesArgs),

    /// Cancel from any open status
    Cancel(CancelArgs),

    /// Actions available from the current status
    Actions(KeyArgs),

    /// Record an immediate containment action
    Contain(ContainArgs),

    /// Mark containment action N completed
    ContainDone(ContainDoneArgs),

    /// Record a disposition decision for part of the affected quantity
    Dispose(DisposeArgs),
}

#[derive(clap::Args, Debug)]
pub struct ContainArgs {
    /// Record ID or business number
    pub key: String,

    /// What was done, e.g. "Quarantine lot 7 in MRB cage"
    #[arg(long, short = 'a')]
    pub action: String,

    #[arg(long)]
    pub owner: Option<String>,

    /// Due date (YYYY-MM-DD)
    #[arg(long)]
    pub due: Option<NaiveDate>,
}

#[derive(clap::Args, Debug)]
pub struct ContainDoneArgs {
    /// Record ID or business number
    pub key: String,

    /// Containment action number
    pub sequence: u32,

    /// Outcome or evidence
    #[arg(long, short = 'n')]
    pub notes: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct DisposeArgs {
    /// Record ID or business number
    pub key: String,

    /// use_as_is, rework, repair, scrap, return_to_supplier, ...
    #[arg(long, short = 'D')]
    pub decision: DispositionDecision,

    #[arg(long)]
    pub quantity: u32,

    #[arg(long)]
    pub cost: Option<f64>,

    #[arg(long, short = 'j')]
    pub justification: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Business number, e.g. NC-2025-014
    pub number: String,

    #[arg(long, short = 't')]
    pub title: String,

    /// Severity (minor, major, critical)
    #[arg(long, short = 'S', default_value = "minor")]
    pub severity: Severity,

    /// Priority (low, medium, high)
    #[arg(long, short = 'p', default_value = "medium")]
    pub priority: Priority,

    /// Where it was detected (incoming_inspection, in_process, customer, ...)
    #[arg(long, default_value = "in_process")]
    pub detected_in: DetectionSource,

    #[arg(long, short = 'd')]
    pub description: Option<String>,

    #[arg(long)]
    pub part: Option<String>,

    #[arg(long)]
    pub lot: Option<String>,

    /// Number of affected units; caps the dispositioned quantity
    #[arg(long)]
    pub quantity: Option<u32>,
}

#[derive(clap::Args, Debug)]
pub struct CancelArgs {
    /// Record ID or business number
    pub key: String,

    #[arg(long, short = 'r')]
    pub reason: Option<String>,
}

pub fn run(cmd: NcCommands, global: &GlobalOpts) -> Result<()> {
    let mut session = open_session(global)?;

    match cmd {
        NcCommands::List(args) => {
            run_list::<NonConformance>(&session.service, args.filter(), args.count, global)
        }
        NcCommands::New(args) => {
            let mut nc = NonConformance::new(args.number, args.title, args.severity, &session.actor);
            nc.priority = args.priority;
            nc.detected_in = args.detected_in;
            nc.description = args.description;
            nc.part_number = args.part;
            nc.lot_number = args.lot;
            nc.quantity_affected = args.quantity;
            let nc = session.service.create(nc)?;
            report_created(&nc, global);
            Ok(())
        }
        NcCommands::Show(args) => run_show::<NonConformance>(&session.service, &args.key, global),
        NcCommands::Update(args) => run_update::<NonConformance>(&mut session, &args, global),
        NcCommands::Delete(args) => run_delete::<NonConformance>(&mut session, &args.key, global),
        NcCommands::Submit(args) => {
            run_transition::<NonConformance, _>(&mut session, &args.key, Action::Submit, global, |nc, actor, now| {
                nc.submit(actor, now)
            })?;
            Ok(())
        }
        NcCommands::Investigate(args) => {
            run_transition::<NonConformance, _>(&mut session, &args.key, Action::Investigate, global, |nc, actor, now| {
                nc.investigate(actor, now)
            })?;
            Ok(())
        }
        NcCommands::RequireCapa(args) => {
            let link = args.backref()?;
            let nc: NonConformance = session.service.resolve(&args.key)?;
            let from = nc.state();
            let actor = session.actor.clone();
            let nc = session.service.require_capa(&nc.id, &actor, link)?;
            report_transition(&nc, from, Action::RequireCapa, global);
            Ok(())
        }
        NcCommands::Close(args) => {
            let notes = args.notes;
            run_transition::<NonConformance, _>(&mut session, &args.key, Action::Close, global, |nc, actor, now| {
                nc.close(actor, now, notes)
            })?;
            Ok(())
        }
        NcCommands::Cancel(args) => {
            let reason = args.reason;
            run_transition::<NonConformance, _>(&mut session, &args.key, Action::Cancel, global, |nc, actor, now| {
                nc.cancel(actor, now, reason)
            })?;
            Ok(())
        }
        NcCommands::Actions(args) => run_actions::<NonConformance>(&session.service, &args.key),
        NcCommands::Contain(args) => {
            let nc: NonConformance = session.service.resolve(&args.key)?;
            let mut action = ContainmentAction::new(args.action, &session.actor, chrono::Utc::now());
            action.owner = args.owner;
            action.due_date = args.due;
            let nc = session.service.add_containment_action(&nc.id, action)?;
            if let Some(added) = nc.containment_actions.last() {
                report_step(global, &nc, &format!("Added containment action #{}", added.sequence));
            }
            Ok(())
        }
        NcCommands::ContainDone(args) => {
            let nc: NonConformance = session.service.resolve(&args.key)?;
            let actor = session.actor.clone();
            let nc = session
                .service
                .complete_containment_action(&nc.id, args.sequence, &actor, args.notes)?;
            report_step(global, &nc, &format!("Completed containment action #{}", args.sequence));
            Ok(())
        }
        NcCommands::Dispose(args) => {
            let nc: NonConformance = session.service.resolve(&args.key)?;
            let mut disposition =
                Disposition::new(args.decision, args.quantity, &session.actor, chrono::Utc::now());
            disposition.cost = args.cost;
            disposition.justification = args.justification;
            let nc = session.service.add_disposition(&nc.id, disposition)?;
            report_step(
                global,
                &nc,
                &format!(
                    "Dispositioned {} as {} ({} of {} dispositioned)",
                    args.quantity,
                    args.decision,
                    nc.disposed_quantity(),
                    nc.quantity_affected.map(|q| q.to_string()).unwrap_or_else(|| "?".to_string())
                ),
            );
            Ok(())
        }
    }
}

fn report_step(global: &GlobalOpts, nc: &NonConformance, message: &str) {
    if global.quiet || global.format == OutputFormat::Id {
        return;
    }
    println!("{} {} on {}", style("✓").green(), message, style(&nc.nc_number).cyan());
}
