//! `qms capa` - the shared action lifecycle plus action items,
//! effectiveness reviews and the CAPA summary

use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::commands::action::{self, ActionCommands};
use crate::cli::helpers::{open_session, opt, truncate_str};
use crate::cli::table::{print_summary, print_table};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::entities::{ActionItem, Capa, EffectivenessReview, ItemKind, ItemStatus};

#[derive(Subcommand, Debug)]
pub enum CapaCommands {
    #[command(flatten)]
    Lifecycle(ActionCommands),

    /// Planned tasks within a CAPA
    #[command(subcommand)]
    Item(ItemCommands),

    /// Record an effectiveness review (implemented, pending_verification or verified)
    Review(ReviewArgs),

    /// Counts by status, type and priority, overdue and effectiveness rate
    Summary,
}

#[derive(Subcommand, Debug)]
pub enum ItemCommands {
    /// List a CAPA's action items
    List(ItemListArgs),

    /// Add an action item
    Add(ItemAddArgs),

    /// Move action item N to a new status
    Set(ItemSetArgs),
}

#[derive(clap::Args, Debug)]
pub struct ItemListArgs {
    /// CAPA ID or business number
    pub key: String,
}

#[derive(clap::Args, Debug)]
pub struct ItemAddArgs {
    /// CAPA ID or business number
    pub key: String,

    #[arg(long, short = 'd')]
    pub description: String,

    /// root_cause, corrective, preventive or verification
    #[arg(long, default_value = "corrective")]
    pub kind: ItemKind,

    #[arg(long)]
    pub owner: Option<String>,

    /// Due date (YYYY-MM-DD)
    #[arg(long)]
    pub due: Option<NaiveDate>,
}

#[derive(clap::Args, Debug)]
pub struct ItemSetArgs {
    /// CAPA ID or business number
    pub key: String,

    /// Action item number
    pub sequence: u32,

    /// not_started, in_progress, completed, delayed or cancelled
    #[arg(long, short = 's')]
    pub status: ItemStatus,

    #[arg(long, short = 'e')]
    pub evidence: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ReviewArgs {
    /// CAPA ID or business number
    pub key: String,

    /// The actions stopped the problem
    #[arg(long)]
    pub effective: bool,

    /// The problem was seen again during the review window
    #[arg(long)]
    pub recurrence: bool,

    #[arg(long)]
    pub further_action: bool,

    #[arg(long, short = 'c')]
    pub conclusion: String,

    /// Criterion checked; repeat for several
    #[arg(long = "criterion")]
    pub criteria: Vec<String>,

    /// Date of the next review (YYYY-MM-DD)
    #[arg(long)]
    pub next: Option<NaiveDate>,
}

fn report(global: &GlobalOpts, capa: &Capa, message: &str) {
    if global.quiet || global.format == OutputFormat::Id {
        return;
    }
    println!("{} {} on {}", style("✓").green(), message, style(&capa.capa_number).cyan());
}

pub fn run(cmd: CapaCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        CapaCommands::Lifecycle(cmd) => action::run::<Capa>(cmd, global),
        CapaCommands::Item(cmd) => run_item(cmd, global),
        CapaCommands::Review(args) => run_review(args, global),
        CapaCommands::Summary => run_summary(global),
    }
}

fn run_item(cmd: ItemCommands, global: &GlobalOpts) -> Result<()> {
    let mut session = open_session(global)?;

    match cmd {
        ItemCommands::List(args) => {
            let capa: Capa = session.service.resolve(&args.key)?;
            let rows = capa
                .action_items
                .iter()
                .map(|item| {
                    vec![
                        item.sequence.to_string(),
                        truncate_str(&item.description, 40),
                        item.kind.to_string(),
                        item.status.to_string(),
                        opt(item.owner.as_ref()),
                        opt(item.due_date),
                    ]
                })
                .collect();
            print_table(
                None,
                &["#", "DESCRIPTION", "KIND", "STATUS", "OWNER", "DUE"],
                rows,
                &capa.action_items,
                global.format,
            )
        }
        ItemCommands::Add(args) => {
            let capa: Capa = session.service.resolve(&args.key)?;
            let mut item = ActionItem::new(args.description, args.kind);
            item.owner = args.owner;
            item.due_date = args.due;
            let capa = session.service.add_action_item(&capa.id, item)?;
            if let Some(added) = capa.action_items.last() {
                report(global, &capa, &format!("Added action item #{}", added.sequence));
            }
            Ok(())
        }
        ItemCommands::Set(args) => {
            let capa: Capa = session.service.resolve(&args.key)?;
            let actor = session.actor.clone();
            let capa = session.service.set_action_item_status(
                &capa.id,
                args.sequence,
                args.status,
                &actor,
                args.evidence,
            )?;
            let progress = capa.item_progress();
            report(
                global,
                &capa,
                &format!(
                    "Action item #{} is {} ({}/{} done, {}%)",
                    args.sequence, args.status, progress.completed, progress.total, progress.percent
                ),
            );
            Ok(())
        }
    }
}

fn run_review(args: ReviewArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = open_session(global)?;
    let capa: Capa = session.service.resolve(&args.key)?;

    let mut review = EffectivenessReview::new(args.effective, args.conclusion, &session.actor, Utc::now());
    review.recurrence = args.recurrence;
    review.further_action_required = args.further_action;
    review.criteria = args.criteria;
    review.next_review = args.next;
    let capa = session.service.add_effectiveness_review(&capa.id, review)?;

    let verdict = if args.effective { "effective" } else { "not effective" };
    report(global, &capa, &format!("Recorded review ({})", verdict));
    Ok(())
}

fn run_summary(global: &GlobalOpts) -> Result<()> {
    let session = open_session(global)?;
    let summary = session.service.capa_summary()?;

    let mut rows = vec![
        ("Total", summary.total.to_string()),
        ("Open", summary.open.to_string()),
        ("Closed", summary.closed.to_string()),
        ("Overdue", summary.overdue.to_string()),
    ];
    for (status, count) in &summary.by_status {
        rows.push((status.as_str(), count.to_string()));
    }
    for (priority, count) in &summary.by_priority {
        rows.push((priority.as_str(), count.to_string()));
    }
    rows.push((
        "Avg. days to close",
        summary
            .average_completion_days
            .map(|d| format!("{:.2}", d))
            .unwrap_or_else(|| "-".to_string()),
    ));
    rows.push((
        "Effectiveness",
        summary
            .effectiveness_rate
            .map(|r| format!("{:.1}%", r))
            .unwrap_or_else(|| "-".to_string()),
    ));
    print_summary("CAPA summary", &rows, &summary, global.format)
}
