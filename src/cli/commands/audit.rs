//! `qms audit` command - Audit plans and findings

use chrono::NaiveDate;
use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::commands::common::{
    report_created, run_actions, run_delete, run_list, run_show, run_transition,
    run_update, KeyArgs, LinkArgs, ListArgs, ReasonArgs, UpdateArgs, VerifyArgs,
};
use crate::cli::helpers::{open_session, opt, Session};
use crate::cli::GlobalOpts;
use crate::core::entity::{Entity, Severity};
use crate::core::links::BackRef;
use crate::core::workflow::Action;
use crate::entities::{AuditFinding, AuditPlan, AuditType, FindingType};

#[derive(Subcommand, Debug)]
pub enum AuditCommands {
    /// Audit plans (draft -> scheduled -> in_progress -> completed -> closed)
    #[command(subcommand)]
    Plan(PlanCommands),

    /// Audit findings (open -> acknowledged -> verified -> closed)
    #[command(subcommand)]
    Finding(FindingCommands),
}

#[derive(Subcommand, Debug)]
pub enum PlanCommands {
    /// List audit plans
    List(ListArgs),

    /// Create an audit plan in draft
    New(PlanNewArgs),

    /// Show an audit plan
    Show(KeyArgs),

    /// Change content fields
    Update(UpdateArgs),

    /// Delete a plan still in draft
    Delete(KeyArgs),

    /// Fix the audit dates (draft -> scheduled)
    Schedule(ScheduleArgs),

    /// Begin fieldwork (scheduled -> in_progress)
    Start(KeyArgs),

    /// Finish fieldwork (in_progress -> completed)
    Complete(CompleteArgs),

    /// Close a completed audit
    Close(KeyArgs),

    /// Cancel from any open status
    Cancel(CancelArgs),

    /// Actions available from the current status
    Actions(KeyArgs),
}

#[derive(Subcommand, Debug)]
pub enum FindingCommands {
    /// List findings
    List(FindingListArgs),

    /// Record a finding
    New(FindingNewArgs),

    /// Show a finding
    Show(KeyArgs),

    /// Change content fields
    Update(UpdateArgs),

    /// Delete a finding still open
    Delete(KeyArgs),

    /// Auditee acknowledges (open -> acknowledged)
    Acknowledge(AcknowledgeArgs),

    /// Verify the response (acknowledged -> verified)
    Verify(VerifyArgs),

    /// Close a verified finding
    Close(KeyArgs),

    /// Reject the finding (open or acknowledged -> rejected)
    Reject(ReasonArgs),

    /// Note that a CAPA answers this finding
    RaiseCapa(LinkArgs),

    /// Actions available from the current status
    Actions(KeyArgs),
}

#[derive(clap::Args, Debug)]
pub struct PlanNewArgs {
    /// Business number, e.g. AUD-2025-003
    pub number: String,

    #[arg(long, short = 't')]
    pub title: String,

    /// Audit type (internal, external, supplier, certification, ...)
    #[arg(long = "type", default_value = "internal")]
    pub audit_type: AuditType,

    #[arg(long)]
    pub scope: Option<String>,

    /// Standard audited against, e.g. ISO 9001:2015
    #[arg(long)]
    pub standard: Option<String>,

    #[arg(long)]
    pub lead_auditor: Option<String>,

    /// Planned start (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Planned end (YYYY-MM-DD); must not precede the start
    #[arg(long)]
    pub end: Option<NaiveDate>,
}

#[derive(clap::Args, Debug)]
pub struct ScheduleArgs {
    /// Record ID or business number
    pub key: String,

    #[arg(long)]
    pub start: Option<NaiveDate>,

    #[arg(long)]
    pub end: Option<NaiveDate>,
}

#[derive(clap::Args, Debug)]
pub struct CompleteArgs {
    /// Record ID or business number
    pub key: String,

    /// Audit summary
    #[arg(long)]
    pub summary: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct CancelArgs {
    /// Record ID or business number
    pub key: String,

    #[arg(long, short = 'r')]
    pub reason: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct FindingListArgs {
    #[command(flatten)]
    pub common: ListArgs,

    /// Only findings from this audit plan ID
    #[arg(long)]
    pub plan: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct FindingNewArgs {
    /// Business number, e.g. FND-2025-011
    pub number: String,

    #[arg(long, short = 't')]
    pub title: String,

    /// Finding type (major_nonconformity, minor_nonconformity, observation, ...)
    #[arg(long = "type", default_value = "observation")]
    pub finding_type: FindingType,

    #[arg(long, short = 'S', default_value = "minor")]
    pub severity: Severity,

    /// Audit plan (ID or number) this finding belongs to
    #[arg(long)]
    pub plan: Option<String>,

    /// Standard clause, e.g. 7.5.3
    #[arg(long)]
    pub clause: Option<String>,

    #[arg(long)]
    pub evidence: Option<String>,

    #[arg(long)]
    pub responsible: Option<String>,

    #[arg(long)]
    pub due: Option<NaiveDate>,
}

#[derive(clap::Args, Debug)]
pub struct AcknowledgeArgs {
    /// Record ID or business number
    pub key: String,

    /// Auditee response
    #[arg(long)]
    pub response: Option<String>,
}

pub fn run(cmd: AuditCommands, global: &GlobalOpts) -> Result<()> {
    let mut session = open_session(global)?;
    match cmd {
        AuditCommands::Plan(cmd) => run_plan(&mut session, cmd, global),
        AuditCommands::Finding(cmd) => run_finding(&mut session, cmd, global),
    }
}

fn run_plan(session: &mut Session, cmd: PlanCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        PlanCommands::List(args) => run_list::<AuditPlan>(&session.service, args.filter(), args.count, global),
        PlanCommands::New(args) => {
            let mut plan = AuditPlan::new(args.number, args.title, args.audit_type, &session.actor);
            plan.scope = args.scope;
            plan.standard = args.standard;
            plan.lead_auditor = args.lead_auditor;
            plan.planned_start = args.start;
            plan.planned_end = args.end;
            let plan = session.service.create(plan)?;
            report_created(&plan, global);
            Ok(())
        }
        PlanCommands::Show(args) => run_show::<AuditPlan>(&session.service, &args.key, global),
        PlanCommands::Update(args) => run_update::<AuditPlan>(session, &args, global),
        PlanCommands::Delete(args) => run_delete::<AuditPlan>(session, &args.key, global),
        PlanCommands::Schedule(args) => {
            let (start, end) = (args.start, args.end);
            let plan = run_transition::<AuditPlan, _>(session, &args.key, Action::Schedule, global, |p, actor, now| {
                p.schedule(actor, now, start, end)
            })?;
            if !global.quiet {
                println!(
                    "   {} {} .. {}",
                    style("window").dim(),
                    opt(plan.planned_start),
                    opt(plan.planned_end)
                );
            }
            Ok(())
        }
        PlanCommands::Start(args) => {
            run_transition::<AuditPlan, _>(session, &args.key, Action::Start, global, |p, actor, now| {
                p.start(actor, now)
            })?;
            Ok(())
        }
        PlanCommands::Complete(args) => {
            let summary = args.summary;
            run_transition::<AuditPlan, _>(session, &args.key, Action::Complete, global, |p, actor, now| {
                p.complete(actor, now, summary)
            })?;
            Ok(())
        }
        PlanCommands::Close(args) => {
            run_transition::<AuditPlan, _>(session, &args.key, Action::Close, global, |p, actor, now| {
                p.close(actor, now)
            })?;
            Ok(())
        }
        PlanCommands::Cancel(args) => {
            let reason = args.reason;
            run_transition::<AuditPlan, _>(session, &args.key, Action::Cancel, global, |p, actor, now| {
                p.cancel(actor, now, reason)
            })?;
            Ok(())
        }
        PlanCommands::Actions(args) => run_actions::<AuditPlan>(&session.service, &args.key),
    }
}

fn run_finding(session: &mut Session, cmd: FindingCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        FindingCommands::List(args) => {
            let mut filter = args.common.filter();
            if let Some(plan) = &args.plan {
                filter = filter.with_ref("audit_plan_id", plan);
            }
            run_list::<AuditFinding>(&session.service, filter, args.common.count, global)
        }
        FindingCommands::New(args) => {
            let plan = match &args.plan {
                Some(key) => {
                    let plan: AuditPlan = session.service.resolve(key)?;
                    BackRef::new(Some(plan.id.clone()), plan.business_number())
                }
                None => BackRef::default(),
            };
            let mut finding = AuditFinding::new(args.number, args.title, args.finding_type, &session.actor)
                .with_audit_plan(plan.id, plan.number);
            finding.severity = args.severity;
            finding.clause = args.clause;
            finding.evidence = args.evidence;
            finding.responsible = args.responsible;
            finding.due_date = args.due;
            let finding = session.service.create(finding)?;
            report_created(&finding, global);
            Ok(())
        }
        FindingCommands::Show(args) => run_show::<AuditFinding>(&session.service, &args.key, global),
        FindingCommands::Update(args) => run_update::<AuditFinding>(session, &args, global),
        FindingCommands::Delete(args) => run_delete::<AuditFinding>(session, &args.key, global),
        FindingCommands::Acknowledge(args) => {
            let response = args.response;
            run_transition::<AuditFinding, _>(session, &args.key, Action::Acknowledge, global, |f, actor, now| {
                f.acknowledge(actor, now, response)
            })?;
            Ok(())
        }
        FindingCommands::Verify(args) => {
            let (effective, notes) = (args.effective, args.notes);
            run_transition::<AuditFinding, _>(session, &args.key, Action::Verify, global, |f, actor, now| {
                f.verify(actor, now, effective, notes)
            })?;
            Ok(())
        }
        FindingCommands::Close(args) => {
            run_transition::<AuditFinding, _>(session, &args.key, Action::Close, global, |f, actor, now| {
                f.close(actor, now)
            })?;
            Ok(())
        }
        FindingCommands::Reject(args) => {
            let reason = args.reason;
            run_transition::<AuditFinding, _>(session, &args.key, Action::Reject, global, |f, actor, now| {
                f.reject(actor, now, reason)
            })?;
            Ok(())
        }
        FindingCommands::RaiseCapa(args) => {
            let link = args.backref()?;
            let finding: AuditFinding = session.service.resolve(&args.key)?;
            let finding = session.service.raise_capa(&finding.id, link)?;
            if !global.quiet {
                println!(
                    "{} Finding {} requires a CAPA {}",
                    style("✓").green(),
                    style(&finding.finding_number).cyan(),
                    style(opt(finding.capa.label())).dim()
                );
            }
            Ok(())
        }
        FindingCommands::Actions(args) => run_actions::<AuditFinding>(&session.service, &args.key),
    }
}
