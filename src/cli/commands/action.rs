//! `qms capa`, `qms ca` and `qms pa` - the shared action lifecycle
//!
//! All three families walk the same graph (draft, submitted, approved,
//! implemented, pending verification, verified, closed) and take the same
//! subcommands; only record creation differs.

use chrono::NaiveDate;
use clap::Subcommand;
use miette::Result;

use crate::cli::commands::common::{
    backref, report_created, run_actions, run_delete, run_list, run_show, run_transition,
    run_update, KeyArgs, ListArgs, NotesArgs, ReasonArgs, UpdateArgs, VerifyArgs,
};
use crate::cli::helpers::open_session;
use crate::cli::table::Row;
use crate::cli::GlobalOpts;
use crate::core::entity::Priority;
use crate::core::links::BackRef;
use crate::core::workflow::Action;
use crate::entities::action::source_reference;
use crate::entities::{ActionRecord, Capa, CapaType, CorrectiveAction, PreventiveAction};

#[derive(Subcommand, Debug)]
pub enum ActionCommands {
    /// List records
    List(ActionListArgs),

    /// Create a record in draft
    New(NewArgs),

    /// Show a record's details
    Show(KeyArgs),

    /// Change content fields (owner, root_cause, action_plan, ...)
    Update(UpdateArgs),

    /// Delete a draft record
    Delete(KeyArgs),

    /// Submit for approval (draft -> submitted)
    Submit(KeyArgs),

    /// Approve the plan (submitted -> approved)
    Approve(NotesArgs),

    /// Reject the plan (submitted -> rejected)
    Reject(ReasonArgs),

    /// Record implementation (approved -> implemented)
    Implement(KeyArgs),

    /// Ask for effectiveness verification (implemented -> pending_verification)
    RequestVerification(KeyArgs),

    /// Record verification (implemented or pending_verification -> verified)
    Verify(VerifyArgs),

    /// Close a verified record
    Close(NotesArgs),

    /// Cancel from any open status
    Cancel(CancelArgs),

    /// Actions available from the current status
    Actions(KeyArgs),
}

#[derive(clap::Args, Debug)]
pub struct ActionListArgs {
    #[command(flatten)]
    pub common: ListArgs,

    /// Only records answering this source ID (NCR, NC, finding, inspection)
    #[arg(long)]
    pub source: Option<String>,

    /// Only records under this CAPA ID (corrective and preventive actions)
    #[arg(long)]
    pub capa: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Business number, e.g. CAPA-2025-001
    pub number: String,

    #[arg(long, short = 't')]
    pub title: String,

    /// Priority (low, medium, high)
    #[arg(long, short = 'p', default_value = "medium")]
    pub priority: Priority,

    /// CAPA type (corrective, preventive); CAPAs only
    #[arg(long = "type", default_value = "corrective")]
    pub capa_type: CapaType,

    /// Originating record ID
    #[arg(long)]
    pub source_id: Option<String>,

    /// Originating record number
    #[arg(long)]
    pub source_number: Option<String>,

    /// Parent CAPA ID; corrective and preventive actions only
    #[arg(long)]
    pub capa_id: Option<String>,

    /// Parent CAPA number; corrective and preventive actions only
    #[arg(long)]
    pub capa_number: Option<String>,

    #[arg(long)]
    pub owner: Option<String>,

    /// Due date (YYYY-MM-DD)
    #[arg(long)]
    pub due: Option<NaiveDate>,

    #[arg(long, short = 'd')]
    pub description: Option<String>,
}

impl NewArgs {
    fn source(&self) -> Result<BackRef> {
        backref(self.source_id.as_deref(), self.source_number.clone())
    }

    fn capa(&self) -> Result<BackRef> {
        backref(self.capa_id.as_deref(), self.capa_number.clone())
    }
}

#[derive(clap::Args, Debug)]
pub struct CancelArgs {
    /// Record ID or business number
    pub key: String,

    #[arg(long, short = 'r')]
    pub reason: Option<String>,
}

/// Family-specific construction from `new` arguments
pub trait NewAction: ActionRecord + Row {
    fn from_args(args: NewArgs, author: &str) -> Result<Self>;
}

impl NewAction for Capa {
    fn from_args(args: NewArgs, author: &str) -> Result<Self> {
        let source = args.source()?;
        let mut capa = Capa::new(args.number, args.title, args.capa_type, author)
            .with_source(source.id, source.number);
        capa.priority = args.priority;
        capa.owner = args.owner;
        capa.due_date = args.due;
        capa.description = args.description;
        Ok(capa)
    }
}

impl NewAction for CorrectiveAction {
    fn from_args(args: NewArgs, author: &str) -> Result<Self> {
        let source = args.source()?;
        let capa = args.capa()?;
        let mut ca = CorrectiveAction::new(args.number, args.title, author)
            .with_source(source.id, source.number)
            .with_capa(capa.id, capa.number);
        ca.priority = args.priority;
        ca.owner = args.owner;
        ca.due_date = args.due;
        ca.description = args.description;
        Ok(ca)
    }
}

impl NewAction for PreventiveAction {
    fn from_args(args: NewArgs, author: &str) -> Result<Self> {
        let source = args.source()?;
        let capa = args.capa()?;
        let mut pa = PreventiveAction::new(args.number, args.title, author)
            .with_source(source.id, source.number)
            .with_capa(capa.id, capa.number);
        pa.priority = args.priority;
        pa.owner = args.owner;
        pa.due_date = args.due;
        pa.description = args.description;
        Ok(pa)
    }
}

pub fn run<R: NewAction>(cmd: ActionCommands, global: &GlobalOpts) -> Result<()> {
    let mut session = open_session(global)?;

    match cmd {
        ActionCommands::List(args) => {
            let mut filter = args.common.filter();
            if let Some(source) = &args.source {
                let link = backref(Some(source), None)?;
                if let Some((field, id)) = source_reference(&link) {
                    filter = filter.with_ref(field, id);
                }
            }
            if let Some(capa) = &args.capa {
                filter = filter.with_ref("capa_id", capa);
            }
            run_list::<R>(&session.service, filter, args.common.count, global)
        }
        ActionCommands::New(args) => {
            let record = R::from_args(args, &session.actor)?;
            let record = session.service.create(record)?;
            report_created(&record, global);
            Ok(())
        }
        ActionCommands::Show(args) => run_show::<R>(&session.service, &args.key, global),
        ActionCommands::Update(args) => run_update::<R>(&mut session, &args, global),
        ActionCommands::Delete(args) => run_delete::<R>(&mut session, &args.key, global),
        ActionCommands::Submit(args) => {
            run_transition::<R, _>(&mut session, &args.key, Action::Submit, global, |r, actor, now| {
                r.submit(actor, now)
            })?;
            Ok(())
        }
        ActionCommands::Approve(args) => {
            let comment = args.notes;
            run_transition::<R, _>(&mut session, &args.key, Action::Approve, global, |r, actor, now| {
                r.approve(actor, now, comment)
            })?;
            Ok(())
        }
        ActionCommands::Reject(args) => {
            let reason = args.reason;
            run_transition::<R, _>(&mut session, &args.key, Action::Reject, global, |r, actor, now| {
                r.reject(actor, now, reason)
            })?;
            Ok(())
        }
        ActionCommands::Implement(args) => {
            run_transition::<R, _>(&mut session, &args.key, Action::Implement, global, |r, actor, now| {
                r.implement(actor, now)
            })?;
            Ok(())
        }
        ActionCommands::RequestVerification(args) => {
            run_transition::<R, _>(
                &mut session,
                &args.key,
                Action::RequestVerification,
                global,
                |r, actor, now| r.request_verification(actor, now),
            )?;
            Ok(())
        }
        ActionCommands::Verify(args) => {
            let notes = args.notes;
            let effective = args.effective;
            run_transition::<R, _>(&mut session, &args.key, Action::Verify, global, |r, actor, now| {
                r.verify(actor, now, effective, notes)
            })?;
            Ok(())
        }
        ActionCommands::Close(args) => {
            let notes = args.notes;
            run_transition::<R, _>(&mut session, &args.key, Action::Close, global, |r, actor, now| {
                r.close(actor, now, notes)
            })?;
            Ok(())
        }
        ActionCommands::Cancel(args) => {
            let reason = args.reason;
            run_transition::<R, _>(&mut session, &args.key, Action::Cancel, global, |r, actor, now| {
                r.cancel(actor, now, reason)
            })?;
            Ok(())
        }
        ActionCommands::Actions(args) => run_actions::<R>(&session.service, &args.key),
    }
}
