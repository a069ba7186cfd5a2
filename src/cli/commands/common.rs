//! Argument groups and runners shared by the record family commands

use chrono::{DateTime, Utc};
use console::style;
use miette::Result;

use crate::cli::helpers::{parse_patch, Session};
use crate::cli::table::{print_detail, print_list, Row};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::entity::Entity;
use crate::core::error::QualityError;
use crate::core::identity::EntityId;
use crate::core::links::BackRef;
use crate::core::store::YamlStore;
use crate::core::workflow::{Action, Lifecycle, State, WorkflowError};
use crate::service::{QualityService, RecordFilter};

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Filter by status (e.g. open, in_progress, closed)
    #[arg(long)]
    pub status: Option<String>,

    /// Search in title and number
    #[arg(long)]
    pub search: Option<String>,

    /// Filter by author
    #[arg(long)]
    pub author: Option<String>,

    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Show count only, not the items
    #[arg(long)]
    pub count: bool,
}

impl ListArgs {
    pub fn filter(&self) -> RecordFilter {
        RecordFilter {
            status: self.status.clone(),
            refs: Vec::new(),
            author: self.author.clone(),
            search: self.search.clone(),
            limit: self.limit,
        }
    }
}

/// A record named by full ID or business number
#[derive(clap::Args, Debug)]
pub struct KeyArgs {
    /// Record ID or business number
    pub key: String,
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    /// Record ID or business number
    pub key: String,

    /// Fields to change as YAML (`'owner: jo'`), or `@file.yaml`
    #[arg(long, short = 'p', alias = "set")]
    pub patch: String,
}

#[derive(clap::Args, Debug)]
pub struct NotesArgs {
    /// Record ID or business number
    pub key: String,

    /// Free-text notes kept with the sign-off
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ReasonArgs {
    /// Record ID or business number
    pub key: String,

    /// Why the record is rejected
    #[arg(long, short = 'r')]
    pub reason: String,
}

#[derive(clap::Args, Debug)]
pub struct VerifyArgs {
    /// Record ID or business number
    pub key: String,

    /// Record the action as effective
    #[arg(long)]
    pub effective: bool,

    /// Verification notes
    #[arg(long)]
    pub notes: Option<String>,
}

/// Reference to another record; neither part is checked
#[derive(clap::Args, Debug)]
pub struct LinkArgs {
    /// Record ID or business number
    pub key: String,

    /// ID of the referenced record
    #[arg(long = "to-id")]
    pub to_id: Option<String>,

    /// Business number of the referenced record
    #[arg(long = "to-number")]
    pub to_number: Option<String>,
}

impl LinkArgs {
    pub fn backref(&self) -> Result<BackRef> {
        backref(self.to_id.as_deref(), self.to_number.clone())
    }
}

/// Build a [`BackRef`], parsing the ID when one is given
pub fn backref(id: Option<&str>, number: Option<String>) -> Result<BackRef> {
    let id = id
        .map(EntityId::parse)
        .transpose()
        .map_err(QualityError::from)?;
    Ok(BackRef::new(id, number))
}

fn display_name<R: Entity>(record: &R) -> String {
    record
        .business_number()
        .unwrap_or_else(|| record.id().to_string())
}

/// Report a newly saved record (just its ID with `--format id` or `--quiet`)
pub fn report_created<R: Entity>(record: &R, global: &GlobalOpts) {
    if global.quiet || global.format == OutputFormat::Id {
        println!("{}", record.id());
        return;
    }
    println!(
        "{} Created {} {}",
        style("✓").green(),
        R::PREFIX.family(),
        style(display_name(record)).cyan()
    );
    println!("   {}", style(record.id()).dim());
}

pub fn run_list<R: Row>(service: &QualityService<YamlStore>, filter: RecordFilter, count: bool, global: &GlobalOpts) -> Result<()> {
    let records: Vec<R> = service.list(&filter)?;
    if count {
        println!("{}", records.len());
        return Ok(());
    }
    print_list(&records, global.format, global.quiet)
}

pub fn run_show<R: Entity>(service: &QualityService<YamlStore>, key: &str, global: &GlobalOpts) -> Result<()> {
    let record: R = service.resolve(key)?;
    if global.format == OutputFormat::Id {
        println!("{}", record.id());
        return Ok(());
    }
    print_detail(&record, global.format)
}

pub fn run_update<R: Lifecycle>(session: &mut Session, args: &UpdateArgs, global: &GlobalOpts) -> Result<()> {
    let patch = parse_patch(&args.patch)?;
    let record: R = session.service.resolve(&args.key)?;
    let updated: R = session.service.update(record.id(), patch)?;
    if !global.quiet {
        println!(
            "{} Updated {} {}",
            style("✓").green(),
            R::PREFIX.family(),
            style(display_name(&updated)).cyan()
        );
    }
    Ok(())
}

pub fn run_delete<R: Lifecycle>(session: &mut Session, key: &str, global: &GlobalOpts) -> Result<()> {
    let record: R = session.service.resolve(key)?;
    session.service.delete::<R>(record.id())?;
    report_deleted(&record, global);
    Ok(())
}

pub fn report_deleted<R: Entity>(record: &R, global: &GlobalOpts) {
    if !global.quiet {
        println!(
            "{} Deleted {} {}",
            style("✓").green(),
            R::PREFIX.family(),
            style(display_name(record)).cyan()
        );
    }
}

/// List the transitions open to a record right now
pub fn run_actions<R: Lifecycle>(service: &QualityService<YamlStore>, key: &str) -> Result<()> {
    let record: R = service.resolve(key)?;
    let actions = service.allowed_actions::<R>(record.id())?;
    if actions.is_empty() {
        println!(
            "{} {} is {} (terminal)",
            R::PREFIX.family(),
            display_name(&record),
            style(record.state().as_str()).yellow()
        );
    }
    for action in actions {
        println!("{}", action);
    }
    Ok(())
}

/// Resolve a record and run one transition on it
pub fn run_transition<R, F>(session: &mut Session, key: &str, action: Action, global: &GlobalOpts, apply: F) -> Result<R>
where
    R: Lifecycle,
    F: FnOnce(&mut R, &str, DateTime<Utc>) -> Result<(), WorkflowError>,
{
    let record: R = session.service.resolve(key)?;
    let from = record.state();
    let actor = session.actor.clone();
    let updated = session
        .service
        .transition::<R, _>(record.id(), action, |r, now| apply(r, &actor, now))?;
    report_transition(&updated, from, action, global);
    Ok(updated)
}

pub fn report_transition<R: Lifecycle>(record: &R, from: R::State, action: Action, global: &GlobalOpts) {
    if global.quiet {
        return;
    }
    println!(
        "{} {} {} {}: {} -> {}",
        style("✓").green(),
        style(action).bold(),
        R::PREFIX.family(),
        style(display_name(record)).cyan(),
        from.as_str(),
        style(record.state().as_str()).yellow()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::EntityPrefix;

    #[test]
    fn test_backref_parses_id() {
        let id = EntityId::new(EntityPrefix::Capa);
        let link = backref(Some(&id.to_string()), Some("CAPA-7".to_string())).unwrap();
        assert_eq!(link.id, Some(id));
        assert!(backref(Some("not-an-id"), None).is_err());
        assert!(backref(None, None).unwrap().is_empty());
    }
}
