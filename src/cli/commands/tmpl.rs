//! `qms tmpl` command - QC templates and their parameters

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::commands::common::{
    report_created, report_deleted, run_actions, run_list, run_show, run_transition, run_update, KeyArgs,
    ListArgs, UpdateArgs,
};
use crate::cli::helpers::{open_session, parse_patch, Session};
use crate::cli::table::{print_list, print_summary};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::entity::Severity;
use crate::core::error::QualityError;
use crate::core::identity::EntityId;
use crate::core::workflow::Action;
use crate::entities::{InspectionType, ParameterKind, QcParameter, QcTemplate};

#[derive(Subcommand, Debug)]
pub enum TmplCommands {
    /// List templates
    List(ListArgs),

    /// Create a draft template (version 1)
    New(NewArgs),

    /// Show a template; key is an ID or `CODE vN`
    Show(KeyArgs),

    /// Change content fields (title, aql, sampling_plan, ...)
    Update(UpdateArgs),

    /// Delete a template that is not active, with its parameters
    Delete(KeyArgs),

    /// Make the template usable for inspections
    Activate(KeyArgs),

    /// Take an active template out of use
    Deactivate(KeyArgs),

    /// Retire the template for good
    Obsolete(KeyArgs),

    /// Fork a draft at the next version, copying the parameters
    NewVersion(KeyArgs),

    /// Actions available from the current status
    Actions(KeyArgs),

    /// Template parameters
    #[command(subcommand)]
    Param(ParamCommands),

    /// Active templates for one inspection type
    Active(ActiveArgs),

    /// Counts by status and type, usage and parameters per template
    Summary,
}

#[derive(clap::Args, Debug)]
pub struct ActiveArgs {
    /// Inspection type (incoming, in_process, final, first_article, audit)
    #[arg(long = "type", short = 'T')]
    pub inspection_type: InspectionType,
}

#[derive(Subcommand, Debug)]
pub enum ParamCommands {
    /// List a template's parameters in sequence order
    List(KeyArgs),

    /// Add a parameter to a draft template
    Add(ParamAddArgs),

    /// Change a parameter of a draft template
    #[command(alias = "update")]
    Set(ParamUpdateArgs),

    /// Remove a parameter from a draft template
    Rm(ParamKeyArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Template code, e.g. QCT-BORE
    pub code: String,

    #[arg(long, short = 't')]
    pub title: String,

    /// Inspection type the template is meant for
    #[arg(long = "type", default_value = "incoming")]
    pub inspection_type: InspectionType,

    #[arg(long)]
    pub part: Option<String>,

    /// Acceptable quality limit, percent
    #[arg(long)]
    pub aql: Option<f64>,

    #[arg(long)]
    pub sampling: Option<String>,

    #[arg(long, short = 'd')]
    pub description: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ParamKeyArgs {
    /// Parameter ID
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct ParamAddArgs {
    /// Template ID or `CODE vN`
    pub key: String,

    /// Characteristic name, e.g. "Bore diameter"
    #[arg(long)]
    pub name: String,

    /// numeric or textual
    #[arg(long, default_value = "numeric")]
    pub kind: ParameterKind,

    #[arg(long)]
    pub unit: Option<String>,

    #[arg(long, allow_hyphen_values = true)]
    pub target: Option<f64>,

    /// Lower specification limit
    #[arg(long, allow_hyphen_values = true)]
    pub lower: Option<f64>,

    /// Upper specification limit
    #[arg(long, allow_hyphen_values = true)]
    pub upper: Option<f64>,

    /// Measurement method or gauge
    #[arg(long)]
    pub method: Option<String>,

    /// Defect severity when this characteristic fails
    #[arg(long, default_value = "minor")]
    pub criticality: Severity,

    #[arg(long)]
    pub mandatory: bool,
}

#[derive(clap::Args, Debug)]
pub struct ParamUpdateArgs {
    /// Parameter ID
    pub id: String,

    /// Fields to change as YAML, or `@file.yaml`
    #[arg(long, short = 'p', alias = "set")]
    pub patch: String,
}

fn parse_parameter_id(id: &str) -> Result<EntityId> {
    Ok(EntityId::parse(id).map_err(QualityError::from)?)
}

pub fn run(cmd: TmplCommands, global: &GlobalOpts) -> Result<()> {
    let mut session = open_session(global)?;

    match cmd {
        TmplCommands::List(args) => {
            run_list::<QcTemplate>(&session.service, args.filter(), args.count, global)
        }
        TmplCommands::New(args) => {
            let mut template = QcTemplate::new(args.code, args.title, &session.actor);
            template.inspection_type = args.inspection_type;
            template.part_number = args.part;
            template.aql = args.aql;
            template.sampling_plan = args.sampling;
            template.description = args.description;
            let template = session.service.create(template)?;
            report_created(&template, global);
            Ok(())
        }
        TmplCommands::Show(args) => run_show::<QcTemplate>(&session.service, &args.key, global),
        TmplCommands::Update(args) => run_update::<QcTemplate>(&mut session, &args, global),
        TmplCommands::Delete(args) => {
            let template: QcTemplate = session.service.resolve(&args.key)?;
            session.service.delete_template(&template.id)?;
            report_deleted(&template, global);
            Ok(())
        }
        TmplCommands::Activate(args) => {
            run_transition::<QcTemplate, _>(&mut session, &args.key, Action::Activate, global, |t, actor, now| {
                t.activate(actor, now)
            })?;
            Ok(())
        }
        TmplCommands::Deactivate(args) => {
            run_transition::<QcTemplate, _>(&mut session, &args.key, Action::Deactivate, global, |t, actor, now| {
                t.deactivate(actor, now)
            })?;
            Ok(())
        }
        TmplCommands::Obsolete(args) => {
            run_transition::<QcTemplate, _>(&mut session, &args.key, Action::Obsolete, global, |t, actor, now| {
                t.obsolete(actor, now)
            })?;
            Ok(())
        }
        TmplCommands::NewVersion(args) => {
            let template: QcTemplate = session.service.resolve(&args.key)?;
            let actor = session.actor.clone();
            let fork = session.service.new_template_version(&template.id, &actor)?;
            report_created(&fork, global);
            Ok(())
        }
        TmplCommands::Actions(args) => run_actions::<QcTemplate>(&session.service, &args.key),
        TmplCommands::Param(cmd) => run_param(&mut session, cmd, global),
        TmplCommands::Active(args) => {
            let templates = session.service.active_templates(args.inspection_type)?;
            print_list(&templates, global.format, global.quiet)
        }
        TmplCommands::Summary => {
            let summary = session.service.template_summary()?;
            let mut rows = vec![
                ("Total", summary.total.to_string()),
                ("Active", summary.active.to_string()),
                ("Draft", summary.draft.to_string()),
            ];
            for (inspection_type, count) in &summary.by_type {
                rows.push((inspection_type.as_str(), count.to_string()));
            }
            rows.push(("Inspections seeded", summary.usage.to_string()));
            rows.push(("Avg. parameters", format!("{:.2}", summary.average_parameters)));
            print_summary("QC template summary", &rows, &summary, global.format)
        }
    }
}

fn run_param(session: &mut Session, cmd: ParamCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ParamCommands::List(args) => {
            let template: QcTemplate = session.service.resolve(&args.key)?;
            let parameters = session.service.parameters(&template.id)?;
            print_list(&parameters, global.format, global.quiet)
        }
        ParamCommands::Add(args) => {
            let template: QcTemplate = session.service.resolve(&args.key)?;
            let mut parameter = QcParameter::new(template.id.clone(), 0, args.name, &session.actor);
            parameter.kind = args.kind;
            parameter.unit = args.unit;
            parameter.target = args.target;
            parameter.lower_limit = args.lower;
            parameter.upper_limit = args.upper;
            parameter.method = args.method;
            parameter.criticality = args.criticality;
            parameter.mandatory = args.mandatory;
            let parameter = session.service.add_parameter(&template.id, parameter)?;
            if global.quiet || global.format == OutputFormat::Id {
                println!("{}", parameter.id);
            } else {
                println!(
                    "{} Added parameter #{} {} to {} v{}",
                    style("✓").green(),
                    parameter.sequence,
                    style(&parameter.name).cyan(),
                    style(&template.code).cyan(),
                    template.version
                );
                println!("   {}", style(&parameter.id).dim());
            }
            Ok(())
        }
        ParamCommands::Set(args) => {
            let id = parse_parameter_id(&args.id)?;
            let patch = parse_patch(&args.patch)?;
            let parameter = session.service.update_parameter(&id, patch)?;
            if !global.quiet {
                println!("{} Updated parameter {}", style("✓").green(), style(&parameter.name).cyan());
            }
            Ok(())
        }
        ParamCommands::Rm(args) => {
            let id = parse_parameter_id(&args.id)?;
            session.service.delete_parameter(&id)?;
            if !global.quiet {
                println!("{} Removed parameter {}", style("✓").green(), style(&id).dim());
            }
            Ok(())
        }
    }
}
