use clap::Parser;
use miette::Result;
use qms::cli::commands::{action, audit, capa, init, insp, nc, ncr, tmpl};
use qms::cli::helpers::resolve_defaults;
use qms::cli::{Cli, Commands};
use qms::entities::{CorrectiveAction, PreventiveAction};

fn main() -> Result<()> {
    // Terminate silently on a closed pipe (`qms ncr list | head`)
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = resolve_defaults(cli.global);

    // Logs go to stderr so piped record output stays clean
    let default_level = if global.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("QMS_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Init(args) => init::run(args),
        Commands::Ncr(cmd) => ncr::run(cmd, &global),
        Commands::Nc(cmd) => nc::run(cmd, &global),
        Commands::Capa(cmd) => capa::run(cmd, &global),
        Commands::Ca(cmd) => action::run::<CorrectiveAction>(cmd, &global),
        Commands::Pa(cmd) => action::run::<PreventiveAction>(cmd, &global),
        Commands::Audit(cmd) => audit::run(cmd, &global),
        Commands::Insp(cmd) => insp::run(cmd, &global),
        Commands::Tmpl(cmd) => tmpl::run(cmd, &global),
    }
}
