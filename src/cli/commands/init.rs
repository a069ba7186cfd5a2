//! `qms init` command - Initialize a quality records project

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::Path;

use crate::core::identity::EntityPrefix;
use crate::core::project::{Project, ProjectError, PROJECT_DIR};

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (default: current directory)
    #[arg(default_value = ".")]
    pub path: std::path::PathBuf,

    /// Also initialize a git repository
    #[arg(long)]
    pub git: bool,

    /// Recreate missing directories even if .qms/ already exists
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir().into_diagnostic()?
    } else {
        args.path.clone()
    };

    if !path.exists() {
        std::fs::create_dir_all(&path).into_diagnostic()?;
        println!(
            "{} Created directory {}",
            style("✓").green(),
            style(path.display()).cyan()
        );
    }

    if args.git {
        init_git(&path)?;
    }

    let project = if args.force {
        Project::init_force(&path)
    } else {
        Project::init(&path)
    };

    match project {
        Ok(project) => {
            tracing::info!(root = %project.root().display(), "project initialized");
            println!(
                "{} Initialized quality records project at {}",
                style("✓").green(),
                style(project.root().display()).cyan()
            );
            println!();
            println!("Created project structure:");
            print_structure(project.root());
            println!();
            println!("Next steps:");
            println!(
                "  {} Raise your first NCR",
                style("qms ncr new --title \"...\"").yellow()
            );
            println!(
                "  {} Define a QC template",
                style("qms tmpl new QCT-001 --title \"...\"").yellow()
            );
            println!("  {} List open NCRs", style("qms ncr list -s open").yellow());
            Ok(())
        }
        Err(ProjectError::AlreadyExists(path)) => {
            println!(
                "{} Quality records project already exists at {}",
                style("!").yellow(),
                style(path.display()).cyan()
            );
            println!();
            println!("Use {} to repair the layout", style("qms init --force").yellow());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn init_git(path: &Path) -> Result<()> {
    if path.join(".git").exists() {
        println!("{} Git repository already exists", style("✓").green());
        return Ok(());
    }

    let output = std::process::Command::new("git")
        .arg("init")
        .current_dir(path)
        .output()
        .into_diagnostic()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(miette::miette!("Failed to initialize git: {}", stderr));
    }
    println!("{} Initialized git repository", style("✓").green());

    let gitignore_path = path.join(".gitignore");
    if !gitignore_path.exists() {
        std::fs::write(
            &gitignore_path,
            "# Editor backups\n*.swp\n*~\n",
        )
        .into_diagnostic()?;
    }
    Ok(())
}

fn print_structure(root: &Path) {
    let config = format!("{}/config.yaml", PROJECT_DIR);
    println!("  {}", style(&config).dim());
    for prefix in EntityPrefix::all() {
        let dir = Project::entity_directory(*prefix);
        if root.join(dir).is_dir() {
            println!("  {}/  {}", style(dir).dim(), style(prefix.family()).dim());
        }
    }
}
