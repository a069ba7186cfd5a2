//! Shared helper functions for CLI commands

use clap::ValueEnum;
use miette::{IntoDiagnostic, Result};
use serde_json::Value;
use std::path::Path;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::project::Project;
use crate::core::sequence::FileSequence;
use crate::core::store::YamlStore;
use crate::core::Config;
use crate::service::QualityService;

/// Service bound to the discovered project, plus who is acting
pub struct Session {
    pub service: QualityService<YamlStore>,
    pub actor: String,
}

/// Discover the project (or use `--project`) and open a service on it
pub fn open_session(global: &GlobalOpts) -> Result<Session> {
    let project = match &global.project {
        Some(root) => Project::discover_from(root)?,
        None => Project::discover()?,
    };
    let config = Config::load_for(Some(&project));
    let actor = global.actor.clone().unwrap_or_else(|| config.author());
    tracing::debug!(root = %project.root().display(), %actor, "opened project");

    let sequence = FileSequence::new(project.sequences_path());
    let service = QualityService::new(YamlStore::new(project), Box::new(sequence)).with_config(&config);
    Ok(Session { service, actor })
}

/// Fill in a `--format` left at `auto` from the configured `default_format`
pub fn resolve_defaults(mut global: GlobalOpts) -> GlobalOpts {
    if global.format != OutputFormat::Auto {
        return global;
    }
    let config = match &global.project {
        Some(root) => Config::load_for(Project::discover_from(root).ok().as_ref()),
        None => Config::load(),
    };
    if let Some(format) = config
        .default_format
        .as_deref()
        .and_then(|f| OutputFormat::from_str(f, true).ok())
    {
        global.format = format;
    }
    global
}

/// Parse a YAML/JSON field patch, or read it from a file given as `@path`
pub fn parse_patch(input: &str) -> Result<Value> {
    let source = match input.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(Path::new(path)).into_diagnostic()?,
        None => input.to_string(),
    };
    let value: Value = serde_yml::from_str(&source)
        .map_err(|e| miette::miette!("patch is not valid YAML: {}", e))?;
    if !value.is_object() {
        return Err(miette::miette!("patch must be a mapping of field: value"));
    }
    Ok(value)
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Display an optional value, blank when absent
pub fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Render a tolerance band such as `9.9..10.1`, `>= 2` or `<= 0.5`
pub fn format_limits(lower: Option<f64>, upper: Option<f64>) -> String {
    match (lower, upper) {
        (Some(l), Some(u)) => format!("{}..{}", l, u),
        (Some(l), None) => format!(">= {}", l),
        (None, Some(u)) => format!("<= {}", u),
        (None, None) => String::new(),
    }
}
