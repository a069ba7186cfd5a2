//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::core::patch::UpdatePolicy;
use crate::core::Project;

/// Settings, merged from defaults, global config, project config and env
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default author for new records and sign-offs
    pub author: Option<String>,

    /// Default output format
    pub default_format: Option<String>,

    /// Which records accept `update`
    pub update_policy: Option<UpdatePolicy>,

    /// Prefix for auto-numbered NCRs
    pub ncr_prefix: Option<String>,

    /// Zero-padding of the NCR sequence part
    pub number_width: Option<usize>,
}

impl Config {
    /// Load configuration from all sources, discovering the project from cwd
    pub fn load() -> Self {
        let project = Project::discover().ok();
        Self::load_for(project.as_ref())
    }

    /// Load configuration for a known project, merging in priority order
    pub fn load_for(project: Option<&Project>) -> Self {
        let mut config = Config::default();

        // Global user config (~/.config/qms/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read_file(&global_path) {
                config.merge(global);
            }
        }

        // Project config (.qms/config.yaml)
        if let Some(project) = project {
            if let Some(local) = Self::read_file(&project.qms_dir().join("config.yaml")) {
                config.merge(local);
            }
        }

        config.apply_env();
        config
    }

    fn read_file(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                None
            }
        }
    }

    fn apply_env(&mut self) {
        if let Ok(author) = std::env::var("QMS_AUTHOR") {
            if !author.trim().is_empty() {
                self.author = Some(author);
            }
        }
        if let Ok(policy) = std::env::var("QMS_UPDATE_POLICY") {
            match policy.parse() {
                Ok(policy) => self.update_policy = Some(policy),
                Err(e) => tracing::warn!(value = %policy, "ignoring QMS_UPDATE_POLICY: {}", e),
            }
        }
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "qms")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.author.is_some() {
            self.author = other.author;
        }
        if other.default_format.is_some() {
            self.default_format = other.default_format;
        }
        if other.update_policy.is_some() {
            self.update_policy = other.update_policy;
        }
        if other.ncr_prefix.is_some() {
            self.ncr_prefix = other.ncr_prefix;
        }
        if other.number_width.is_some() {
            self.number_width = other.number_width;
        }
    }

    /// Get the author name, falling back to git config or username
    pub fn author(&self) -> String {
        if let Some(ref author) = self.author {
            return author.clone();
        }

        if let Ok(output) = std::process::Command::new("git")
            .args(["config", "user.name"])
            .output()
        {
            if output.status.success() {
                let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !name.is_empty() {
                    return name;
                }
            }
        }

        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    }

    pub fn update_policy(&self) -> UpdatePolicy {
        self.update_policy.unwrap_or_default()
    }

    pub fn ncr_prefix(&self) -> &str {
        self.ncr_prefix.as_deref().unwrap_or("NCR")
    }

    pub fn number_width(&self) -> usize {
        self.number_width.unwrap_or(3).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ncr_prefix(), "NCR");
        assert_eq!(config.number_width(), 3);
        assert_eq!(config.update_policy(), UpdatePolicy::NonTerminal);
    }

    #[test]
    fn test_merge_prefers_later_layer() {
        let mut config: Config = serde_yml::from_str("author: alice\nnumber_width: 4\n").unwrap();
        let project: Config =
            serde_yml::from_str("author: bob\nupdate_policy: initial_only\n").unwrap();
        config.merge(project);

        assert_eq!(config.author.as_deref(), Some("bob"));
        assert_eq!(config.number_width(), 4);
        assert_eq!(config.update_policy(), UpdatePolicy::InitialOnly);
    }

    #[test]
    fn test_project_config_file_is_read() {
        let tmp = tempfile::tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        std::fs::write(
            project.qms_dir().join("config.yaml"),
            "ncr_prefix: NC-R\nupdate_policy: unrestricted\n",
        )
        .unwrap();

        let config = Config::load_for(Some(&project));
        assert_eq!(config.ncr_prefix(), "NC-R");
    }
}
