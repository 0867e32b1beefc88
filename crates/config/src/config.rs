//! Configuration loading
//!
//! `lintel.toml` lives at the root of the repository being checked. Hook
//! repositories ship `lintel-hooks.toml`, a list of hook definitions.

use crate::hooks::{DEFAULT_VERSION, HookConfig};
use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the user configuration file
pub const CONFIG_FILE: &str = "lintel.toml";

/// Name of the manifest a hook repository ships
pub const MANIFEST_FILE: &str = "lintel-hooks.toml";

/// `repo` value for hooks defined in the checked repository itself
pub const LOCAL_REPO: &str = "local";

/// Environment variable listing hook ids to skip
pub const SKIP_ENV: &str = "SKIP";

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Include pattern applied to every candidate file before per-hook filtering
    #[serde(default = "default_files")]
    pub files: String,

    /// Exclude pattern applied to every candidate file
    #[serde(default = "default_exclude")]
    pub exclude: String,

    /// Stop after the first failing hook
    #[serde(default)]
    pub fail_fast: bool,

    /// Language version used by hooks that leave `language_version` unset
    #[serde(default)]
    pub default_language_version: IndexMap<String, String>,

    /// Hook repositories in execution order
    #[serde(default)]
    pub repos: Vec<RepoConfig>,

    /// File the configuration was read from
    #[serde(skip)]
    pub path: PathBuf,
}

fn default_files() -> String {
    String::new()
}

fn default_exclude() -> String {
    "^$".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            files: default_files(),
            exclude: default_exclude(),
            fail_fast: false,
            default_language_version: IndexMap::new(),
            repos: Vec::new(),
            path: PathBuf::from(CONFIG_FILE),
        }
    }
}

/// One `[[repos]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoConfig {
    /// Clone URL, or `local`
    pub repo: String,

    /// Revision to check out; required for remote repositories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    /// Hooks to use from this repository
    #[serde(default)]
    pub hooks: Vec<HookConfig>,
}

impl RepoConfig {
    /// Whether the hooks are defined inline rather than cloned
    pub fn is_local(&self) -> bool {
        self.repo == LOCAL_REPO
    }
}

impl Config {
    /// Load and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut config = Self::from_toml_str(&content).map_err(|e| match e {
            Error::Message(message) => Error::ConfigLoad {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        config.path = path.to_path_buf();

        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Message(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (key, pattern) in [("files", &self.files), ("exclude", &self.exclude)] {
            regex::Regex::new(pattern)
                .map_err(|e| Error::Config(format!("invalid top-level `{key}` pattern: {e}")))?;
        }

        for repo in &self.repos {
            if repo.is_local() {
                if repo.rev.is_some() {
                    return Err(Error::Config(
                        "`rev` is not allowed for local repositories".to_string(),
                    ));
                }
            } else if repo.rev.as_deref().is_none_or(str::is_empty) {
                return Err(Error::Config(format!(
                    "repository {} is missing `rev`",
                    repo.repo
                )));
            }
            for hook in &repo.hooks {
                hook.validate(&repo.repo)?;
            }
        }
        Ok(())
    }

    /// Directory containing the configuration file
    pub fn base_dir(&self) -> PathBuf {
        let absolute = std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone());
        absolute
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }

    /// Language version for `hook`, falling back to `default_language_version`
    ///
    /// Returns `"default"` when neither sets one; the runtime then decides.
    pub fn language_version_for(&self, hook: &HookConfig) -> String {
        hook.language_version
            .as_deref()
            .filter(|v| *v != DEFAULT_VERSION)
            .or_else(|| {
                hook.language
                    .as_deref()
                    .and_then(|lang| self.default_language_version.get(lang))
                    .map(String::as_str)
            })
            .unwrap_or(DEFAULT_VERSION)
            .to_string()
    }
}

/// Hook definitions published by a hook repository
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub hooks: Vec<HookConfig>,
}

impl Manifest {
    /// Load `lintel-hooks.toml` from a checked-out hook repository
    pub fn load_from_repo(repo_dir: &Path) -> Result<Self> {
        let path = repo_dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(|e| Error::ConfigLoad {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let manifest: Self = toml::from_str(&content).map_err(|e| Error::ConfigLoad {
            path: path.clone(),
            message: e.to_string(),
        })?;
        for hook in &manifest.hooks {
            hook.validate(&path.display().to_string())?;
        }
        Ok(manifest)
    }

    /// Look up a hook by id
    pub fn get(&self, id: &str) -> Option<&HookConfig> {
        self.hooks.iter().find(|h| h.id == id)
    }
}

/// Parse the comma-separated `SKIP` value into a set of hook ids
pub fn parse_skips(value: Option<&str>) -> HashSet<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
