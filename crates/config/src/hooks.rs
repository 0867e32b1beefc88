//! Hook definitions
//!
//! A hook is declared in two places: the manifest shipped by the hook repository
//! (`lintel-hooks.toml`) and the user's `lintel.toml`. Both use [`HookConfig`], where
//! every key except `id` is optional. Resolution overlays the user's keys on the
//! manifest entry, fills defaults and compiles the file patterns into a [`Hook`].
//!
//! [`Hook`] is immutable once resolved and is what the engine schedules.

use crate::config::Config;
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Placeholder meaning "let the runtime choose"
pub const DEFAULT_VERSION: &str = "default";

/// Placeholder replaced by the directory holding the config file
pub const CONFIG_BASEPATH: &str = "%CONFIG_BASEPATH%";

/// Hook as written in a manifest or in the user's config
///
/// Every key except `id` is optional so user entries can override a subset of
/// the manifest entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookConfig {
    /// Hook identifier, unique within its repository
    pub id: String,

    /// Alternative id accepted by `SKIP` and `--hook`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Command line (shell-split) to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,

    /// Runtime that installs and runs the hook
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Extra arguments appended after `entry`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Include pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<String>,

    /// Exclude pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,

    /// Tags every selected file must carry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,

    /// Tags of which a selected file must carry at least one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types_or: Option<Vec<String>>,

    /// Tags no selected file may carry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_types: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub always_run: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_filenames: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_serial: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_fast: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,

    /// File receiving the hook output in addition to the terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,

    /// Exit code treated as success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_exit_code: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_dependencies: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_version: Option<String>,

    /// Git hook stages this hook belongs to (empty means all)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

macro_rules! overlay {
    ($base:ident, $over:ident, $($field:ident),+ $(,)?) => {
        $(
            if $over.$field.is_some() {
                $base.$field.clone_from(&$over.$field);
            }
        )+
    };
}

impl HookConfig {
    /// Overlay `overrides` on `self`; keys set in `overrides` win
    #[must_use]
    pub fn merged(&self, overrides: &Self) -> Self {
        let mut merged = self.clone();
        overlay!(
            merged,
            overrides,
            alias,
            name,
            entry,
            language,
            args,
            files,
            exclude,
            types,
            types_or,
            exclude_types,
            always_run,
            pass_filenames,
            require_serial,
            fail_fast,
            verbose,
            log_file,
            expected_exit_code,
            additional_dependencies,
            language_version,
            stages,
            description,
        );
        merged
    }

    /// Dependencies declared for this hook, or none
    pub fn dependencies(&self) -> &[String] {
        self.additional_dependencies.as_deref().unwrap_or_default()
    }

    /// Check the keys that can be checked without knowing the runtime
    pub fn validate(&self, src: &str) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Config(format!("hook in {src} has an empty `id`")));
        }
        for (key, pattern) in [("files", &self.files), ("exclude", &self.exclude)] {
            if let Some(pattern) = pattern {
                compile(pattern).map_err(|e| {
                    Error::Config(format!(
                        "hook `{}` in {src}: invalid `{key}` pattern: {e}",
                        self.id
                    ))
                })?;
            }
        }
        Ok(())
    }
}

/// Everything that determines which environment a hook runs in
///
/// Hooks with equal keys share one installed environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstallKey {
    pub prefix: PathBuf,
    pub language: String,
    pub language_version: String,
    /// Sorted additional dependencies
    pub dependencies: Vec<String>,
}

/// A fully resolved hook
#[derive(Debug, Clone)]
pub struct Hook {
    /// Repository the hook came from (`local` for in-repo hooks)
    pub src: String,
    /// Directory the hook's sources live in; environments are created under it
    pub prefix: PathBuf,
    pub id: String,
    pub alias: Option<String>,
    pub name: String,
    pub entry: String,
    pub language: String,
    pub args: Vec<String>,
    pub files: Regex,
    pub exclude: Regex,
    pub types: Vec<String>,
    pub types_or: Vec<String>,
    pub exclude_types: Vec<String>,
    pub always_run: bool,
    pub pass_filenames: bool,
    pub require_serial: bool,
    pub fail_fast: bool,
    pub verbose: bool,
    pub log_file: Option<PathBuf>,
    pub expected_exit_code: i32,
    pub additional_dependencies: Vec<String>,
    pub language_version: String,
    pub stages: Vec<String>,
    pub description: String,
}

impl Hook {
    /// Build a hook from a merged definition
    ///
    /// `language_version` must already be resolved (see
    /// [`Config::language_version_for`]). `%CONFIG_BASEPATH%` in `entry` and `args`
    /// is replaced by the directory containing the config file.
    pub fn resolve(
        src: &str,
        prefix: &Path,
        definition: &HookConfig,
        language_version: String,
        config: &Config,
    ) -> Result<Self> {
        definition.validate(src)?;

        let missing = |key: &str| {
            Error::Config(format!(
                "hook `{}` in {src} is missing required key `{key}`",
                definition.id
            ))
        };
        let entry = definition.entry.clone().ok_or_else(|| missing("entry"))?;
        let language = definition
            .language
            .clone()
            .ok_or_else(|| missing("language"))?;

        let basepath = config.base_dir().to_string_lossy().into_owned();
        let expand = |s: &str| s.replace(CONFIG_BASEPATH, &basepath);

        let files = compile(definition.files.as_deref().unwrap_or(""))
            .map_err(|e| Error::Config(format!("hook `{}`: {e}", definition.id)))?;
        let exclude = compile(definition.exclude.as_deref().unwrap_or("^$"))
            .map_err(|e| Error::Config(format!("hook `{}`: {e}", definition.id)))?;

        Ok(Self {
            src: src.to_string(),
            prefix: prefix.to_path_buf(),
            id: definition.id.clone(),
            alias: definition.alias.clone().filter(|a| !a.is_empty()),
            name: definition
                .name
                .clone()
                .unwrap_or_else(|| definition.id.clone()),
            entry: expand(&entry),
            language,
            args: definition
                .args
                .iter()
                .flatten()
                .map(|a| expand(a))
                .collect(),
            files,
            exclude,
            types: definition
                .types
                .clone()
                .unwrap_or_else(|| vec!["file".to_string()]),
            types_or: definition.types_or.clone().unwrap_or_default(),
            exclude_types: definition.exclude_types.clone().unwrap_or_default(),
            always_run: definition.always_run.unwrap_or(false),
            pass_filenames: definition.pass_filenames.unwrap_or(true),
            require_serial: definition.require_serial.unwrap_or(false),
            fail_fast: definition.fail_fast.unwrap_or(false),
            verbose: definition.verbose.unwrap_or(false),
            log_file: definition
                .log_file
                .as_deref()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            expected_exit_code: definition.expected_exit_code.unwrap_or(0),
            additional_dependencies: definition.dependencies().to_vec(),
            language_version,
            stages: definition.stages.clone().unwrap_or_default(),
            description: definition.description.clone().unwrap_or_default(),
        })
    }

    /// `entry` split like a shell would, followed by `args`
    pub fn cmd(&self) -> Result<Vec<String>> {
        let mut cmd = shell_words::split(&self.entry).map_err(|e| {
            Error::Config(format!("hook `{}`: cannot parse entry: {e}", self.id))
        })?;
        if cmd.is_empty() {
            return Err(Error::Config(format!("hook `{}` has an empty entry", self.id)));
        }
        cmd.extend(self.args.iter().cloned());
        Ok(cmd)
    }

    /// The environment this hook needs
    pub fn install_key(&self) -> InstallKey {
        let mut dependencies = self.additional_dependencies.clone();
        dependencies.sort();
        InstallKey {
            prefix: self.prefix.clone(),
            language: self.language.clone(),
            language_version: self.language_version.clone(),
            dependencies,
        }
    }

    /// Whether `name` refers to this hook by id or alias
    pub fn is_named(&self, name: &str) -> bool {
        self.id == name || self.alias.as_deref() == Some(name)
    }
}

fn compile(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(pattern)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    fn definition() -> HookConfig {
        HookConfig {
            id: "trailing-whitespace".to_string(),
            name: Some("trim trailing whitespace".to_string()),
            entry: Some("trailing-whitespace-fixer".to_string()),
            language: Some("python".to_string()),
            types: Some(vec!["text".to_string()]),
            ..HookConfig::default()
        }
    }

    #[test]
    fn test_merged_overrides_only_set_keys() {
        let manifest = definition();
        let user = HookConfig {
            id: "trailing-whitespace".to_string(),
            args: Some(vec!["--markdown-linebreak-ext=md".to_string()]),
            exclude: Some("^docs/".to_string()),
            ..HookConfig::default()
        };

        let merged = manifest.merged(&user);
        assert_eq!(merged.entry.as_deref(), Some("trailing-whitespace-fixer"));
        assert_eq!(merged.exclude.as_deref(), Some("^docs/"));
        assert_eq!(merged.args.unwrap().len(), 1);
        assert_eq!(merged.types, Some(vec!["text".to_string()]));
    }

    #[test]
    fn test_resolve_applies_defaults() {
        let config = Config::default();
        let hook = HookConfig {
            types: None,
            ..definition()
        };
        let hook = Hook::resolve("local", Path::new("/tmp"), &hook, "3".into(), &config).unwrap();

        assert_eq!(hook.types, vec!["file"]);
        assert!(hook.pass_filenames);
        assert!(!hook.always_run);
        assert_eq!(hook.expected_exit_code, 0);
        assert!(hook.files.is_match("anything"));
        assert!(hook.exclude.is_match(""));
        assert!(!hook.exclude.is_match("src/lib.rs"));
        assert_eq!(hook.language_version, "3");
    }

    #[test]
    fn test_resolve_requires_entry() {
        let config = Config::default();
        let hook = HookConfig {
            entry: None,
            ..definition()
        };
        let err = Hook::resolve("local", Path::new("/tmp"), &hook, "default".into(), &config)
            .unwrap_err();
        assert!(err.to_string().contains("`entry`"));
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let hook = HookConfig {
            files: Some("(".to_string()),
            ..definition()
        };
        assert!(hook.validate("local").is_err());
    }

    #[test]
    fn test_cmd_splits_entry_and_appends_args() {
        let config = Config::default();
        let definition = HookConfig {
            entry: Some("ruby -e 'puts 1'".to_string()),
            args: Some(vec!["--flag".to_string()]),
            ..definition()
        };
        let hook = Hook::resolve("local", Path::new("/"), &definition, "default".into(), &config)
            .unwrap();
        assert_eq!(hook.cmd().unwrap(), vec!["ruby", "-e", "puts 1", "--flag"]);
    }

    #[test]
    fn test_config_basepath_is_expanded() {
        let config = Config {
            path: PathBuf::from("/work/project/lintel.toml"),
            ..Config::default()
        };
        let definition = HookConfig {
            entry: Some("check --config %CONFIG_BASEPATH%/rules".to_string()),
            args: Some(vec!["%CONFIG_BASEPATH%".to_string()]),
            ..definition()
        };
        let hook = Hook::resolve("local", Path::new("/"), &definition, "default".into(), &config)
            .unwrap();
        assert_eq!(hook.entry, "check --config /work/project/rules");
        assert_eq!(hook.args, vec!["/work/project"]);
    }

    #[test]
    fn test_install_key_sorts_dependencies() {
        let config = Config::default();
        let a = HookConfig {
            additional_dependencies: Some(vec!["b".into(), "a".into()]),
            ..definition()
        };
        let b = HookConfig {
            id: "other".into(),
            additional_dependencies: Some(vec!["a".into(), "b".into()]),
            ..definition()
        };
        let a = Hook::resolve("r", Path::new("/p"), &a, "3".into(), &config).unwrap();
        let b = Hook::resolve("r", Path::new("/p"), &b, "3".into(), &config).unwrap();
        assert_eq!(a.install_key(), b.install_key());
        assert_eq!(a.install_key().dependencies, vec!["a", "b"]);
    }

    #[test]
    fn test_is_named_matches_alias() {
        let config = Config::default();
        let definition = HookConfig {
            alias: Some("ws".into()),
            ..definition()
        };
        let hook = Hook::resolve("r", Path::new("/p"), &definition, "3".into(), &config).unwrap();
        assert!(hook.is_named("ws"));
        assert!(hook.is_named("trailing-whitespace"));
        assert!(!hook.is_named("other"));
    }
}
