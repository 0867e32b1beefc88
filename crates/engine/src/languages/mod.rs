//! Language runtimes
//!
//! A runtime knows how to install an environment for a hook and how to run
//! the hook inside it. Runtimes without an environment (`system`, `script`,
//! `fail`, `pygrep`, `pcre`) run straight from `PATH` or the hook's prefix.
//!
//! Runtimes are looked up by name through a [`LanguageRegistry`] built per run.

mod fail;
pub mod helpers;
mod pcre;
mod pygrep;
mod python;
mod script;
mod system;

use crate::error::{Error, Result};
use crate::xargs::RunOutput;
use indexmap::IndexMap;
use lintel_config::Hook;
use lintel_config::hooks::DEFAULT_VERSION;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use fail::Fail;
pub use pcre::Pcre;
pub use pygrep::Pygrep;
pub use python::Python;
pub use script::Script;
pub use system::System;

/// Per-run settings handed to [`LanguageRuntime::run`]
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Repository root; hooks run here and filenames are relative to it
    pub root: PathBuf,
    /// Variables set for every hook process
    pub env: IndexMap<String, String>,
    /// Batches to run at once for hooks that allow it
    pub concurrency: usize,
}

impl RunContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut env = IndexMap::new();
        env.insert("LINTEL".to_string(), "1".to_string());
        Self {
            root: root.into(),
            env,
            concurrency: crate::xargs::target_concurrency(false),
        }
    }
}

/// Installs environments for, and runs, hooks of one language
pub trait LanguageRuntime: Send + Sync {
    /// Name used in the `language` key
    fn name(&self) -> &'static str;

    /// Directory name prefix of installed environments, `None` if the
    /// runtime needs no environment
    fn environment_dir(&self) -> Option<&'static str> {
        None
    }

    /// Version used when neither the hook nor the config picks one
    fn default_version(&self) -> String {
        DEFAULT_VERSION.to_string()
    }

    /// Check an installed environment; `Err` carries the reason it is unusable
    fn health_check(&self, _prefix: &Path, _version: &str) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Create the environment under `prefix` and install `dependencies` into it
    fn install(&self, _prefix: &Path, _version: &str, _dependencies: &[String]) -> Result<()> {
        Ok(())
    }

    /// Run `hook` over `filenames`
    fn run(&self, hook: &Hook, filenames: &[String], ctx: &RunContext) -> Result<RunOutput>;
}

/// Runtimes by language name
#[derive(Clone, Default)]
pub struct LanguageRegistry {
    runtimes: HashMap<&'static str, Arc<dyn LanguageRuntime>>,
}

impl std::fmt::Debug for LanguageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageRegistry")
            .field("languages", &self.names())
            .finish()
    }
}

impl LanguageRegistry {
    /// Registry holding every built-in runtime
    pub fn builtin() -> Self {
        let runtimes: [Arc<dyn LanguageRuntime>; 6] = [
            Arc::new(Fail),
            Arc::new(Pcre),
            Arc::new(Pygrep),
            Arc::new(Python::default()),
            Arc::new(Script),
            Arc::new(System),
        ];
        let mut registry = Self::default();
        for runtime in runtimes {
            registry.register(runtime);
        }
        registry
    }

    /// Add or replace a runtime
    pub fn register(&mut self, runtime: Arc<dyn LanguageRuntime>) {
        self.runtimes.insert(runtime.name(), runtime);
    }

    /// Runtime for `language`
    pub fn get(&self, language: &str) -> Result<&Arc<dyn LanguageRuntime>> {
        self.runtimes
            .get(language)
            .ok_or_else(|| Error::UnknownLanguage(language.to_string()))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.runtimes.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
