//! Install-state cache
//!
//! Decides which hook environments need installing and installs each distinct
//! [`InstallKey`](lintel_config::InstallKey) at most once. An environment is
//! usable only when its install-state record matches the wanted dependency set
//! and the runtime's health check passes. The record is published by rename
//! after a successful install, so an interrupted install reads as "not
//! installed" and is retried on the next run.

use crate::error::{Error, Result};
use crate::languages::{LanguageRegistry, LanguageRuntime, helpers};
use crate::store::Store;
use lintel_config::Hook;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Install-state record, inside each environment directory
pub const INSTALL_STATE_FILE: &str = ".install_state_v1";

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
struct InstallState {
    additional_dependencies: Vec<String>,
}

impl InstallState {
    fn for_hook(hook: &Hook) -> Self {
        Self {
            additional_dependencies: hook.install_key().dependencies,
        }
    }

    fn read(env: &Path) -> Option<Self> {
        let bytes = fs::read(env.join(INSTALL_STATE_FILE)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn publish(&self, env: &Path) -> Result<()> {
        let staging = env.join(format!("{INSTALL_STATE_FILE}staging"));
        let json = serde_json::to_vec(self)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        fs::write(&staging, json)?;
        fs::rename(&staging, env.join(INSTALL_STATE_FILE))?;
        Ok(())
    }
}

fn environment_path(hook: &Hook, runtime: &dyn LanguageRuntime) -> Option<PathBuf> {
    runtime
        .environment_dir()
        .map(|dir| helpers::environment_dir(&hook.prefix, dir, &hook.language_version))
}

/// Whether `hook` can run without installing anything
pub fn is_installed(hook: &Hook, runtime: &dyn LanguageRuntime) -> bool {
    let Some(env) = environment_path(hook, runtime) else {
        return true;
    };
    if InstallState::read(&env).as_ref() != Some(&InstallState::for_hook(hook)) {
        return false;
    }
    match runtime.health_check(&hook.prefix, &hook.language_version) {
        Ok(()) => true,
        Err(reason) => {
            tracing::warn!(
                "Environment for {} ({}) is unhealthy and will be reinstalled: {reason}",
                hook.src,
                hook.language
            );
            false
        }
    }
}

fn install_failure(hook: &Hook, err: Error) -> Error {
    match err {
        err @ Error::InstallFailure { .. } => err,
        other => Error::InstallFailure {
            language: hook.language.clone(),
            prefix: hook.prefix.clone(),
            message: other.to_string(),
        },
    }
}

fn install_one(hook: &Hook, runtime: &dyn LanguageRuntime) -> Result<()> {
    let Some(env) = environment_path(hook, runtime) else {
        return Ok(());
    };
    tracing::info!("Installing environment for {}.", hook.src);
    tracing::info!("Once installed this environment will be reused.");

    if env.exists() {
        tracing::debug!(env = %env.display(), "removing leftover environment");
        fs::remove_dir_all(&env)?;
    }

    let state = InstallState::for_hook(hook);
    let result = runtime
        .install(&hook.prefix, &hook.language_version, &state.additional_dependencies)
        .and_then(|()| {
            runtime
                .health_check(&hook.prefix, &hook.language_version)
                .map_err(|reason| Error::InstallFailure {
                    language: hook.language.clone(),
                    prefix: hook.prefix.clone(),
                    message: format!("environment is unhealthy after install: {reason}"),
                })
        })
        .and_then(|()| state.publish(&env));

    if let Err(err) = result {
        if env.exists() {
            if let Err(e) = fs::remove_dir_all(&env) {
                tracing::warn!("Failed to remove {}: {e}", env.display());
            }
        }
        return Err(install_failure(hook, err));
    }
    Ok(())
}

/// First hook of every distinct install key that is not installed yet
fn pending<'a>(hooks: &'a [Hook], languages: &LanguageRegistry) -> Result<Vec<&'a Hook>> {
    let mut seen = HashSet::new();
    let mut pending = Vec::new();
    for hook in hooks {
        let runtime = languages.get(&hook.language)?;
        if seen.insert(hook.install_key()) && !is_installed(hook, runtime.as_ref()) {
            pending.push(hook);
        }
    }
    Ok(pending)
}

/// Install every environment `hooks` need
///
/// Returns the number of environments installed.
#[tracing::instrument(skip_all, fields(hooks = hooks.len()))]
pub fn ensure_installed(hooks: &[Hook], languages: &LanguageRegistry, store: &Store) -> Result<usize> {
    if pending(hooks, languages)?.is_empty() {
        return Ok(0);
    }

    let _lock = store.exclusive_lock()?;
    // Recompute under the lock; another process may have installed some
    let pending = pending(hooks, languages)?;
    for hook in &pending {
        install_one(hook, languages.get(&hook.language)?.as_ref())?;
    }
    Ok(pending.len())
}
