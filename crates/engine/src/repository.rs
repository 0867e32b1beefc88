//! Resolve configured hooks against their repositories
//!
//! Remote repositories are cloned into the store (once per revision, and once
//! more per distinct dependency set so environments never share a directory).
//! Their manifest supplies the base definition that user keys override.
//! Local hooks are complete as written.

use crate::error::Result;
use crate::languages::{LanguageRegistry, LanguageRuntime};
use crate::store::Store;
use lintel_config::hooks::DEFAULT_VERSION;
use lintel_config::{Config, Hook, HookConfig, Manifest, RepoConfig};
use std::path::{Path, PathBuf};

fn config_error(message: String) -> crate::error::Error {
    lintel_core::Error::Config(message).into()
}

fn runtime_for<'l>(
    definition: &HookConfig,
    src: &str,
    languages: &'l LanguageRegistry,
) -> Result<&'l dyn LanguageRuntime> {
    let language = definition.language.as_deref().ok_or_else(|| {
        config_error(format!(
            "hook `{}` in {src} is missing required key `language`",
            definition.id
        ))
    })?;
    Ok(languages.get(language)?.as_ref())
}

/// Runtimes without environments cannot honour a version or dependencies
fn check_environmentless(
    definition: &HookConfig,
    version: &str,
    runtime: &dyn LanguageRuntime,
    src: &str,
) -> Result<()> {
    if runtime.environment_dir().is_some() {
        return Ok(());
    }
    if version != DEFAULT_VERSION {
        return Err(config_error(format!(
            "hook `{}` in {src} sets `language_version` but `{}` does not install environments",
            definition.id,
            runtime.name()
        )));
    }
    if !definition.dependencies().is_empty() {
        return Err(config_error(format!(
            "hook `{}` in {src} sets `additional_dependencies` but `{}` does not install environments",
            definition.id,
            runtime.name()
        )));
    }
    Ok(())
}

struct Resolver<'a> {
    config: &'a Config,
    root: &'a Path,
    store: &'a Store,
    languages: &'a LanguageRegistry,
}

impl Resolver<'_> {
    fn hook<F>(&self, src: &str, definition: &HookConfig, prefix: F) -> Result<Hook>
    where
        F: FnOnce(&dyn LanguageRuntime) -> Result<PathBuf>,
    {
        let runtime = runtime_for(definition, src, self.languages)?;
        let mut version = self.config.language_version_for(definition);
        check_environmentless(definition, &version, runtime, src)?;
        if version == DEFAULT_VERSION {
            version = runtime.default_version();
        }
        let prefix = prefix(runtime)?;
        Ok(Hook::resolve(src, &prefix, definition, version, self.config)?)
    }

    fn local(&self, repo: &RepoConfig) -> Result<Vec<Hook>> {
        repo.hooks
            .iter()
            .map(|definition| {
                self.hook(&repo.repo, definition, |runtime| {
                    if runtime.environment_dir().is_some() {
                        self.store.make_local(definition.dependencies())
                    } else {
                        Ok(self.root.to_path_buf())
                    }
                })
            })
            .collect()
    }

    fn remote(&self, repo: &RepoConfig) -> Result<Vec<Hook>> {
        let rev = repo.rev.as_deref().unwrap_or_default();
        let checkout = self.store.clone(&repo.repo, rev, &[])?;
        let manifest = Manifest::load_from_repo(&checkout)?;

        let mut hooks = Vec::with_capacity(repo.hooks.len());
        for user in &repo.hooks {
            let base = manifest.get(&user.id).ok_or_else(|| {
                config_error(format!(
                    "`{}` is not present in repository {} at {rev}. \
                     Typo? Perhaps it is introduced in a newer version?",
                    user.id, repo.repo
                ))
            })?;
            let definition = base.merged(user);
            let hook = self.hook(&repo.repo, &definition, |_| {
                if definition.dependencies().is_empty() {
                    Ok(checkout.clone())
                } else {
                    self.store.clone(&repo.repo, rev, definition.dependencies())
                }
            })?;
            hooks.push(hook);
        }
        Ok(hooks)
    }
}

/// Every configured hook, resolved, in configuration order
///
/// `root` is the repository the hooks run in; it is the prefix of local hooks
/// whose language needs no environment.
#[tracing::instrument(skip_all)]
pub fn all_hooks(
    config: &Config,
    root: &Path,
    store: &Store,
    languages: &LanguageRegistry,
) -> Result<Vec<Hook>> {
    let resolver = Resolver {
        config,
        root,
        store,
        languages,
    };
    let mut hooks = Vec::new();
    for repo in &config.repos {
        if repo.is_local() {
            hooks.extend(resolver.local(repo)?);
        } else {
            hooks.extend(resolver.remote(repo)?);
        }
    }
    tracing::debug!(count = hooks.len(), "resolved hooks");
    Ok(hooks)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::error::Error;
    use crate::git::tests::{git, init_repo};
    use std::fs;
    use tempfile::TempDir;

    fn resolve(toml: &str) -> (TempDir, Result<Vec<Hook>>) {
        let temp = TempDir::new().unwrap();
        let store = Store::new(temp.path().join("cache"));
        let config = Config::from_toml_str(toml).unwrap();
        let hooks = all_hooks(&config, temp.path(), &store, &LanguageRegistry::builtin());
        (temp, hooks)
    }

    #[test]
    fn test_local_system_hook_runs_from_root() {
        let (temp, hooks) = resolve(
            r#"
[[repos]]
repo = "local"
[[repos.hooks]]
id = "check"
entry = "echo"
language = "system"
"#,
        );
        let hooks = hooks.unwrap();
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].prefix, temp.path());
        assert_eq!(hooks[0].language_version, DEFAULT_VERSION);
        assert_eq!(hooks[0].src, "local");
    }

    #[test]
    fn test_environmentless_language_rejects_dependencies() {
        let (_temp, hooks) = resolve(
            r#"
[[repos]]
repo = "local"
[[repos.hooks]]
id = "check"
entry = "echo"
language = "system"
additional_dependencies = ["foo"]
"#,
        );
        assert!(hooks.unwrap_err().to_string().contains("additional_dependencies"));
    }

    #[test]
    fn test_environmentless_language_rejects_version() {
        let (_temp, hooks) = resolve(
            r#"
[[repos]]
repo = "local"
[[repos.hooks]]
id = "check"
entry = "echo"
language = "fail"
language_version = "3.12"
"#,
        );
        assert!(hooks.unwrap_err().to_string().contains("language_version"));
    }

    #[test]
    fn test_unknown_language() {
        let (_temp, hooks) = resolve(
            r#"
[[repos]]
repo = "local"
[[repos.hooks]]
id = "check"
entry = "echo"
language = "cobol"
"#,
        );
        assert!(matches!(hooks, Err(Error::UnknownLanguage(_))));
    }

    #[test]
    fn test_local_environment_hook_gets_store_prefix() {
        let (temp, hooks) = resolve(
            r#"
[default_language_version]
python = "python3.99"

[[repos]]
repo = "local"
[[repos.hooks]]
id = "lint"
entry = "flake8"
language = "python"
additional_dependencies = ["flake8"]
"#,
        );
        let hooks = hooks.unwrap();
        assert!(hooks[0].prefix.starts_with(temp.path().join("cache")));
        assert_eq!(hooks[0].language_version, "python3.99");
    }

    fn hook_repo() -> (TempDir, String) {
        let (dir, _repo) = init_repo();
        fs::write(
            dir.path().join("lintel-hooks.toml"),
            r#"
[[hooks]]
id = "no-todo"
name = "no todo"
entry = "TODO"
language = "pygrep"
types = ["text"]
"#,
        )
        .unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-q", "-m", "hooks"]);
        let sha = git2::Repository::open(dir.path())
            .unwrap()
            .head()
            .unwrap()
            .peel_to_commit()
            .unwrap()
            .id()
            .to_string();
        (dir, sha)
    }

    #[test]
    fn test_remote_hook_merges_manifest() {
        let (remote, sha) = hook_repo();
        let url = remote.path().display().to_string();
        let (_temp, hooks) = resolve(&format!(
            r#"
[[repos]]
repo = "{url}"
rev = "{sha}"
[[repos.hooks]]
id = "no-todo"
args = ["--ignore-case"]
"#
        ));
        let hooks = hooks.unwrap();
        assert_eq!(hooks[0].name, "no todo");
        assert_eq!(hooks[0].args, vec!["--ignore-case"]);
        assert_eq!(hooks[0].types, vec!["text"]);
        assert!(hooks[0].prefix.join("lintel-hooks.toml").exists());
    }

    #[test]
    fn test_remote_hook_missing_from_manifest() {
        let (remote, sha) = hook_repo();
        let url = remote.path().display().to_string();
        let (_temp, hooks) = resolve(&format!(
            r#"
[[repos]]
repo = "{url}"
rev = "{sha}"
[[repos.hooks]]
id = "no-fixme"
"#
        ));
        let err = hooks.unwrap_err().to_string();
        assert!(err.contains("`no-fixme` is not present"), "{err}");
    }
}
