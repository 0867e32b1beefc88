//! Python hooks in a virtualenv
//!
//! The environment lives in `<prefix>/py_env-<version>`. The hook repository
//! itself is pip-installed when it has packaging metadata, followed by any
//! additional dependencies.

use super::{LanguageRuntime, RunContext, helpers};
use crate::error::{Error, Result};
use crate::xargs::{self, RunOutput};
use indexmap::IndexMap;
use lintel_config::Hook;
use lintel_config::hooks::DEFAULT_VERSION;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const ENVIRONMENT_DIR: &str = "py_env";

/// Virtualenv-backed runtime
#[derive(Debug, Default)]
pub struct Python {
    default_version: OnceLock<String>,
}

fn bin_dir(env: &Path) -> PathBuf {
    if cfg!(windows) {
        env.join("Scripts")
    } else {
        env.join("bin")
    }
}

fn env_python(env: &Path) -> PathBuf {
    let name = if cfg!(windows) { "python.exe" } else { "python" };
    bin_dir(env).join(name)
}

fn install_failure(prefix: &Path, message: String) -> Error {
    Error::InstallFailure {
        language: "python".to_string(),
        prefix: prefix.to_path_buf(),
        message,
    }
}

fn run_step(prefix: &Path, program: &Path, args: &[OsString], cwd: &Path) -> Result<()> {
    tracing::debug!(program = %program.display(), ?args, "install step");
    let output = duct::cmd(program, args)
        .dir(cwd)
        .stdin_null()
        .stderr_to_stdout()
        .stdout_capture()
        .unchecked()
        .run()
        .map_err(|e| install_failure(prefix, format!("failed to run {}: {e}", program.display())))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(install_failure(
            prefix,
            format!(
                "`{} {}` exited with {}:\n{}",
                program.display(),
                args.iter()
                    .map(|a| a.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" "),
                output.status.code().unwrap_or(1),
                String::from_utf8_lossy(&output.stdout)
            ),
        ))
    }
}

impl Python {
    fn interpreter_for(&self, version: &str) -> String {
        if version == DEFAULT_VERSION {
            self.default_version()
        } else {
            version.to_string()
        }
    }
}

impl LanguageRuntime for Python {
    fn name(&self) -> &'static str {
        "python"
    }

    fn environment_dir(&self) -> Option<&'static str> {
        Some(ENVIRONMENT_DIR)
    }

    fn default_version(&self) -> String {
        self.default_version
            .get_or_init(|| {
                ["python3", "python"]
                    .into_iter()
                    .find(|candidate| which::which(candidate).is_ok())
                    .unwrap_or(DEFAULT_VERSION)
                    .to_string()
            })
            .clone()
    }

    fn health_check(&self, prefix: &Path, version: &str) -> std::result::Result<(), String> {
        let env = helpers::environment_dir(prefix, ENVIRONMENT_DIR, version);
        let python = env_python(&env);
        if !python.exists() {
            return Err(format!("{} does not exist", python.display()));
        }
        let output = duct::cmd(&python, ["-c", "import sys"])
            .stdin_null()
            .stdout_null()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|e| format!("failed to run {}: {e}", python.display()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).into_owned())
        }
    }

    fn install(&self, prefix: &Path, version: &str, dependencies: &[String]) -> Result<()> {
        let interpreter = self.interpreter_for(version);
        if interpreter == DEFAULT_VERSION {
            return Err(install_failure(
                prefix,
                "no python interpreter found on PATH".to_string(),
            ));
        }
        let interpreter = which::which(&interpreter)
            .map_err(|_| install_failure(prefix, format!("`{interpreter}` not found on PATH")))?;

        let env = helpers::environment_dir(prefix, ENVIRONMENT_DIR, version);
        run_step(
            prefix,
            &interpreter,
            &["-m".into(), "venv".into(), env.clone().into_os_string()],
            prefix,
        )?;

        let mut pip: Vec<OsString> = ["-m", "pip", "install", "--quiet"]
            .map(OsString::from)
            .to_vec();
        let base = pip.len();
        if prefix.join("setup.py").exists() || prefix.join("pyproject.toml").exists() {
            pip.push(".".into());
        }
        pip.extend(dependencies.iter().map(OsString::from));
        if pip.len() > base {
            run_step(prefix, &env_python(&env), &pip, prefix)?;
        }
        Ok(())
    }

    fn run(&self, hook: &Hook, filenames: &[String], ctx: &RunContext) -> Result<RunOutput> {
        let env = helpers::environment_dir(&hook.prefix, ENVIRONMENT_DIR, &hook.language_version);

        let mut paths = vec![bin_dir(&env)];
        if let Some(existing) = ctx
            .env
            .get("PATH")
            .map(OsString::from)
            .or_else(|| std::env::var_os("PATH"))
        {
            paths.extend(std::env::split_paths(&existing));
        }
        let path = std::env::join_paths(paths)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        let mut extra = IndexMap::new();
        extra.insert("VIRTUAL_ENV".to_string(), env.to_string_lossy().into_owned());
        extra.insert("PATH".to_string(), path.to_string_lossy().into_owned());

        let options = helpers::xargs_options(hook, ctx, extra);
        xargs::xargs(&hook.cmd()?, filenames, &options)
    }
}
