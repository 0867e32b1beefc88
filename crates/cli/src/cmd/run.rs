//! Run command implementation
//!
//! Resolves the repository, config and skip set, then hands over to the
//! engine's runner. A first SIGINT or SIGTERM only sets a flag so the stash
//! guard can put unstaged changes back before the process exits; a second one
//! exits at once, leaving the stash patch in the cache directory.

use anyhow::{Context as _, Result};
use clap::{Args, ValueEnum};
use lintel_config::Config;
use lintel_config::config::{SKIP_ENV, parse_skips};
use lintel_engine::languages::LanguageRegistry;
use lintel_engine::{Error, Git, GitRepo, RunOptions, Runner};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::command::{Command, Context};

/// When to color output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Color when stdout is a terminal and `NO_COLOR` is unset
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn enabled(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal(),
        }
    }
}

/// Run command
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Run only the hook with this id or alias
    #[arg(value_name = "HOOK")]
    pub hook: Option<String>,

    /// Run on every tracked file
    #[arg(short, long, conflicts_with = "files")]
    pub all_files: bool,

    /// Run on these files only
    #[arg(long, num_args = 1.., value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Run only hooks declared for this stage
    #[arg(long, value_name = "STAGE")]
    pub hook_stage: Option<String>,

    /// Print the changes hooks made when a hook fails
    #[arg(long)]
    pub show_diff_on_failure: bool,

    /// Color output
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,
}

impl Command for RunCommand {
    fn execute(&self, context: &Context) -> Result<i32> {
        let cwd = std::env::current_dir().context("Failed to read the current directory")?;
        let git = GitRepo::discover(&cwd)?;

        let config_path = std::path::absolute(cwd.join(&context.config))
            .with_context(|| format!("Invalid config path {}", context.config.display()))?;
        let config = Config::load(&config_path)?;
        context
            .store
            .mark_config_used(&config_path)
            .context("Failed to record config usage")?;

        let interrupted = interrupt_flag().context("Failed to install signal handler")?;

        let options = RunOptions {
            all_files: self.all_files,
            files: relative_to_root(&self.files, &cwd, git.root()),
            hook: self.hook.clone(),
            hook_stage: self.hook_stage.clone(),
            show_diff_on_failure: self.show_diff_on_failure,
            verbose: context.verbose,
            color: self.color.enabled(),
            skips: parse_skips(std::env::var(SKIP_ENV).ok().as_deref()),
            interrupted: Some(interrupted),
        };
        tracing::debug!(?options, "starting run");

        let languages = LanguageRegistry::builtin();
        let runner = Runner::new(&git, &context.store, &languages);
        match runner.run(&config, &options, std::io::stdout().lock()) {
            Ok(report) => Ok(report.retcode),
            // Already reported by the runner
            Err(Error::Precondition(_)) => Ok(1),
            Err(e) => Err(e.into()),
        }
    }
}

/// Flag raised by the first SIGINT/SIGTERM; the second terminates with status 1
fn interrupt_flag() -> std::io::Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        // Must precede `register` so it sees the flag as it was before this signal
        signal_hook::flag::register_conditional_shutdown(signal, 1, Arc::clone(&interrupted))?;
        signal_hook::flag::register(signal, Arc::clone(&interrupted))?;
    }
    Ok(interrupted)
}

/// Turn command-line paths into paths relative to the repository root
fn relative_to_root(files: &[PathBuf], cwd: &Path, root: &Path) -> Vec<PathBuf> {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    files
        .iter()
        .map(|file| {
            let absolute = cwd.join(file);
            let absolute = absolute.canonicalize().unwrap_or(absolute);
            absolute
                .strip_prefix(&root)
                .map_or_else(|_| file.clone(), Path::to_path_buf)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_paths_become_root_relative() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::write(root.join("src/nested/a.py"), "").unwrap();

        let files = relative_to_root(
            &[PathBuf::from("nested/a.py"), PathBuf::from("../README.md")],
            &root.join("src"),
            &root,
        );
        assert_eq!(files[0], PathBuf::from("src/nested/a.py"));
        assert_eq!(files[1], PathBuf::from("src/../README.md"));
    }

    #[test]
    fn test_paths_outside_root_are_kept() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().canonicalize().unwrap();
        let root = base.join("repo");
        fs::create_dir_all(&root).unwrap();
        let outside = base.join("elsewhere.txt");
        fs::write(&outside, "").unwrap();

        let files = relative_to_root(std::slice::from_ref(&outside), &root, &root);
        assert_eq!(files, vec![outside]);
    }

    #[cfg(unix)]
    #[test]
    fn test_first_interrupt_only_raises_flag() {
        use std::sync::atomic::Ordering;

        let interrupted = interrupt_flag().unwrap();
        assert!(!interrupted.load(Ordering::SeqCst));
        signal_hook::low_level::raise(signal_hook::consts::SIGINT).unwrap();
        assert!(interrupted.load(Ordering::SeqCst));
    }

    #[test]
    fn test_color_choice() {
        assert!(ColorChoice::Always.enabled());
        assert!(!ColorChoice::Never.enabled());
    }
}
