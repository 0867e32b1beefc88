//! Run orchestration
//!
//! One run moves through
//! `Idle -> ResolvingFileSet -> Isolating -> RunningHooks -> Restoring -> Reporting -> Done`.
//! Isolation and restoring only happen in the default mode, where hooks see
//! staged content; `--all-files` and explicit files run against the working
//! tree as it is.
//!
//! Hooks run one after another in configuration order. A hook fails when its
//! exit code differs from the expected one or when it changed tracked files.

use crate::classify::Classifier;
use crate::error::{Error, PreconditionViolation, Result};
use crate::filter::{CandidateFile, Selection};
use crate::git::Git;
use crate::install;
use crate::languages::{LanguageRegistry, RunContext};
use crate::output::{self, Printer, Status};
use crate::repository;
use crate::staged::StagedFilesOnly;
use crate::store::Store;
use crate::xargs::RunOutput;
use lintel_config::{Config, Hook};
use regex::Regex;
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// What to run and how to report it
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run on every tracked file
    pub all_files: bool,
    /// Run on these files (relative to the repository root) only
    pub files: Vec<PathBuf>,
    /// Run only the hook with this id or alias
    pub hook: Option<String>,
    /// Run only hooks declared for this stage
    pub hook_stage: Option<String>,
    /// Print `git diff` when a hook failed
    pub show_diff_on_failure: bool,
    /// Print details for every hook, not just failing ones
    pub verbose: bool,
    pub color: bool,
    /// Hook ids and aliases to skip
    pub skips: HashSet<String>,
    /// Set from a signal handler; stops the run after the current hook
    pub interrupted: Option<Arc<AtomicBool>>,
}

impl RunOptions {
    fn isolates(&self) -> bool {
        !self.all_files && self.files.is_empty()
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn skips(&self, hook: &Hook) -> bool {
        self.skips.contains(&hook.id)
            || hook.alias.as_ref().is_some_and(|a| self.skips.contains(a))
    }
}

/// Result of one hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookReport {
    pub id: String,
    pub status: Status,
    pub code: i32,
    pub files_modified: bool,
    pub duration: Option<Duration>,
}

impl HookReport {
    fn skipped(hook: &Hook, status: Status) -> Self {
        Self {
            id: hook.id.clone(),
            status,
            code: 0,
            files_modified: false,
            duration: None,
        }
    }

    pub fn failed(&self) -> bool {
        self.status == Status::Failed
    }
}

/// Result of a run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// `0` when every hook passed or was skipped, `1` otherwise
    pub retcode: i32,
    pub hooks: Vec<HookReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    ResolvingFileSet,
    Isolating,
    RunningHooks,
    Restoring,
    Reporting,
    Done,
}

struct StateMachine(RunState);

impl StateMachine {
    fn advance(&mut self, next: RunState) {
        tracing::debug!(from = ?self.0, to = ?next, "run state");
        self.0 = next;
    }
}

/// Runs configured hooks against a repository
pub struct Runner<'a, G: Git + ?Sized> {
    git: &'a G,
    store: &'a Store,
    languages: &'a LanguageRegistry,
}

impl<'a, G: Git + ?Sized> Runner<'a, G> {
    pub fn new(git: &'a G, store: &'a Store, languages: &'a LanguageRegistry) -> Self {
        Self {
            git,
            store,
            languages,
        }
    }

    fn check_preconditions(&self, config: &Config, options: &RunOptions) -> Result<()> {
        if !options.isolates() {
            return Ok(());
        }
        if self.git.has_unmerged_paths()? {
            tracing::error!("Unmerged files. Resolve before committing.");
            return Err(PreconditionViolation::UnmergedFiles.into());
        }
        if config.path.exists() && self.git.has_unstaged_changes(&config.path)? {
            tracing::error!("Configuration {} is unstaged.", config.path.display());
            return Err(PreconditionViolation::UnstagedConfig {
                path: config.path.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn candidates(&self, options: &RunOptions) -> Result<Vec<CandidateFile>> {
        if !options.files.is_empty() {
            self.git.files_from_paths(&options.files)
        } else if options.all_files {
            self.git.all_files()
        } else if self.git.is_in_merge_conflict() {
            self.git.conflicted_files()
        } else {
            self.git.staged_files()
        }
    }

    fn selected_hooks(&self, config: &Config, options: &RunOptions) -> Result<Vec<Hook>> {
        let hooks = repository::all_hooks(config, self.git.root(), self.store, self.languages)?;
        Ok(hooks
            .into_iter()
            .filter(|hook| options.hook.as_deref().is_none_or(|name| hook.is_named(name)))
            .filter(|hook| match options.hook_stage.as_deref() {
                Some(stage) => hook.stages.is_empty() || hook.stages.iter().any(|s| s == stage),
                None => true,
            })
            .collect())
    }

    /// Run every selected hook and print a status line for each to `out`
    pub fn run<W: Write>(&self, config: &Config, options: &RunOptions, out: W) -> Result<RunReport> {
        let mut state = StateMachine(RunState::Idle);
        self.check_preconditions(config, options)?;

        state.advance(RunState::ResolvingFileSet);
        let candidates = self.candidates(options)?;
        tracing::debug!(candidates = candidates.len(), "resolved file set");

        let guard = if options.isolates() {
            state.advance(RunState::Isolating);
            Some(StagedFilesOnly::enter(self.git, self.store.directory())?)
        } else {
            None
        };

        let hooks = self.selected_hooks(config, options)?;
        let mut printer = Printer::new(out, output::columns(&hooks), options.color);

        let report = match &options.hook {
            Some(name) if hooks.is_empty() => {
                printer.line(&Error::HookNotFound(name.clone()).to_string())?;
                RunReport {
                    retcode: 1,
                    hooks: Vec::new(),
                }
            }
            _ => {
                let to_install: Vec<Hook> = hooks
                    .iter()
                    .filter(|hook| !options.skips(hook))
                    .cloned()
                    .collect();
                install::ensure_installed(&to_install, self.languages, self.store)?;

                state.advance(RunState::RunningHooks);
                self.run_hooks(config, &hooks, candidates, options, &mut printer)?
            }
        };

        if let Some(guard) = guard {
            state.advance(RunState::Restoring);
            guard.restore()?;
        }

        state.advance(RunState::Reporting);
        let failed = report.hooks.iter().filter(|h| h.failed()).count();
        tracing::debug!(hooks = report.hooks.len(), failed, retcode = report.retcode, "run finished");
        state.advance(RunState::Done);
        Ok(report)
    }

    fn run_hooks<W: Write>(
        &self,
        config: &Config,
        hooks: &[Hook],
        candidates: Vec<CandidateFile>,
        options: &RunOptions,
        printer: &mut Printer<W>,
    ) -> Result<RunReport> {
        let classifier = Classifier::new();
        let include = Regex::new(&config.files)?;
        let exclude = Regex::new(&config.exclude)?;
        let selection = Selection::from_config(self.git.root(), candidates, &include, &exclude, &classifier);
        let ctx = RunContext::new(self.git.root());

        let mut report = RunReport::default();
        let mut diff = self.git.diff(false)?;
        for hook in hooks {
            if options.is_interrupted() {
                tracing::warn!("Interrupted, not running remaining hooks");
                report.retcode = 1;
                break;
            }

            let (result, diff_after) = self.run_hook(hook, &selection, &ctx, &diff, options, printer)?;
            diff = diff_after;
            if result.failed() {
                report.retcode = 1;
            }
            report.hooks.push(result);

            if report.retcode != 0 && (config.fail_fast || hook.fail_fast) {
                tracing::debug!(hook = %hook.id, "fail fast");
                break;
            }
        }

        if report.retcode != 0 && options.show_diff_on_failure && !diff.is_empty() {
            if options.all_files {
                printer.line(
                    "lintel hook(s) made changes.\n\
                     If you are seeing this message in CI, reproduce locally with: \
                     `lintel run --all-files`.",
                )?;
            }
            printer.line("All changes made by hooks:")?;
            printer.raw(&self.git.diff(options.color)?)?;
        }
        Ok(report)
    }

    #[tracing::instrument(skip_all, fields(hook = %hook.id))]
    fn run_hook<W: Write>(
        &self,
        hook: &Hook,
        selection: &Selection<'_>,
        ctx: &RunContext,
        diff_before: &[u8],
        options: &RunOptions,
        printer: &mut Printer<W>,
    ) -> Result<(HookReport, Vec<u8>)> {
        if options.skips(hook) {
            printer.skipped(&hook.name, Status::Skipped)?;
            return Ok((HookReport::skipped(hook, Status::Skipped), diff_before.to_vec()));
        }

        let files = selection.for_hook(hook)?;
        if files.is_empty() && !hook.always_run {
            printer.skipped(&hook.name, Status::NoFiles)?;
            return Ok((HookReport::skipped(hook, Status::NoFiles), diff_before.to_vec()));
        }

        printer.start(&hook.name)?;
        let filenames: Vec<String> = if hook.pass_filenames {
            files.iter().map(|f| f.display_path()).collect()
        } else {
            Vec::new()
        };

        let runtime = self.languages.get(&hook.language)?;
        let started = Instant::now();
        let result = match runtime.run(hook, &filenames, ctx) {
            Ok(result) => result,
            Err(e) if e.is_hook_local() => {
                tracing::debug!("{e}");
                RunOutput::failure(format!("{e}\n"))
            }
            Err(e) => {
                printer.finish(Status::Failed)?;
                return Err(e);
            }
        };
        let duration = started.elapsed();

        let diff_after = self.git.diff(false)?;
        let files_modified = diff_after.as_slice() != diff_before;
        let bad_code = result.code != hook.expected_exit_code;
        let status = if bad_code || files_modified {
            Status::Failed
        } else {
            Status::Passed
        };
        printer.finish(status)?;

        let verbose = options.verbose || hook.verbose;
        if verbose || status == Status::Failed {
            printer.detail(&format!("- hook id: {}", hook.id))?;
            if verbose {
                printer.detail(&format!("- duration: {:.2}s", duration.as_secs_f64()))?;
            }
            if bad_code {
                printer.detail(&format!("- exit code: {}", result.code))?;
            }
            if files_modified {
                printer.detail("- files were modified by this hook")?;
            }
            printer.hook_output(&result.output, hook.log_file.as_deref())?;
        }

        Ok((
            HookReport {
                id: hook.id.clone(),
                status,
                code: result.code,
                files_modified,
                duration: Some(duration),
            },
            diff_after,
        ))
    }
}
