//! Git collaborator
//!
//! Everything the engine needs from the repository it runs in: candidate file
//! enumeration with modes, merge state, and the diff/checkout/apply primitives
//! the working-tree isolation is built from.
//!
//! Index reads go through git2. Patch production and application shell out to
//! the `git` CLI so the patch format (binary hunks, autocrlf handling) is exactly
//! what `git apply` expects.

use crate::classify::FileMode;
use crate::error::{Error, PreconditionViolation, Result};
use crate::filter::CandidateFile;
use git2::{Delta, Repository};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;

/// Repository operations used by the runner and the isolation guard
pub trait Git {
    /// Top of the working tree
    fn root(&self) -> &Path;

    /// Files staged for commit, deletions excluded
    fn staged_files(&self) -> Result<Vec<CandidateFile>>;

    /// Every tracked file
    fn all_files(&self) -> Result<Vec<CandidateFile>>;

    /// Files touched by an in-progress merge
    fn conflicted_files(&self) -> Result<Vec<CandidateFile>>;

    /// Explicitly named paths, with their index mode or a guessed one
    fn files_from_paths(&self, paths: &[PathBuf]) -> Result<Vec<CandidateFile>>;

    /// Whether the index still has unresolved conflicts
    fn has_unmerged_paths(&self) -> Result<bool>;

    /// Whether a merge is in progress
    fn is_in_merge_conflict(&self) -> bool;

    /// Whether `path` has edits not yet staged
    fn has_unstaged_changes(&self, path: &Path) -> Result<bool>;

    /// Binary patch from the index to the working tree, `None` when they agree
    fn worktree_diff(&self) -> Result<Option<Vec<u8>>>;

    /// Reset the working tree to the index
    fn checkout_index(&self) -> Result<()>;

    /// Apply a saved patch to the working tree
    fn apply_patch(&self, patch: &Path) -> Result<()>;

    /// Unstaged changes as text, for before/after comparison and display
    fn diff(&self, color: bool) -> Result<Vec<u8>>;
}

/// [`Git`] backed by git2 and the `git` executable
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    /// Find the repository containing `path`
    pub fn discover(path: &Path) -> Result<Self> {
        let not_a_repo = || PreconditionViolation::NotARepository {
            path: path.to_path_buf(),
        };
        let repo = Repository::discover(path).map_err(|_| not_a_repo())?;
        let root = repo.workdir().ok_or_else(not_a_repo)?.to_path_buf();
        Ok(Self { root })
    }

    fn open(&self) -> Result<Repository> {
        Ok(Repository::open(&self.root)?)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        tracing::trace!(?args, "git");
        duct::cmd("git", args)
            .dir(&self.root)
            .stdin_null()
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|e| Error::Git(format!("failed to run git: {e}")))
    }

    fn run_checked(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = self.run(args)?;
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(Error::Git(format!(
                "`git {}` failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    fn merge_msg_files(&self, repo: &Repository) -> Vec<String> {
        let Ok(message) = fs::read_to_string(repo.path().join("MERGE_MSG")) else {
            return Vec::new();
        };
        // Conflicted paths are listed tab-indented, optionally commented out
        message
            .lines()
            .filter_map(|line| line.strip_prefix('#').unwrap_or(line).strip_prefix('\t'))
            .map(|path| path.trim().to_string())
            .filter(|path| !path.is_empty())
            .collect()
    }
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

fn split_nul(stdout: &[u8]) -> impl Iterator<Item = PathBuf> + '_ {
    stdout
        .split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .map(path_from_bytes)
}

fn index_stage(flags: u16) -> u16 {
    (flags >> 12) & 0x3
}

impl Git for GitRepo {
    fn root(&self) -> &Path {
        &self.root
    }

    fn staged_files(&self) -> Result<Vec<CandidateFile>> {
        let repo = self.open()?;
        let index = repo.index()?;
        let head = repo.head().ok().and_then(|h| h.peel_to_tree().ok());
        let diff = repo.diff_tree_to_index(head.as_ref(), Some(&index), None)?;

        let mut files = Vec::new();
        for delta in diff.deltas() {
            if delta.status() == Delta::Deleted {
                continue;
            }
            let new_file = delta.new_file();
            let Some(path) = new_file.path() else {
                continue;
            };
            files.push(CandidateFile::new(
                path,
                FileMode::from_git(u32::from(new_file.mode()), path)?,
            ));
        }
        Ok(files)
    }

    fn all_files(&self) -> Result<Vec<CandidateFile>> {
        let index = self.open()?.index()?;
        let mut files = Vec::with_capacity(index.len());
        for entry in index.iter() {
            if index_stage(entry.flags) != 0 {
                continue;
            }
            let path = path_from_bytes(&entry.path);
            let mode = FileMode::from_git(entry.mode, &path)?;
            files.push(CandidateFile::new(path, mode));
        }
        Ok(files)
    }

    fn conflicted_files(&self) -> Result<Vec<CandidateFile>> {
        let repo = self.open()?;
        let mut paths: BTreeSet<PathBuf> = self
            .merge_msg_files(&repo)
            .into_iter()
            .map(PathBuf::from)
            .collect();

        // Files the merge brought in, conflicted or not
        let merged = self.run_checked(&[
            "diff",
            "--name-only",
            "--no-ext-diff",
            "-z",
            "-m",
            "HEAD",
            "MERGE_HEAD",
        ])?;
        paths.extend(split_nul(&merged));

        let paths: Vec<PathBuf> = paths.into_iter().collect();
        self.files_from_paths(&paths)
    }

    fn files_from_paths(&self, paths: &[PathBuf]) -> Result<Vec<CandidateFile>> {
        let index = self.open()?.index()?;
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(entry) = index.get_path(path, 0) {
                files.push(CandidateFile::new(path, FileMode::from_git(entry.mode, path)?));
                continue;
            }
            match FileMode::from_fs(&self.root.join(path)) {
                Ok(mode) => files.push(CandidateFile::new(path, mode)),
                Err(e) => tracing::debug!(path = %path.display(), "skipping: {e}"),
            }
        }
        Ok(files)
    }

    fn has_unmerged_paths(&self) -> Result<bool> {
        Ok(self.open()?.index()?.has_conflicts())
    }

    fn is_in_merge_conflict(&self) -> bool {
        let Ok(repo) = self.open() else {
            return false;
        };
        repo.path().join("MERGE_HEAD").exists() && repo.path().join("MERGE_MSG").exists()
    }

    fn has_unstaged_changes(&self, path: &Path) -> Result<bool> {
        let path = path.to_string_lossy();
        let output = self.run(&["diff", "--quiet", "--no-ext-diff", "--", &*path])?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(Error::Git(format!(
                "`git diff` failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }

    fn worktree_diff(&self) -> Result<Option<Vec<u8>>> {
        let tree = self.run_checked(&["write-tree"])?;
        let tree = String::from_utf8_lossy(&tree).trim().to_string();
        let output = self.run(&[
            "diff-index",
            "--ignore-submodules",
            "--binary",
            "--exit-code",
            "--no-color",
            "--no-ext-diff",
            tree.as_str(),
            "--",
        ])?;
        match output.status.code() {
            Some(0) => Ok(None),
            Some(1) if !output.stdout.is_empty() => Ok(Some(output.stdout)),
            Some(1) => Ok(None),
            _ => Err(Error::Git(format!(
                "`git diff-index` failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }

    fn checkout_index(&self) -> Result<()> {
        self.run_checked(&["-c", "submodule.recurse=0", "checkout", "--", "."])?;
        Ok(())
    }

    fn apply_patch(&self, patch: &Path) -> Result<()> {
        let patch_arg = patch.to_string_lossy();
        let first = self.run(&["apply", "--whitespace=nowarn", &*patch_arg])?;
        if first.status.success() {
            return Ok(());
        }
        tracing::debug!(
            "git apply failed, retrying without autocrlf: {}",
            String::from_utf8_lossy(&first.stderr).trim()
        );
        let second = self.run(&[
            "-c",
            "core.autocrlf=false",
            "apply",
            "--whitespace=nowarn",
            &*patch_arg,
        ])?;
        if second.status.success() {
            Ok(())
        } else {
            Err(Error::PatchReapply {
                patch: patch.to_path_buf(),
                message: String::from_utf8_lossy(&second.stderr).trim().to_string(),
            })
        }
    }

    fn diff(&self, color: bool) -> Result<Vec<u8>> {
        let color = if color { "--color=always" } else { "--no-color" };
        self.run_checked(&[
            "--no-pager",
            "diff",
            color,
            "--no-ext-diff",
            "--no-textconv",
            "--ignore-submodules",
        ])
    }
}
