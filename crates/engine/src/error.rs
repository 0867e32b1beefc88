//! Error types for lintel-engine
//!
//! Hook-level failures that should not abort the run (a missing executable)
//! are turned into failed hook results by the runner; everything else
//! propagates to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for lintel-engine
#[derive(Error, Debug)]
pub enum Error {
    /// The hook's executable could not be resolved
    #[error("Executable `{exe}` {reason}")]
    ExecutableNotFound { exe: String, reason: String },

    /// A single argument does not fit the command-line budget on its own
    #[error("Argument of {} bytes exceeds the command-line limit of {max_length}: {arg}", arg.len())]
    ArgumentTooLong { arg: String, max_length: usize },

    /// Environment installation failed; the partial environment was removed
    #[error("Failed to install {language} environment in {}: {message}", prefix.display())]
    InstallFailure {
        language: String,
        prefix: PathBuf,
        message: String,
    },

    /// The repository is not in a state hooks can run in
    #[error(transparent)]
    Precondition(#[from] PreconditionViolation),

    /// Stashed edits could not be restored
    #[error("Failed to reapply stashed changes from {}: {message}", patch.display())]
    PatchReapply { patch: PathBuf, message: String },

    /// Git reported a file mode outside file, executable, symlink, submodule
    #[error("Unknown git object mode {mode:o} for {}", path.display())]
    UnknownFileMode { path: PathBuf, mode: u32 },

    /// No runtime registered under this name
    #[error("Unknown language `{0}`")]
    UnknownLanguage(String),

    /// `--hook` named a hook that is not configured
    #[error("No hook with id `{0}`")]
    HookNotFound(String),

    /// Git operation failed
    #[error("Git error: {0}")]
    Git(String),

    /// Cache store or registry failure
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid pattern
    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] lintel_core::Error),
}

impl From<git2::Error> for Error {
    fn from(err: git2::Error) -> Self {
        Error::Git(err.message().to_string())
    }
}

/// Conditions that abort a run before any hook starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionViolation {
    /// The index has unresolved merge conflicts
    #[error("Unmerged files. Resolve before committing.")]
    UnmergedFiles,

    /// The configuration file has edits that are not staged
    #[error("Your configuration file {} is unstaged. `git add {}` to fix this.", path.display(), path.display())]
    UnstagedConfig { path: PathBuf },

    /// The working directory is not inside a git repository
    #[error("Not inside a git repository: {}", path.display())]
    NotARepository { path: PathBuf },
}

impl Error {
    /// Whether the error should be reported as a failed hook rather than abort the run
    pub fn is_hook_local(&self) -> bool {
        matches!(
            self,
            Error::ExecutableNotFound { .. } | Error::ArgumentTooLong { .. }
        )
    }
}
