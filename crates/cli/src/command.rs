//! Command trait for the lintel CLI

use anyhow::Result;
use lintel_engine::Store;
use std::path::PathBuf;

/// State shared by every command
pub struct Context {
    /// Config file as given on the command line
    pub config: PathBuf,
    /// Global `--verbose`
    pub verbose: bool,
    /// Hook cache
    pub store: Store,
}

/// Trait for all lintel commands
pub trait Command {
    /// Execute the command and return the process exit code
    ///
    /// # Errors
    ///
    /// Returns an error for anything that is not a hook failure: a missing
    /// repository, an unreadable config, a store failure.
    fn execute(&self, context: &Context) -> Result<i32>;
}
