//! Gc command implementation

use anyhow::{Context as _, Result};
use clap::Args;

use crate::command::{Command, Context};

/// Gc command
#[derive(Debug, Args)]
pub struct GcCommand {}

impl Command for GcCommand {
    fn execute(&self, context: &Context) -> Result<i32> {
        let removed = context
            .store
            .gc()
            .context("Failed to collect unused repositories")?;
        println!("{removed} repo(s) removed.");
        Ok(0)
    }
}
