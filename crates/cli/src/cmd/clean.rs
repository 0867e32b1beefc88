//! Clean command implementation

use anyhow::{Context as _, Result};
use clap::Args;
use owo_colors::OwoColorize;

use crate::command::{Command, Context};

/// Clean command
#[derive(Debug, Args)]
pub struct CleanCommand {}

impl Command for CleanCommand {
    fn execute(&self, context: &Context) -> Result<i32> {
        let directory = context.store.directory();
        let removed = context
            .store
            .clean()
            .with_context(|| format!("Failed to remove {}", directory.display()))?;
        if removed {
            println!("{} {}", "Cleaned".green(), directory.display());
        } else {
            println!("Nothing to clean at {}", directory.display());
        }
        Ok(0)
    }
}
