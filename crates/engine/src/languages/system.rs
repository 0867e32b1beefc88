//! Commands found on `PATH`

use super::{LanguageRuntime, RunContext, helpers};
use crate::error::Result;
use crate::xargs::RunOutput;
use lintel_config::Hook;

/// Runs `entry` as found on `PATH`
#[derive(Debug, Clone, Copy, Default)]
pub struct System;

impl LanguageRuntime for System {
    fn name(&self) -> &'static str {
        "system"
    }

    fn run(&self, hook: &Hook, filenames: &[String], ctx: &RunContext) -> Result<RunOutput> {
        helpers::run_xargs(hook, &hook.cmd()?, filenames, ctx)
    }
}
