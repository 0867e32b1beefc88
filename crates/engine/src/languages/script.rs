//! Scripts shipped inside the hook repository

use super::{LanguageRuntime, RunContext, helpers};
use crate::error::Result;
use crate::xargs::RunOutput;
use lintel_config::Hook;

/// Runs `entry` relative to the hook's prefix
#[derive(Debug, Clone, Copy, Default)]
pub struct Script;

impl LanguageRuntime for Script {
    fn name(&self) -> &'static str {
        "script"
    }

    fn run(&self, hook: &Hook, filenames: &[String], ctx: &RunContext) -> Result<RunOutput> {
        let mut cmd = hook.cmd()?;
        cmd[0] = hook.prefix.join(&cmd[0]).to_string_lossy().into_owned();
        helpers::run_xargs(hook, &cmd, filenames, ctx)
    }
}
