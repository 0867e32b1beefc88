//! Shared pieces of the runtimes

use super::RunContext;
use crate::error::Result;
use crate::xargs::{self, FIXED_RANDOM_SEED, RunOutput, XargsOptions};
use indexmap::IndexMap;
use lintel_config::Hook;
use std::path::{Path, PathBuf};

/// Directory of the environment for `version` under `prefix`
pub fn environment_dir(prefix: &Path, dir: &str, version: &str) -> PathBuf {
    prefix.join(format!("{dir}-{version}"))
}

/// Options for running `hook` through [`xargs::xargs`]
///
/// Serial hooks get one batch at a time and keep their argument order; other
/// hooks get a fixed-seed shuffle so batches are balanced but reproducible.
pub fn xargs_options(hook: &Hook, ctx: &RunContext, extra_env: IndexMap<String, String>) -> XargsOptions {
    let mut env = ctx.env.clone();
    env.extend(extra_env);
    XargsOptions {
        negate: false,
        target_concurrency: if hook.require_serial { 1 } else { ctx.concurrency },
        max_length: None,
        env,
        cwd: Some(ctx.root.clone()),
        shuffle_seed: (!hook.require_serial).then_some(FIXED_RANDOM_SEED),
    }
}

/// Run `cmd` over `filenames` with the hook's concurrency settings
pub fn run_xargs(hook: &Hook, cmd: &[String], filenames: &[String], ctx: &RunContext) -> Result<RunOutput> {
    xargs::xargs(cmd, filenames, &xargs_options(hook, ctx, IndexMap::new()))
}
