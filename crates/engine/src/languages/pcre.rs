//! Perl-compatible regex search through `grep -P`

use super::{LanguageRuntime, RunContext, helpers};
use crate::error::Result;
use crate::xargs::{self, RunOutput};
use indexmap::IndexMap;
use lintel_config::Hook;
use lintel_core::platform::CURRENT_PLATFORM;

/// `grep -H -n -P <entry>` over the files; any match fails the hook
#[derive(Debug, Clone, Copy, Default)]
pub struct Pcre;

fn grep() -> &'static str {
    // BSD grep has no -P
    if CURRENT_PLATFORM.os == "darwin" {
        "ggrep"
    } else {
        "grep"
    }
}

impl LanguageRuntime for Pcre {
    fn name(&self) -> &'static str {
        "pcre"
    }

    fn run(&self, hook: &Hook, filenames: &[String], ctx: &RunContext) -> Result<RunOutput> {
        let mut cmd: Vec<String> = [grep(), "-H", "-n", "-P"].map(String::from).to_vec();
        cmd.extend(hook.args.iter().cloned());
        cmd.push(hook.entry.clone());

        let mut options = helpers::xargs_options(hook, ctx, IndexMap::new());
        // grep exits 0 when it finds something
        options.negate = true;
        xargs::xargs(&cmd, filenames, &options)
    }
}
