//! Hooks that reject every file they match

use super::{LanguageRuntime, RunContext};
use crate::error::Result;
use crate::xargs::RunOutput;
use lintel_config::Hook;

/// Always fails, printing `entry` and the offending filenames
#[derive(Debug, Clone, Copy, Default)]
pub struct Fail;

impl LanguageRuntime for Fail {
    fn name(&self) -> &'static str {
        "fail"
    }

    fn run(&self, hook: &Hook, filenames: &[String], _ctx: &RunContext) -> Result<RunOutput> {
        let mut output = format!("{}\n\n", hook.entry);
        for filename in filenames {
            output.push_str(filename);
            output.push('\n');
        }
        Ok(RunOutput {
            code: 1,
            output: output.into_bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use lintel_config::{Config, HookConfig};
    use std::path::Path;

    #[test]
    fn test_lists_files() {
        let definition = HookConfig {
            id: "no-rej".into(),
            entry: Some("Remove .rej files".into()),
            language: Some("fail".into()),
            ..HookConfig::default()
        };
        let hook = Hook::resolve("local", Path::new("."), &definition, "default".into(), &Config::default())
            .unwrap();
        let out = Fail
            .run(&hook, &["a.rej".into(), "b.rej".into()], &RunContext::new("."))
            .unwrap();
        assert_eq!(out.code, 1);
        assert_eq!(out.output, b"Remove .rej files\n\na.rej\nb.rej\n");
    }
}
