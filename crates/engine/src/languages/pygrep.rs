//! In-process regex search where a match is a failure
//!
//! `entry` is the pattern. `args` may contain `-i`/`--ignore-case`,
//! `--multiline` (the pattern sees the whole file, `.` matches newlines) and
//! `--negate` (files *without* a match fail instead).

use super::{LanguageRuntime, RunContext};
use crate::error::{Error, Result};
use crate::xargs::RunOutput;
use lintel_config::Hook;
use rayon::prelude::*;
use regex::bytes::{Regex, RegexBuilder};
use std::fs;
use std::path::Path;

/// Grep with regex syntax, inverted exit status
#[derive(Debug, Clone, Copy, Default)]
pub struct Pygrep;

#[derive(Debug, Default, Clone, Copy)]
struct Options {
    ignore_case: bool,
    multiline: bool,
    negate: bool,
}

impl Options {
    fn parse(hook: &Hook) -> Result<Self> {
        let mut options = Self::default();
        for arg in &hook.args {
            match arg.as_str() {
                "-i" | "--ignore-case" => options.ignore_case = true,
                "--multiline" => options.multiline = true,
                "--negate" => options.negate = true,
                other => {
                    return Err(lintel_core::Error::Config(format!(
                        "hook `{}`: unknown pygrep argument `{other}`",
                        hook.id
                    ))
                    .into());
                }
            }
        }
        Ok(options)
    }

    fn compile(self, pattern: &str) -> Result<Regex> {
        RegexBuilder::new(pattern)
            .case_insensitive(self.ignore_case)
            .multi_line(self.multiline)
            .dot_matches_new_line(self.multiline)
            .build()
            .map_err(Error::from)
    }
}

fn strip_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Report every matching line as `file:line:text`
///
/// The line is matched without its `\n` so `$` anchors at the end of the line.
fn by_line(pattern: &Regex, filename: &str, contents: &[u8]) -> (bool, Vec<u8>) {
    let mut out = Vec::new();
    let mut found = false;
    for (index, line) in contents.split_inclusive(|&b| b == b'\n').enumerate() {
        if pattern.is_match(line.strip_suffix(b"\n").unwrap_or(line)) {
            found = true;
            out.extend_from_slice(format!("{filename}:{}:", index + 1).as_bytes());
            out.extend_from_slice(strip_eol(line));
            out.push(b'\n');
        }
    }
    (found, out)
}

/// Report the first match against the whole file, from its line start
fn at_once(pattern: &Regex, filename: &str, contents: &[u8]) -> (bool, Vec<u8>) {
    let Some(m) = pattern.find(contents) else {
        return (false, Vec::new());
    };
    let before = &contents[..m.start()];
    let line_no = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    let line_end = contents[m.end()..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(contents.len(), |i| m.end() + i);

    let mut out = format!("{filename}:{line_no}:").into_bytes();
    out.extend_from_slice(strip_eol(&contents[line_start..line_end]));
    out.push(b'\n');
    (true, out)
}

fn check_file(pattern: &Regex, options: Options, root: &Path, filename: &str) -> Result<(bool, Vec<u8>)> {
    let contents = fs::read(root.join(filename))?;
    let (found, out) = if options.multiline {
        at_once(pattern, filename, &contents)
    } else {
        by_line(pattern, filename, &contents)
    };
    if options.negate {
        Ok(if found {
            (false, Vec::new())
        } else {
            (true, format!("{filename}\n").into_bytes())
        })
    } else {
        Ok((found, out))
    }
}

impl LanguageRuntime for Pygrep {
    fn name(&self) -> &'static str {
        "pygrep"
    }

    fn run(&self, hook: &Hook, filenames: &[String], ctx: &RunContext) -> Result<RunOutput> {
        let options = Options::parse(hook)?;
        let pattern = options.compile(&hook.entry)?;

        let results: Vec<(bool, Vec<u8>)> = filenames
            .par_iter()
            .map(|f| check_file(&pattern, options, &ctx.root, f))
            .collect::<Result<_>>()?;

        let mut aggregate = RunOutput::default();
        for (failed, out) in results {
            if failed {
                aggregate.code = 1;
            }
            aggregate.output.extend(out);
        }
        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use lintel_config::{Config, HookConfig};
    use tempfile::TempDir;

    fn hook(pattern: &str, args: &[&str]) -> Hook {
        let definition = HookConfig {
            id: "grep".into(),
            entry: Some(pattern.into()),
            language: Some("pygrep".into()),
            args: Some(args.iter().map(ToString::to_string).collect()),
            ..HookConfig::default()
        };
        Hook::resolve("local", Path::new("."), &definition, "default".into(), &Config::default())
            .unwrap()
    }

    fn run(dir: &TempDir, hook: &Hook, files: &[&str]) -> RunOutput {
        let files: Vec<String> = files.iter().map(ToString::to_string).collect();
        Pygrep.run(hook, &files, &RunContext::new(dir.path())).unwrap()
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f1"), "foo\nbar\nbaz\n").unwrap();
        fs::write(dir.path().join("f2"), "[INFO] hi\n").unwrap();
        fs::write(dir.path().join("f3"), "with\nmultiline\nmatch\n").unwrap();
        dir
    }

    #[test]
    fn test_match_is_failure() {
        let dir = fixture();
        let out = run(&dir, &hook("baz", &[]), &["f1", "f2"]);
        assert_eq!(out.code, 1);
        assert_eq!(out.output, b"f1:3:baz\n");
    }

    #[test]
    fn test_end_anchor_matches_before_newline() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "x TODO\nfine\nTODO later\n").unwrap();
        let out = run(&dir, &hook("TODO$", &[]), &["a.txt"]);
        assert_eq!(out.code, 1);
        assert_eq!(out.output, b"a.txt:1:x TODO\n");
    }

    #[test]
    fn test_no_match_passes() {
        let dir = fixture();
        let out = run(&dir, &hook("nope", &[]), &["f1", "f2", "f3"]);
        assert_eq!(out.code, 0);
        assert!(out.output.is_empty());
    }

    #[test]
    fn test_ignore_case() {
        let dir = fixture();
        let out = run(&dir, &hook("info", &["--ignore-case"]), &["f2"]);
        assert_eq!(out.code, 1);
        assert_eq!(out.output, b"f2:1:[INFO] hi\n");
    }

    #[test]
    fn test_multiline_reports_from_line_start() {
        let dir = fixture();
        let out = run(&dir, &hook("ith\\nmulti", &["--multiline"]), &["f1", "f3"]);
        assert_eq!(out.code, 1);
        assert_eq!(out.output, b"f3:1:with\nmultiline\n");
    }

    #[test]
    fn test_negate_reports_files_without_match() {
        let dir = fixture();
        let out = run(&dir, &hook("foo", &["--negate"]), &["f1", "f2"]);
        assert_eq!(out.code, 1);
        assert_eq!(out.output, b"f2\n");
    }

    #[test]
    fn test_unknown_argument_is_rejected() {
        let dir = fixture();
        let err = Pygrep
            .run(&hook("x", &["--bogus"]), &[], &RunContext::new(dir.path()))
            .unwrap_err();
        assert!(err.to_string().contains("--bogus"));
    }
}
