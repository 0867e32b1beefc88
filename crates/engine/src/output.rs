//! Hook status lines
//!
//! ```text
//! trim trailing whitespace.................................................Passed
//! check yaml...........................................(no files to check)Skipped
//! - hook id: check-yaml
//! ```

use lintel_config::Hook;
use owo_colors::OwoColorize;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

pub const NO_FILES: &str = "(no files to check)";
const SKIPPED: &str = "Skipped";
const MIN_COLUMNS: usize = 80;

/// Width of every status line: room for the longest name plus the
/// `(no files to check)Skipped` ending, never below 80
pub fn columns(hooks: &[Hook]) -> usize {
    let name_len = hooks
        .iter()
        .map(|h| h.name.chars().count())
        .max()
        .unwrap_or(0);
    (name_len + 3 + NO_FILES.len() + 1 + SKIPPED.len()).max(MIN_COLUMNS)
}

/// Outcome shown at the end of a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Passed,
    Failed,
    /// Named in `SKIP`
    Skipped,
    /// Nothing selected and not `always_run`
    NoFiles,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Status::Passed => "Passed",
            Status::Failed => "Failed",
            Status::Skipped | Status::NoFiles => SKIPPED,
        }
    }
}

/// Writes the run report
pub struct Printer<W: Write> {
    out: W,
    cols: usize,
    color: bool,
}

impl<W: Write> Printer<W> {
    pub fn new(out: W, cols: usize, color: bool) -> Self {
        Self { out, cols, color }
    }

    fn dots(&self, start: &str, end_len: usize) -> String {
        ".".repeat(
            self.cols
                .saturating_sub(start.chars().count() + end_len + 1)
                .max(1),
        )
    }

    fn status_text(&self, status: Status) -> String {
        let label = status.label();
        if !self.color {
            return label.to_string();
        }
        match status {
            Status::Passed => label.green().to_string(),
            Status::Failed => label.red().to_string(),
            Status::Skipped => label.yellow().to_string(),
            Status::NoFiles => label.cyan().to_string(),
        }
    }

    /// Name and dots, flushed before a hook starts so slow hooks show progress
    pub fn start(&mut self, name: &str) -> io::Result<()> {
        let dots = self.dots(name, "Passed".len());
        write!(self.out, "{name}{dots}")?;
        self.out.flush()
    }

    /// Complete a line begun with [`Printer::start`]
    pub fn finish(&mut self, status: Status) -> io::Result<()> {
        writeln!(self.out, "{}", self.status_text(status))
    }

    /// A whole line for a hook that did not run
    pub fn skipped(&mut self, name: &str, status: Status) -> io::Result<()> {
        let postfix = if status == Status::NoFiles { NO_FILES } else { "" };
        let dots = self.dots(name, postfix.len() + status.label().len());
        writeln!(self.out, "{name}{dots}{postfix}{}", self.status_text(status))
    }

    /// A dimmed `- key: value` detail line
    pub fn detail(&mut self, line: &str) -> io::Result<()> {
        if self.color {
            writeln!(self.out, "{}", line.dimmed())
        } else {
            writeln!(self.out, "{line}")
        }
    }

    /// Hook output, also appended to `log_file` when set
    pub fn hook_output(&mut self, output: &[u8], log_file: Option<&Path>) -> io::Result<()> {
        let output = output.trim_ascii();
        if output.is_empty() {
            return Ok(());
        }
        writeln!(self.out)?;
        self.out.write_all(output)?;
        writeln!(self.out)?;
        writeln!(self.out)?;

        if let Some(path) = log_file {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(output)?;
            file.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Free-form line
    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")
    }

    /// Raw bytes, such as a diff
    pub fn raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.out.write_all(bytes)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
