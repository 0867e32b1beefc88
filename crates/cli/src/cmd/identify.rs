//! Identify command implementation
//!
//! Prints the tags hooks would filter on, one path per line:
//!
//! ```text
//! setup.py: file, nonexecutable, python, text
//! ```

use anyhow::{Context as _, Result};
use clap::Args;
use lintel_engine::FileMode;
use lintel_engine::classify::tags_from_path;
use std::path::{Path, PathBuf};

use crate::command::{Command, Context};

/// Identify command
#[derive(Debug, Args)]
pub struct IdentifyCommand {
    /// Files to classify
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

impl Command for IdentifyCommand {
    fn execute(&self, _context: &Context) -> Result<i32> {
        for path in &self.paths {
            println!("{}", describe(path)?);
        }
        Ok(0)
    }
}

fn describe(path: &Path) -> Result<String> {
    let mode = FileMode::from_fs(path)
        .with_context(|| format!("Cannot identify {}", path.display()))?;
    let tags = tags_from_path(path, mode)
        .with_context(|| format!("Cannot identify {}", path.display()))?;
    let tags: Vec<&str> = tags.into_iter().collect();
    Ok(format!("{}: {}", path.display(), tags.join(", ")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_describe_lists_sorted_tags() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("setup.py");
        fs::write(&path, "print('hi')\n").unwrap();

        let line = describe(&path).unwrap();
        let (_, tags) = line.rsplit_once(": ").unwrap();
        let tags: Vec<&str> = tags.split(", ").collect();
        let mut sorted = tags.clone();
        sorted.sort_unstable();
        assert_eq!(tags, sorted);
        assert!(tags.contains(&"python"));
    }

    #[test]
    fn test_describe_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(describe(&temp.path().join("missing")).is_err());
    }
}
