//! Per-hook file selection
//!
//! Candidates are first narrowed by the top-level `files`/`exclude` patterns and
//! to paths that still exist. Each hook then applies its own patterns and tag
//! constraints. Candidate order is preserved throughout.

use crate::classify::{Classifier, FileMode, Tags};
use crate::error::Result;
use lintel_config::Hook;
use regex::Regex;
use std::path::{Path, PathBuf};

/// A path relative to the repository root, with its git mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub mode: FileMode,
}

impl CandidateFile {
    pub fn new(path: impl Into<PathBuf>, mode: FileMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    /// Path with forward slashes, as patterns expect
    pub fn display_path(&self) -> String {
        normalize(&self.path)
    }
}

fn normalize(path: &Path) -> String {
    let s = path.to_string_lossy();
    if cfg!(windows) {
        s.replace('\\', "/")
    } else {
        s.into_owned()
    }
}

/// Keep files whose path matches `include` (searched) and not `exclude`
pub fn filter_by_patterns<'a, I>(files: I, include: &Regex, exclude: &Regex) -> Vec<&'a CandidateFile>
where
    I: IntoIterator<Item = &'a CandidateFile>,
{
    files
        .into_iter()
        .filter(|f| {
            let path = f.display_path();
            include.is_match(&path) && !exclude.is_match(&path)
        })
        .collect()
}

/// Whether a tag set satisfies `types`, `types_or` and `exclude_types`
pub fn tags_match(tags: &Tags, types: &[String], types_or: &[String], exclude_types: &[String]) -> bool {
    types.iter().all(|t| tags.contains(t.as_str()))
        && (types_or.is_empty() || types_or.iter().any(|t| tags.contains(t.as_str())))
        && !exclude_types.iter().any(|t| tags.contains(t.as_str()))
}

/// Candidate files for one run, ready for per-hook selection
pub struct Selection<'a> {
    root: PathBuf,
    files: Vec<CandidateFile>,
    classifier: &'a Classifier,
}

impl<'a> Selection<'a> {
    /// Apply the top-level patterns and drop paths that no longer exist
    pub fn from_config(
        root: &Path,
        candidates: Vec<CandidateFile>,
        include: &Regex,
        exclude: &Regex,
        classifier: &'a Classifier,
    ) -> Self {
        let files = filter_by_patterns(&candidates, include, exclude)
            .into_iter()
            .filter(|f| std::fs::symlink_metadata(root.join(&f.path)).is_ok())
            .cloned()
            .collect();
        Self {
            root: root.to_path_buf(),
            files,
            classifier,
        }
    }

    /// Files remaining after the top-level filter
    pub fn files(&self) -> &[CandidateFile] {
        &self.files
    }

    /// Files `hook` should run against
    pub fn for_hook(&self, hook: &Hook) -> Result<Vec<&CandidateFile>> {
        let mut selected = Vec::new();
        for file in filter_by_patterns(&self.files, &hook.files, &hook.exclude) {
            let tags = self
                .classifier
                .classify(&self.root.join(&file.path), file.mode)?;
            if tags_match(&tags, &hook.types, &hook.types_or, &hook.exclude_types) {
                selected.push(file);
            }
        }
        tracing::debug!(hook = %hook.id, selected = selected.len(), "selected files");
        Ok(selected)
    }
}
