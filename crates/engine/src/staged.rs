//! Working-tree isolation
//!
//! While hooks run on staged content, unstaged edits are saved as a patch and
//! the working tree is reset to the index. Dropping the guard puts the edits
//! back. If a hook changed a file the patch also touches, the hook's changes
//! are discarded and the patch is applied again: the developer's edits win.

use crate::error::Result;
use crate::git::Git;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Keeps unstaged edits out of the working tree until dropped
pub struct StagedFilesOnly<'a, G: Git + ?Sized> {
    git: &'a G,
    patch: Option<PathBuf>,
}

impl<'a, G: Git + ?Sized> StagedFilesOnly<'a, G> {
    /// Stash unstaged edits into a patch file under `patch_dir`
    pub fn enter(git: &'a G, patch_dir: &Path) -> Result<Self> {
        let Some(diff) = git.worktree_diff()? else {
            tracing::debug!("no unstaged changes");
            return Ok(Self { git, patch: None });
        };

        fs::create_dir_all(patch_dir)?;
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        let patch = patch_dir.join(format!("patch{secs}-{}", std::process::id()));

        tracing::warn!("Unstaged files detected.");
        tracing::info!("Stashing unstaged files to {}.", patch.display());
        fs::write(&patch, diff)?;

        // From here on the edits live only in the patch; let Drop restore them
        let guard = Self {
            git,
            patch: Some(patch),
        };
        guard.git.checkout_index()?;
        Ok(guard)
    }

    /// Patch holding the stashed edits, if any were stashed
    pub fn patch(&self) -> Option<&Path> {
        self.patch.as_deref()
    }

    /// Restore now and report failure instead of logging it
    pub fn restore(mut self) -> Result<()> {
        match self.patch.take() {
            Some(patch) => reapply(self.git, &patch),
            None => Ok(()),
        }
    }
}

fn reapply<G: Git + ?Sized>(git: &G, patch: &Path) -> Result<()> {
    if let Err(e) = git.apply_patch(patch) {
        tracing::warn!("Stashed changes conflicted with hook auto-fixes... Rolling back fixes...");
        tracing::debug!("{e}");
        git.checkout_index()?;
        git.apply_patch(patch)?;
    }
    tracing::info!("Restored changes from {}.", patch.display());
    Ok(())
}

impl<G: Git + ?Sized> Drop for StagedFilesOnly<'_, G> {
    fn drop(&mut self) {
        if let Some(patch) = self.patch.take() {
            if let Err(e) = reapply(self.git, &patch) {
                tracing::error!(
                    "Failed to restore unstaged changes, they are kept in {}: {e}",
                    patch.display()
                );
            }
        }
    }
}
