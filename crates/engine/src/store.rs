//! On-disk cache of hook repositories
//!
//! Every (repository, revision, dependency set) gets its own uniquely named
//! directory under the cache root, recorded in a redb registry. Directories are
//! created once and only removed by [`Store::gc`] or [`Store::clean`].
//!
//! Layout:
//! ```text
//! <cache root>/
//!   README
//!   .lock          advisory lock for clone/install critical sections
//!   registry.redb
//!   repoXXXXXX/    one per entry
//! ```

use crate::error::{Error, Result};
use crate::registry::{CONFIGS_BUCKET, PersistentState, REPOS_BUCKET, RedbPersistentState};
use fs2::FileExt;
use lintel_config::{Config, LOCAL_REPO, Manifest};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Revision recorded for store-made local environments
pub const LOCAL_REPO_VERSION: &str = "1";

const README_FILE: &str = "README";
const README_TEXT: &str = "This directory is maintained by lintel.\n\
                      It caches hook repositories and their environments.\n\
                      It is safe to delete; `lintel clean` does so.\n";
const LOCK_FILE: &str = ".lock";
const REGISTRY_FILE: &str = "registry.redb";

/// A registered cache directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoEntry {
    pub repo: String,
    pub rev: String,
    pub dependencies: Vec<String>,
    pub path: PathBuf,
    /// Seconds since the epoch the entry was created
    pub last_used: u64,
}

impl RepoEntry {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| Error::Store(format!("Failed to encode registry entry: {e}")))
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .ok()
            .map(|(entry, _len)| entry)
    }
}

/// Registry key for (repo, rev, dependencies)
///
/// Dependencies are sorted so declaration order does not split the cache.
pub fn entry_key(repo: &str, rev: &str, dependencies: &[String]) -> Vec<u8> {
    let mut deps: Vec<&str> = dependencies.iter().map(String::as_str).collect();
    deps.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(repo.as_bytes());
    hasher.update([0]);
    hasher.update(rev.as_bytes());
    for dep in deps {
        hasher.update([0]);
        hasher.update(dep.as_bytes());
    }
    hasher.finalize().to_vec()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Held exclusive lock on the store; released on drop
#[derive(Debug)]
pub struct StoreLock {
    _file: File,
}

/// The cache store
#[derive(Debug, Clone)]
pub struct Store {
    directory: PathBuf,
}

impl Store {
    /// Store rooted at `directory`; nothing is created until first use
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Store at the configured cache root
    pub fn open_default() -> Result<Self> {
        let directory = lintel_config::cache_dir().ok_or_else(|| {
            Error::Store("cannot determine cache directory; set LINTEL_HOME".to_string())
        })?;
        Ok(Self::new(directory))
    }

    /// Cache root
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn ensure_created(&self) -> Result<()> {
        if self.directory.join(README_FILE).exists() {
            return Ok(());
        }
        fs::create_dir_all(&self.directory)?;
        fs::write(self.directory.join(README_FILE), README_TEXT)?;
        Ok(())
    }

    fn registry(&self) -> Result<RedbPersistentState> {
        self.ensure_created()?;
        RedbPersistentState::open_with_retry(self.directory.join(REGISTRY_FILE))
    }

    /// Take the store-wide advisory lock, waiting if another process holds it
    pub fn exclusive_lock(&self) -> Result<StoreLock> {
        self.ensure_created()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.directory.join(LOCK_FILE))?;
        if file.try_lock_exclusive().is_err() {
            tracing::info!("Locking lintel directory");
            file.lock_exclusive()?;
        }
        Ok(StoreLock { _file: file })
    }

    /// Registered path for the key, if any; takes no lock
    pub fn lookup(&self, repo: &str, rev: &str, dependencies: &[String]) -> Result<Option<PathBuf>> {
        let registry = self.registry()?;
        let Some(bytes) = registry.get(REPOS_BUCKET, &entry_key(repo, rev, dependencies))? else {
            return Ok(None);
        };
        Ok(RepoEntry::from_bytes(&bytes)
            .map(|entry| entry.path)
            .filter(|path| path.is_dir()))
    }

    /// Path for the key, creating it with `make` if it is not registered yet
    ///
    /// `make` runs under the exclusive lock in a fresh directory. If it fails
    /// the directory is removed and nothing is registered.
    #[tracing::instrument(skip(self, make))]
    pub fn acquire_with<F>(&self, repo: &str, rev: &str, dependencies: &[String], make: F) -> Result<PathBuf>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        if let Some(path) = self.lookup(repo, rev, dependencies)? {
            return Ok(path);
        }

        let _lock = self.exclusive_lock()?;
        // Another process may have finished the work while we waited
        if let Some(path) = self.lookup(repo, rev, dependencies)? {
            return Ok(path);
        }

        let staging = tempfile::Builder::new()
            .prefix("repo")
            .tempdir_in(&self.directory)?;
        make(staging.path())?;

        let entry = RepoEntry {
            repo: repo.to_string(),
            rev: rev.to_string(),
            dependencies: dependencies.to_vec(),
            path: staging.path().to_path_buf(),
            last_used: now_secs(),
        };
        self.registry()?
            .set(REPOS_BUCKET, &entry_key(repo, rev, dependencies), &entry.to_bytes()?)?;

        Ok(staging.keep())
    }

    /// Clone `repo` at `rev`
    pub fn clone(&self, repo: &str, rev: &str, dependencies: &[String]) -> Result<PathBuf> {
        self.acquire_with(repo, rev, dependencies, |dir| {
            tracing::info!("Initializing environment for {repo}.");
            checkout(repo, rev, dir)
        })
    }

    /// A store-owned directory for `local` hooks that need an environment
    pub fn make_local(&self, dependencies: &[String]) -> Result<PathBuf> {
        self.acquire_with(LOCAL_REPO, LOCAL_REPO_VERSION, dependencies, |dir| {
            tracing::info!("Initializing environment for local hooks.");
            fs::write(dir.join(".lintel-local"), "")?;
            Ok(())
        })
    }

    /// Remember that `config` uses this store, for [`Store::gc`]
    pub fn mark_config_used(&self, config: &Path) -> Result<()> {
        let config = std::path::absolute(config)?;
        if !config.exists() {
            return Ok(());
        }
        self.registry()?
            .set(CONFIGS_BUCKET, config.to_string_lossy().as_bytes(), &[])
    }

    /// Every registered entry
    pub fn entries(&self) -> Result<Vec<RepoEntry>> {
        let mut entries = Vec::new();
        self.registry()?.for_each(REPOS_BUCKET, |_, value| {
            if let Some(entry) = RepoEntry::from_bytes(value) {
                entries.push(entry);
            }
            Ok(())
        })?;
        Ok(entries)
    }

    /// Tracked configuration files that still exist; stale ones are forgotten
    pub fn tracked_configs(&self) -> Result<Vec<PathBuf>> {
        let registry = self.registry()?;
        let mut live = Vec::new();
        let mut dead = Vec::new();
        registry.for_each(CONFIGS_BUCKET, |key, _| {
            let path = PathBuf::from(String::from_utf8_lossy(key).into_owned());
            if path.exists() {
                live.push(path);
            } else {
                dead.push(key.to_vec());
            }
            Ok(())
        })?;
        for key in dead {
            registry.delete(CONFIGS_BUCKET, &key)?;
        }
        Ok(live)
    }

    fn used_keys(&self, config: &Config) -> Result<HashSet<Vec<u8>>> {
        let mut used = HashSet::new();
        for repo in &config.repos {
            if repo.is_local() {
                for hook in &repo.hooks {
                    used.insert(entry_key(LOCAL_REPO, LOCAL_REPO_VERSION, hook.dependencies()));
                }
                continue;
            }
            let rev = repo.rev.as_deref().unwrap_or_default();
            used.insert(entry_key(&repo.repo, rev, &[]));

            let manifest = self
                .lookup(&repo.repo, rev, &[])?
                .and_then(|path| Manifest::load_from_repo(&path).ok());
            for hook in &repo.hooks {
                let merged = manifest
                    .as_ref()
                    .and_then(|m| m.get(&hook.id))
                    .map_or_else(|| hook.clone(), |base| base.merged(hook));
                used.insert(entry_key(&repo.repo, rev, merged.dependencies()));
            }
        }
        Ok(used)
    }

    /// Remove entries no tracked configuration references
    ///
    /// Returns the number of entries removed.
    #[tracing::instrument(skip(self))]
    pub fn gc(&self) -> Result<usize> {
        let _lock = self.exclusive_lock()?;

        let mut used = HashSet::new();
        for path in self.tracked_configs()? {
            match Config::load(&path) {
                Ok(config) => used.extend(self.used_keys(&config)?),
                Err(e) => tracing::warn!("Ignoring unreadable config {}: {e}", path.display()),
            }
        }

        let registry = self.registry()?;
        let mut removed = 0;
        let mut stale = Vec::new();
        registry.for_each(REPOS_BUCKET, |key, value| {
            if !used.contains(key) {
                stale.push((key.to_vec(), RepoEntry::from_bytes(value)));
            }
            Ok(())
        })?;
        for (key, entry) in stale {
            if let Some(entry) = entry {
                tracing::debug!(repo = %entry.repo, rev = %entry.rev, "removing unused entry");
                if entry.path.exists() {
                    fs::remove_dir_all(&entry.path)?;
                }
            }
            registry.delete(REPOS_BUCKET, &key)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Delete the whole cache root
    pub fn clean(&self) -> Result<bool> {
        if !self.directory.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&self.directory)?;
        Ok(true)
    }
}

/// Clone `url` into `target` and check out `rev` with a detached HEAD
fn checkout(url: &str, rev: &str, target: &Path) -> Result<()> {
    use git2::build::{CheckoutBuilder, RepoBuilder};

    let repo = RepoBuilder::new().clone(url, target).map_err(|e| {
        Error::Git(format!(
            "Failed to clone {url}. Check the URL and your network connection. Error: {}",
            e.message()
        ))
    })?;

    let object = repo
        .revparse_single(rev)
        .or_else(|_| repo.revparse_single(&format!("origin/{rev}")))
        .map_err(|e| Error::Git(format!("Revision {rev} not found in {url}: {}", e.message())))?;
    let commit = object.peel_to_commit()?;

    repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
    repo.set_head_detached(commit.id())?;
    Ok(())
}
