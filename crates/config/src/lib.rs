//! Configuration for lintel
//!
//! This crate handles:
//! - Loading `lintel.toml` and hook repository manifests
//! - Resolving hook definitions into [`Hook`]s
//! - Locating the cache directory
//! - Logging initialization

pub mod config;
pub mod dirs;
pub mod hooks;
pub mod logging;

// Re-export error types from core
pub use lintel_core::{Error, Result};

pub use config::{CONFIG_FILE, Config, LOCAL_REPO, MANIFEST_FILE, Manifest, RepoConfig};
pub use dirs::cache_dir;
pub use hooks::{Hook, HookConfig, InstallKey};
