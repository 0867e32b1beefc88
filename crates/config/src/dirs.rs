//! Cache directory resolution
//!
//! Cloned hook repositories and installed environments live under one cache
//! root:
//! - `$LINTEL_HOME` when set and non-empty
//! - otherwise `$XDG_CACHE_HOME/lintel`, defaulting to `~/.cache/lintel`

use std::ffi::OsString;
use std::path::PathBuf;
use xdg::BaseDirectories;

/// Environment variable overriding the cache root
pub const HOME_ENV: &str = "LINTEL_HOME";

/// Get the lintel cache directory
#[must_use]
pub fn cache_dir() -> Option<PathBuf> {
    cache_dir_from(std::env::var_os(HOME_ENV))
}

fn cache_dir_from(override_dir: Option<OsString>) -> Option<PathBuf> {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    // xdg 3.0: get_*_home returns Option<PathBuf>
    BaseDirectories::with_prefix("lintel")
        .get_cache_home()
        .or_else(|| dirs::home_dir().map(|home| home.join(".cache").join("lintel")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_override_wins() {
        let dir = cache_dir_from(Some(OsString::from("/srv/lintel-cache")));
        assert_eq!(dir, Some(PathBuf::from("/srv/lintel-cache")));
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let dir = cache_dir_from(Some(OsString::new())).unwrap();
        assert!(
            dir.to_string_lossy().contains("lintel"),
            "cache dir should contain 'lintel': {dir:?}"
        );
    }

    #[test]
    fn test_default_is_absolute() {
        if let Some(path) = cache_dir_from(None) {
            assert!(path.is_absolute(), "cache dir should be absolute: {path:?}");
            assert!(path.ends_with("lintel"));
        }
    }
}
