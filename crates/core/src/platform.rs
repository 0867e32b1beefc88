//! Platform facts needed when spawning hook processes
//!
//! - OS name using kernel conventions (`"darwin"`, `"linux"`, `"windows"`)
//! - The command-line length ceiling used to batch filenames
//!
//! Platform info is cached on first access.

use std::sync::LazyLock;

/// Current platform information (cached)
pub static CURRENT_PLATFORM: LazyLock<Platform> = LazyLock::new(Platform::detect);

/// Smallest command-line budget POSIX guarantees.
pub const POSIX_MIN_LENGTH: usize = 1 << 12;

/// Upper bound on the budget; larger batches buy nothing.
pub const MAX_LENGTH_CAP: usize = 1 << 17;

/// Headroom left for the loader and argv pointers.
const HEADROOM: usize = 2048;

/// Platform information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// OS: "darwin" (macOS), "linux", "windows", "unknown"
    pub os: &'static str,
}

impl Platform {
    pub fn detect() -> Self {
        Self {
            os: Self::detect_os(),
        }
    }

    const fn detect_os() -> &'static str {
        #[cfg(target_os = "macos")]
        {
            "darwin"
        }

        #[cfg(target_os = "linux")]
        {
            "linux"
        }

        #[cfg(target_os = "windows")]
        {
            "windows"
        }

        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            "unknown"
        }
    }
}

/// Floor Linux applies to `ARG_MAX` however small the stack limit is.
const LINUX_MIN_ARG_MAX: usize = 1 << 17;

/// `ARG_MAX` the way `sysconf(_SC_ARG_MAX)` computes it on Linux: a quarter of
/// the stack soft limit, never below 128 KiB. `None` means unlimited.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn linux_arg_max(stack_limit: Option<u64>) -> usize {
    stack_limit
        .map_or(usize::MAX, |limit| usize::try_from(limit / 4).unwrap_or(usize::MAX))
        .max(LINUX_MIN_ARG_MAX)
}

#[cfg(target_os = "linux")]
fn arg_max() -> usize {
    use rustix::process::{Resource, getrlimit};
    linux_arg_max(getrlimit(Resource::Stack).current)
}

#[cfg(target_os = "macos")]
fn arg_max() -> usize {
    1_048_576
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn arg_max() -> usize {
    POSIX_MIN_LENGTH
}

/// Bytes the given environment occupies in `envp`
///
/// Each entry costs a pointer plus `KEY=VALUE\0`.
pub fn environ_size<'a, I>(env: I) -> usize
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    env.into_iter()
        .map(|(key, value)| 8 + key.len() + value.len() + 2)
        .sum()
}

/// Maximum serialized command length for processes spawned with `env`
///
/// On Windows the ceiling is the `UNICODE_STRING` limit minus headroom. Elsewhere
/// it is `ARG_MAX` minus headroom and the environment, clamped to
/// `[POSIX_MIN_LENGTH, MAX_LENGTH_CAP]`.
pub fn max_command_length<'a, I>(env: I) -> usize
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    if cfg!(windows) {
        return (1 << 15) - HEADROOM;
    }
    budget(arg_max(), env)
}

fn budget<'a, I>(arg_max: usize, env: I) -> usize
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    arg_max
        .saturating_sub(HEADROOM)
        .saturating_sub(environ_size(env))
        .clamp(POSIX_MIN_LENGTH, MAX_LENGTH_CAP)
}

/// Serialized length of a command as the OS counts it
///
/// Parts are joined by single spaces. Windows counts UTF-16 code units, other
/// platforms count bytes.
pub fn command_length<S: AsRef<str>>(parts: &[S]) -> usize {
    let separators = parts.len().saturating_sub(1);
    let content: usize = parts.iter().map(|p| encoded_len(p.as_ref())).sum();
    content + separators
}

fn encoded_len(s: &str) -> usize {
    if cfg!(windows) {
        s.encode_utf16().count()
    } else {
        s.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_length_joins_with_spaces() {
        assert_eq!(command_length(&["ruby", "-e"]), 7);
        assert_eq!(command_length::<&str>(&[]), 0);
        assert_eq!(command_length(&["x"]), 1);
    }

    #[test]
    fn test_environ_size_counts_pointer_and_terminators() {
        assert_eq!(environ_size([("A", "b")]), 8 + 1 + 1 + 2);
        assert_eq!(environ_size(std::iter::empty()), 0);
    }

    #[test]
    fn test_max_command_length_is_clamped() {
        let len = max_command_length(std::iter::empty());
        assert!(len >= POSIX_MIN_LENGTH);
        assert!(len <= MAX_LENGTH_CAP);
    }

    #[test]
    fn test_linux_arg_max_follows_stack_limit() {
        assert_eq!(linux_arg_max(Some(8 * 1024 * 1024)), 2 * 1024 * 1024);
        assert_eq!(linux_arg_max(Some(256 * 1024)), LINUX_MIN_ARG_MAX);
        assert_eq!(linux_arg_max(None), usize::MAX);
    }

    #[test]
    fn test_small_stack_leaves_room_for_environment() {
        // 512 KiB stack: the real limit is the 128 KiB floor, shared with envp
        let env = [("PATH", "/usr/bin:/bin")];
        let len = budget(linux_arg_max(Some(512 * 1024)), env);
        assert_eq!(len, LINUX_MIN_ARG_MAX - HEADROOM - environ_size(env));
        assert!(len < MAX_LENGTH_CAP);
    }

    #[test]
    fn test_huge_environment_hits_floor() {
        let big = "x".repeat(4_000_000);
        let env = [("BIG", big.as_str())];
        if !cfg!(windows) {
            assert_eq!(max_command_length(env), POSIX_MIN_LENGTH);
        }
    }
}
