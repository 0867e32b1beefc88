//! File classification
//!
//! Derives a set of tags for a path from its git mode, its name, its shebang
//! and a sniff of its first kilobyte. Hooks select files by these tags.
//!
//! Tags for an ordinary file:
//! - `file`
//! - `executable` or `nonexecutable`
//! - `text` or `binary`
//! - language tags from the filename table, or failing that from the shebang

mod tables;

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, PoisonError};

/// Tag set of one file
pub type Tags = BTreeSet<&'static str>;

/// Longest shebang line the kernel honours
pub const MAX_SHEBANG_LENGTH: usize = 128;

/// Bytes sniffed for the text/binary decision
const SNIFF_LENGTH: usize = 1024;

pub const GIT_MODE_FILE: u32 = 0o100_644;
pub const GIT_MODE_EXECUTABLE: u32 = 0o100_755;
pub const GIT_MODE_SYMLINK: u32 = 0o120_000;
pub const GIT_MODE_SUBMODULE: u32 = 0o160_000;

type Table = Vec<(Regex, &'static [&'static str])>;

#[allow(clippy::expect_used)]
fn compile(rows: &[(&str, &'static [&'static str])]) -> Table {
    rows.iter()
        .map(|(pattern, tags)| (Regex::new(pattern).expect("static pattern"), *tags))
        .collect()
}

static EXTENSIONS: LazyLock<Table> = LazyLock::new(|| compile(tables::KNOWN_EXTENSIONS));
static INTERPRETERS: LazyLock<Table> = LazyLock::new(|| compile(tables::KNOWN_INTERPRETERS));

/// How git stores a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    Regular,
    Executable,
    Symlink,
    Submodule,
}

impl FileMode {
    /// Interpret a mode from `git ls-files --stage` or the index
    pub fn from_git(mode: u32, path: &Path) -> Result<Self> {
        match mode {
            GIT_MODE_FILE => Ok(Self::Regular),
            GIT_MODE_EXECUTABLE => Ok(Self::Executable),
            GIT_MODE_SYMLINK => Ok(Self::Symlink),
            GIT_MODE_SUBMODULE => Ok(Self::Submodule),
            _ => Err(Error::UnknownFileMode {
                path: path.to_path_buf(),
                mode,
            }),
        }
    }

    /// Guess the mode of a path git does not know about
    pub fn from_fs(path: &Path) -> Result<Self> {
        let meta = std::fs::symlink_metadata(path)?;
        if meta.file_type().is_symlink() {
            return Ok(Self::Symlink);
        }
        if meta.is_dir() {
            if path.join(".git").exists() {
                return Ok(Self::Submodule);
            }
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            )));
        }
        if is_executable(&meta) {
            Ok(Self::Executable)
        } else {
            Ok(Self::Regular)
        }
    }
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    false
}

/// Compute the tags of `path`
///
/// Reads at most [`SNIFF_LENGTH`] bytes. The shebang is consulted only when the
/// filename table yields nothing and the content is text.
pub fn tags_from_path(path: &Path, mode: FileMode) -> Result<Tags> {
    let mut tags = Tags::new();
    let executable = match mode {
        FileMode::Symlink => {
            tags.insert("symlink");
            return Ok(tags);
        }
        FileMode::Submodule => {
            tags.insert("submodule");
            return Ok(tags);
        }
        FileMode::Regular => false,
        FileMode::Executable => true,
    };

    tags.insert("file");
    let by_name = tags_from_filename(path);
    let named = !by_name.is_empty();
    tags.extend(by_name);

    if is_binary(path)? {
        tags.insert("binary");
    } else {
        tags.insert("text");
        if !named {
            if let Some(interpreter) = parse_interpreter(path)? {
                tags.extend(tags_from_interpreter(&interpreter));
            }
        }
    }

    tags.insert(if executable {
        "executable"
    } else {
        "nonexecutable"
    });
    Ok(tags)
}

fn tags_from_filename(path: &Path) -> Vec<&'static str> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };
    EXTENSIONS
        .iter()
        .filter(|(re, _)| re.is_match(name))
        .flat_map(|(_, tags)| tags.iter().copied())
        .collect()
}

fn tags_from_interpreter(interpreter: &str) -> Vec<&'static str> {
    INTERPRETERS
        .iter()
        .filter(|(re, _)| re.is_match(interpreter))
        .flat_map(|(_, tags)| tags.iter().copied())
        .collect()
}

fn read_prefix(path: &Path, limit: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(limit);
    File::open(path)?
        .take(limit as u64)
        .read_to_end(&mut buf)?;
    Ok(buf)
}

fn is_text_byte(b: u8) -> bool {
    matches!(b, 7 | 8 | 9 | 10 | 12 | 13 | 27 | 0x20..=0x7e | 0x80..=0xff)
}

/// Whether the first kilobyte holds bytes outside the text allow-list
pub fn is_binary(path: &Path) -> Result<bool> {
    let head = read_prefix(path, SNIFF_LENGTH)?;
    Ok(head.iter().any(|&b| !is_text_byte(b)))
}

fn is_printable_ascii(b: u8) -> bool {
    b.is_ascii_graphic() || matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Words of the shebang line, or `None` if there is no readable one
///
/// The line must be printable ASCII within [`MAX_SHEBANG_LENGTH`] bytes. A
/// `/usr/bin/env prog` shebang yields `["prog"]`.
pub fn parse_shebang(path: &Path) -> Result<Option<Vec<String>>> {
    let head = read_prefix(path, MAX_SHEBANG_LENGTH)?;
    let line: Vec<u8> = head.iter().copied().take_while(|&b| b != b'\n').collect();
    if !line.iter().all(|&b| is_printable_ascii(b)) {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix(b"#!") else {
        return Ok(None);
    };
    let rest = String::from_utf8_lossy(rest);
    let mut words: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
    if words.is_empty() {
        return Ok(None);
    }
    if words.len() == 2 && words[0].ends_with("/env") {
        words.remove(0);
    }
    Ok(Some(words))
}

fn parse_interpreter(path: &Path) -> Result<Option<String>> {
    Ok(parse_shebang(path)?.and_then(|words| {
        words
            .first()
            .and_then(|w| w.rsplit('/').next())
            .map(str::to_string)
    }))
}

/// Memoizing classifier scoped to one run
#[derive(Debug, Default)]
pub struct Classifier {
    cache: Mutex<HashMap<PathBuf, Tags>>,
}

impl Classifier {
    /// Create an empty classifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags of `path`, computed once per path
    pub fn classify(&self, path: &Path, mode: FileMode) -> Result<Tags> {
        if let Some(tags) = self.lock().get(path) {
            return Ok(tags.clone());
        }
        let tags = tags_from_path(path, mode)?;
        self.lock().insert(path.to_path_buf(), tags.clone());
        Ok(tags)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Tags>> {
        self.cache.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("classifier cache lock poisoned, continuing");
            PoisonError::into_inner(poisoned)
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn set(tags: &[&'static str]) -> Tags {
        tags.iter().copied().collect()
    }

    #[test]
    fn test_python_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.py", b"print('hi')\n");
        let tags = tags_from_path(&path, FileMode::Regular).unwrap();
        assert_eq!(tags, set(&["file", "text", "python", "nonexecutable"]));
    }

    #[test]
    fn test_elf_executable() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "tool", b"\x7fELF\x02\x01\x01\x00\x00\x00\x00");
        let tags = tags_from_path(&path, FileMode::Executable).unwrap();
        assert!(tags.is_superset(&set(&["file", "binary", "executable"])));
        assert!(!tags.contains("text"));
    }

    #[test]
    fn test_shebang_used_without_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "run", b"#!/usr/bin/env bash\necho hi\n");
        let tags = tags_from_path(&path, FileMode::Executable).unwrap();
        assert_eq!(tags, set(&["file", "text", "shell", "executable"]));
    }

    #[test]
    fn test_shebang_ignored_when_extension_matches() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "x.rb", b"#!/usr/bin/python3\n");
        let tags = tags_from_path(&path, FileMode::Regular).unwrap();
        assert!(tags.contains("ruby"));
        assert!(!tags.contains("python"));
    }

    #[test]
    fn test_versioned_python_interpreter() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "script", b"#!/opt/bin/python3.12 -u\n");
        let tags = tags_from_path(&path, FileMode::Regular).unwrap();
        assert!(tags.contains("python"));
    }

    #[test]
    fn test_makefile_by_name() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "Makefile", b"all:\n\ttrue\n");
        let tags = tags_from_path(&path, FileMode::Regular).unwrap();
        assert!(tags.contains("make"));
    }

    #[test]
    fn test_symlink_and_submodule_are_single_tags() {
        let path = Path::new("does-not-need-to-exist");
        assert_eq!(
            tags_from_path(path, FileMode::Symlink).unwrap(),
            set(&["symlink"])
        );
        assert_eq!(
            tags_from_path(path, FileMode::Submodule).unwrap(),
            set(&["submodule"])
        );
    }

    #[test]
    fn test_unknown_git_mode_is_error() {
        let err = FileMode::from_git(0o040_000, Path::new("dir")).unwrap_err();
        assert!(matches!(err, Error::UnknownFileMode { mode: 0o040_000, .. }));
        assert_eq!(
            FileMode::from_git(GIT_MODE_EXECUTABLE, Path::new("x")).unwrap(),
            FileMode::Executable
        );
    }

    #[test]
    fn test_non_ascii_shebang_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "s", "#!/usr/bin/pythön\n".as_bytes());
        assert_eq!(parse_shebang(&path).unwrap(), None);
    }

    #[test]
    fn test_parse_shebang_words() {
        let dir = TempDir::new().unwrap();
        let env = write(&dir, "a", b"#!/usr/bin/env ruby\n");
        assert_eq!(parse_shebang(&env).unwrap(), Some(vec!["ruby".to_string()]));

        let direct = write(&dir, "b", b"#! /bin/sh -e\n");
        assert_eq!(
            parse_shebang(&direct).unwrap(),
            Some(vec!["/bin/sh".to_string(), "-e".to_string()])
        );

        let none = write(&dir, "c", b"plain text\n");
        assert_eq!(parse_shebang(&none).unwrap(), None);
    }

    #[test]
    fn test_high_bit_bytes_are_text() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "u.txt", "héllo wörld\n".as_bytes());
        assert!(!is_binary(&path).unwrap());
        let nul = write(&dir, "n.bin", b"abc\x00def");
        assert!(is_binary(&nul).unwrap());
    }

    #[test]
    fn test_classifier_memoizes() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.py", b"x = 1\n");
        let classifier = Classifier::new();
        let first = classifier.classify(&path, FileMode::Regular).unwrap();

        // Content changes are not observed within one run
        fs::write(&path, b"\x00\x01").unwrap();
        let second = classifier.classify(&path, FileMode::Regular).unwrap();
        assert_eq!(first, second);
    }
}
