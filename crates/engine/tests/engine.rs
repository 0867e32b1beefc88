//! Store, partitioner and classifier behaviour through the public API

#![allow(clippy::unwrap_used, clippy::panic)]

use lintel_engine::classify::tags_from_path;
use lintel_engine::xargs::{XargsOptions, partition, xargs};
use lintel_engine::{FileMode, Store};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_failed_clone_leaves_no_trace() {
    let temp = TempDir::new().unwrap();
    let store = Store::new(temp.path().join("store"));
    let missing = temp.path().join("no-such-repo");

    let err = store
        .clone(&missing.to_string_lossy(), "v1.0.0", &[])
        .unwrap_err();
    assert!(err.to_string().contains("Failed to clone"), "{err}");

    let leftovers: Vec<_> = fs::read_dir(store.directory())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_dir())
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
    assert!(store.entries().unwrap().is_empty());
}

#[test]
fn test_many_long_filenames_are_batched() {
    let files: Vec<String> = (0..400).map(|_| "a".repeat(104)).collect();
    let cmd = vec!["lint".to_string()];
    let batches = partition(&cmd, &files, 1, 4096).unwrap();

    assert!(batches.len() > 1);
    let total: usize = batches.iter().map(|b| b.args.len()).sum();
    assert_eq!(total, files.len());
    assert!(batches.iter().all(|b| b.command_length() <= 4096));
}

#[cfg(unix)]
#[test]
fn test_batched_run_aggregates_success() {
    let temp = TempDir::new().unwrap();
    let files: Vec<String> = (0..400).map(|_| "a".repeat(104)).collect();
    let options = XargsOptions {
        target_concurrency: 4,
        max_length: Some(4096),
        cwd: Some(temp.path().to_path_buf()),
        ..XargsOptions::default()
    };
    let result = xargs(&["true".to_string()], &files, &options).unwrap();
    assert_eq!(result.code, 0);
}

#[cfg(unix)]
#[test]
fn test_negated_grep_fails_on_match() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("hit.txt"), "needle\n").unwrap();
    fs::write(temp.path().join("miss.txt"), "hay\n").unwrap();
    let options = XargsOptions {
        negate: true,
        cwd: Some(temp.path().to_path_buf()),
        ..XargsOptions::default()
    };
    let cmd = ["grep".to_string(), "-H".to_string(), "needle".to_string()];

    let hit = xargs(&cmd, &["hit.txt".to_string()], &options).unwrap();
    assert_eq!(hit.code, 1);
    assert_eq!(hit.output, b"hit.txt:needle\n");

    let miss = xargs(&cmd, &["miss.txt".to_string()], &options).unwrap();
    assert_eq!(miss.code, 0);
}

#[test]
fn test_classification_depends_only_on_name_bytes_and_mode() {
    let temp = TempDir::new().unwrap();
    let script = temp.path().join("a.py");
    fs::write(&script, "print('hi')\n").unwrap();
    let tags = tags_from_path(&script, FileMode::Regular).unwrap();
    for tag in ["file", "text", "python", "nonexecutable"] {
        assert!(tags.contains(tag), "{tags:?}");
    }

    let elf = temp.path().join("bin");
    fs::write(&elf, b"\x7fELF\x02\x01\x01\x00\x00\x00\x00\x00").unwrap();
    let tags = tags_from_path(&elf, FileMode::Executable).unwrap();
    for tag in ["file", "binary", "executable"] {
        assert!(tags.contains(tag), "{tags:?}");
    }
    assert_eq!(tags, tags_from_path(&elf, FileMode::Executable).unwrap());
}
