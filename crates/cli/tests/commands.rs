//! Commands driven from inside throwaway git repositories

#![allow(clippy::unwrap_used, clippy::panic)]

use lintel::cmd::gc::GcCommand;
use lintel::cmd::identify::IdentifyCommand;
use lintel::cmd::run::{ColorChoice, RunCommand};
use lintel::command::{Command, Context};
use lintel_engine::Store;
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CONFIG: &str = r#"
[[repos]]
repo = "local"
[[repos.hooks]]
id = "no-todo"
name = "no todo"
entry = "TODO"
language = "pygrep"
files = '\.txt$'
"#;

fn git(dir: &Path, args: &[&str]) {
    duct::cmd("git", args)
        .dir(dir)
        .stdout_null()
        .stderr_null()
        .run()
        .unwrap();
}

fn context(cache: &TempDir) -> Context {
    Context {
        config: PathBuf::from("lintel.toml"),
        verbose: false,
        store: Store::new(cache.path().join("store")),
    }
}

fn run_all_files() -> RunCommand {
    RunCommand {
        hook: None,
        all_files: true,
        files: Vec::new(),
        hook_stage: None,
        show_diff_on_failure: false,
        color: ColorChoice::Never,
    }
}

/// Repository with the config and `files` staged, and the process inside it
fn enter_repo(files: &[(&str, &str)]) -> TempDir {
    let repo = TempDir::new().unwrap();
    git(repo.path(), &["init", "-q"]);
    fs::write(repo.path().join("lintel.toml"), CONFIG).unwrap();
    for (name, content) in files {
        fs::write(repo.path().join(name), content).unwrap();
    }
    git(repo.path(), &["add", "-A"]);
    std::env::set_current_dir(repo.path()).unwrap();
    repo
}

#[test]
#[serial]
fn test_run_exit_code_follows_hooks() {
    let cache = TempDir::new().unwrap();

    let _clean = enter_repo(&[("a.txt", "fine\n")]);
    assert_eq!(run_all_files().execute(&context(&cache)).unwrap(), 0);

    let _dirty = enter_repo(&[("a.txt", "TODO: fix\n")]);
    assert_eq!(run_all_files().execute(&context(&cache)).unwrap(), 1);
}

#[test]
#[serial]
fn test_run_records_config_for_gc() {
    let cache = TempDir::new().unwrap();
    let _repo = enter_repo(&[("a.txt", "fine\n")]);
    let ctx = context(&cache);

    run_all_files().execute(&ctx).unwrap();
    let tracked = ctx.store.tracked_configs().unwrap();
    assert_eq!(tracked.len(), 1);
    assert!(tracked[0].ends_with("lintel.toml"));

    assert_eq!(GcCommand {}.execute(&ctx).unwrap(), 0);
}

#[test]
#[serial]
fn test_run_outside_repository_fails() {
    let cache = TempDir::new().unwrap();
    let plain = TempDir::new().unwrap();
    std::env::set_current_dir(plain.path()).unwrap();

    let err = run_all_files().execute(&context(&cache)).unwrap_err();
    assert!(err.to_string().contains("Not inside a git repository"), "{err}");
}

#[test]
fn test_identify_known_file() {
    let cache = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("setup.py");
    fs::write(&path, "print('hi')\n").unwrap();

    let command = IdentifyCommand { paths: vec![path] };
    assert_eq!(command.execute(&context(&cache)).unwrap(), 0);
}
