//! Throwaway git repositories for engine tests

#![allow(dead_code, clippy::unwrap_used, clippy::panic)]

use lintel_config::Config;
use lintel_engine::{GitRepo, LanguageRegistry, RunOptions, RunReport, Runner, Store};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;
use tempfile::TempDir;

pub fn git_output(dir: &Path, args: &[&str]) -> Output {
    duct::cmd("git", args)
        .dir(dir)
        .env("GIT_AUTHOR_NAME", "t")
        .env("GIT_AUTHOR_EMAIL", "t@example.com")
        .env("GIT_COMMITTER_NAME", "t")
        .env("GIT_COMMITTER_EMAIL", "t@example.com")
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .unwrap()
}

pub fn git(dir: &Path, args: &[&str]) {
    let output = git_output(dir, args);
    assert!(
        output.status.success(),
        "git {args:?}: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

pub struct Fixture {
    _repo: TempDir,
    _cache: TempDir,
    pub root: PathBuf,
    pub git: GitRepo,
    pub store: Store,
    pub languages: LanguageRegistry,
}

impl Fixture {
    pub fn new() -> Self {
        let repo = TempDir::new().unwrap();
        let root = repo.path().canonicalize().unwrap();
        git(&root, &["init", "-q"]);
        git(&root, &["config", "commit.gpgsign", "false"]);
        git(&root, &["config", "core.autocrlf", "false"]);

        let cache = TempDir::new().unwrap();
        let store = Store::new(cache.path().join("store"));
        Self {
            git: GitRepo::discover(&root).unwrap(),
            _repo: repo,
            _cache: cache,
            root,
            store,
            languages: LanguageRegistry::builtin(),
        }
    }

    pub fn write(&self, path: &str, contents: &str) {
        let path = self.root.join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    pub fn read(&self, path: &str) -> String {
        fs::read_to_string(self.root.join(path)).unwrap()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.root.join(path).exists()
    }

    pub fn add(&self, path: &str) {
        git(&self.root, &["add", "--", path]);
    }

    pub fn commit_all(&self, message: &str) {
        git(&self.root, &["add", "-A"]);
        git(&self.root, &["commit", "-q", "--allow-empty", "-m", message]);
    }

    /// Write and stage `lintel.toml`, then load it
    pub fn config(&self, toml: &str) -> Config {
        self.write("lintel.toml", toml);
        self.add("lintel.toml");
        Config::load(self.root.join("lintel.toml")).unwrap()
    }

    pub fn try_run(&self, config: &Config, options: &RunOptions) -> lintel_engine::Result<(RunReport, String)> {
        let mut out = Vec::new();
        let runner = Runner::new(&self.git, &self.store, &self.languages);
        let report = runner.run(config, options, &mut out)?;
        Ok((report, String::from_utf8(out).unwrap()))
    }

    pub fn run(&self, config: &Config, options: &RunOptions) -> (RunReport, String) {
        self.try_run(config, options).unwrap()
    }
}

/// A `local` repo with one hook per `(id, extra keys)` pair
pub fn local_hooks(hooks: &[(&str, &str)]) -> String {
    let mut toml = String::from("[[repos]]\nrepo = \"local\"\n");
    for (id, keys) in hooks {
        toml.push_str(&format!("[[repos.hooks]]\nid = \"{id}\"\n{keys}\n"));
    }
    toml
}
