//! # Lintel Engine
//!
//! Runs git hooks declared in `lintel.toml`.
//!
//! - **Classifier / Selection**: tag files and pick the ones each hook wants
//! - **Partitioner**: split file lists into command lines that fit the OS limit
//!   and run them on a bounded pool
//! - **Store**: cache of cloned hook repositories, guarded by a file lock
//! - **Install-state cache**: install each hook environment once
//! - **Isolation**: hide unstaged edits while hooks run
//! - **Runner**: the run loop tying these together

pub mod classify;
pub mod error;
pub mod filter;
pub mod git;
pub mod install;
pub mod languages;
pub mod output;
pub mod registry;
pub mod repository;
pub mod runner;
pub mod staged;
pub mod store;
pub mod xargs;

pub use error::{Error, PreconditionViolation, Result};

pub use classify::{Classifier, FileMode, Tags};
pub use filter::{CandidateFile, Selection};
pub use git::{Git, GitRepo};
pub use languages::{LanguageRegistry, LanguageRuntime, RunContext};
pub use runner::{HookReport, RunOptions, RunReport, Runner};
pub use staged::StagedFilesOnly;
pub use store::Store;
pub use xargs::RunOutput;
