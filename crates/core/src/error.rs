//! Base error types for lintel
//!
//! This module provides the foundation error types that all crates can use.

use std::path::PathBuf;
use thiserror::Error;

/// Base error type for shared functionality
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be read or parsed
    #[error("Failed to load configuration {}: {message}", path.display())]
    ConfigLoad { path: PathBuf, message: String },

    /// Configuration is well-formed but semantically invalid
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Generic error message
    #[error("{0}")]
    Message(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
