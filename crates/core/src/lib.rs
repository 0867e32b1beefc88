//! Core types and utilities for lintel
//!
//! This is the foundation crate (Layer 0) that all other lintel crates depend on.
//! It provides:
//! - Base error types
//! - Platform facts (OS name, command-line length ceiling)
//!
//! This crate has no dependencies on other lintel crates.

pub mod error;
pub mod platform;

pub use error::{Error, Result};
