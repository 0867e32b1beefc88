//! CLI command implementations

pub mod clean;
pub mod gc;
pub mod identify;
pub mod run;
