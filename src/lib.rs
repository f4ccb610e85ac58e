//! kiln: deterministic, content-addressed bundle emission for single-page web apps.
//!
//! A build resolves the module graph from the configured entries, assigns
//! modules to entry, shared, on-demand and style chunks, names every artifact
//! after its content, and writes the artifacts together with the page that
//! loads them.

pub mod cli;
pub mod core;
pub mod infrastructure;
pub mod utils;

pub use crate::core::{BuildConfig, BuildResult, BuildService, KilnBuildService, Mode};
pub use crate::utils::{KilnError, Result};
