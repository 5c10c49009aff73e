//! Command-line interface for lexicard.
//!
//! This module provides commands for running an import, inspecting and
//! rewinding the import state, and writing a starter config file.

mod commands;

pub use commands::{Cli, Commands, run_command};
