//! Command-line interface.
//!
//! Argument parsing, command dispatch, and output rendering for the
//! `docent-rs` binary.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
