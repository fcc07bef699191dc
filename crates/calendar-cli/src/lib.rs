//! The `calendar` command-line interface.
//!
//! Parses arguments, loads `config.toml` and wires storage, broker and the
//! server supervisor together.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use config::CalendarConfig;
pub use error::{CliError, CliResult};
