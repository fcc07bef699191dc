//! Configuration commands.

use std::path::Path;

use crate::config::CalendarConfig;
use crate::error::CliResult;

/// Dump the effective configuration to stdout.
pub fn dump(config: &CalendarConfig, source: &Path) -> CliResult<()> {
    println!("# config.toml ({})", source.display());
    println!("{}", config.to_toml()?);
    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &CalendarConfig) -> CliResult<()> {
    config.validate()?;
    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration file path.
pub fn path(source: &Path) -> CliResult<()> {
    println!("config: {}", source.display());
    Ok(())
}
