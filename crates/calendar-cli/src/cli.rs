//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::StorageKind;

/// calendar - events, users and reminder notifications
#[derive(Debug, Parser)]
#[command(name = "calendar")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CALENDAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Storage backend (overrides `storage.kind` in the configuration)
    #[arg(long, value_enum)]
    pub storage: Option<StorageKind>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The subcommand to run; `serve` when none was given.
    pub fn selected(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Serve)
    }
}

/// Available commands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the service in the foreground (default)
    Serve,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the version
    Version,
}

/// Configuration actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum ConfigAction {
    /// Dump the effective configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_is_the_default() {
        let cli = Cli::try_parse_from(["calendar"]).unwrap();
        assert_eq!(cli.selected(), &Command::Serve);
        assert!(cli.storage.is_none());
    }

    #[test]
    fn parses_global_flags() {
        let cli = Cli::try_parse_from([
            "calendar",
            "--config",
            "/etc/calendar.toml",
            "--storage",
            "sql",
            "--debug",
            "config",
            "validate",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/calendar.toml")));
        assert_eq!(cli.storage, Some(StorageKind::Sql));
        assert!(cli.debug);
        assert_eq!(
            cli.selected(),
            &Command::Config {
                action: ConfigAction::Validate
            }
        );
    }

    #[test]
    fn rejects_unknown_storage() {
        assert!(Cli::try_parse_from(["calendar", "--storage", "redis"]).is_err());
    }
}
