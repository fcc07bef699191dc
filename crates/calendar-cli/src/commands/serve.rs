//! Serve command: runs the service in the foreground.
//!
//! Builds the storage backend and the broker, installs the signal listener
//! and hands everything to the supervisor. Blocks until SIGINT, SIGTERM or
//! SIGHUP, or until a subsystem fails.

use std::sync::Arc;

use tracing::{error, info};

use calendar_broker::MemoryBroker;
use calendar_server::{Calendar, SignalHandler, Supervisor};
use calendar_storage::{MemoryStorage, Storage};

use crate::config::{CalendarConfig, StorageKind};
use crate::error::{CliError, CliResult};

/// Runs the service until shutdown.
pub async fn run(config: &CalendarConfig, kind: StorageKind) -> CliResult<()> {
    config.validate()?;
    let supervisor_config = config.supervisor_config()?;

    let storage = build_storage(config, kind).await?;
    info!(backend = storage.name(), "Storage ready");
    let calendar = Arc::new(Calendar::new(storage));

    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener()?;

    let supervisor = Supervisor::new(
        supervisor_config,
        calendar,
        Arc::new(MemoryBroker::new()),
        signal_handler.shutdown_handle(),
    );
    let report = supervisor.run().await?;

    for failure in report.failures.iter().chain(&report.teardown_errors) {
        error!(component = failure.component, error = %failure.message, "Unclean stop");
    }
    match report.is_clean() {
        true => Ok(()),
        false => Err(CliError::Unclean {
            failures: report.failures.len() + report.teardown_errors.len(),
        }),
    }
}

async fn build_storage(config: &CalendarConfig, kind: StorageKind) -> CliResult<Arc<dyn Storage>> {
    match kind {
        StorageKind::Memory => Ok(Arc::new(MemoryStorage::new())),
        #[cfg(feature = "postgres")]
        StorageKind::Sql => {
            let storage = calendar_storage::PgStorage::connect(&config.database.pg_config()).await?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "postgres"))]
        StorageKind::Sql => {
            let _ = config;
            Err(CliError::config(
                "sql storage requires the `postgres` feature",
            ))
        }
    }
}
