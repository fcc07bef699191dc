//! Service configuration file.
//!
//! All settings live in a single `config.toml`, by default at
//! `~/.config/calendar/config.toml`. Every section is optional:
//!
//! ```toml
//! [logger]
//! level = "info"
//! format = "compact"
//!
//! [storage]
//! kind = "sql"
//!
//! [database]
//! host = "localhost"
//! port = 5432
//! database_name = "calendar"
//! user_name = "calendar"
//! password = "calendar"
//!
//! [http_server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [grpc_server]
//! host = "0.0.0.0"
//! port = 50051
//!
//! [scheduler]
//! interval_secs = 1
//! retention_months = 12
//! catch_up_secs = 60
//!
//! [broker.queue]
//! name = "calendar.notifications"
//!
//! [shutdown]
//! drain_timeout_secs = 5
//! ```

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use calendar_broker::{ConsumeConfig, PublishConfig, QueueConfig};
use calendar_core::{TracingConfig, TracingOutputFormat, parse_level};
use calendar_server::{GrpcConfig, HttpConfig, SchedulerConfig, SenderConfig, SupervisorConfig};

use crate::error::{CliError, CliResult};

/// Configuration for the calendar service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub logger: LoggerSettings,
    pub storage: StorageSettings,
    pub database: DatabaseSettings,
    pub http_server: HttpServerSettings,
    pub grpc_server: GrpcServerSettings,
    pub scheduler: SchedulerSettings,
    pub broker: BrokerSettings,
    pub shutdown: ShutdownSettings,
}

/// Logging settings. `RUST_LOG` still wins when set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerSettings {
    /// `error`, `warn`, `info`, `debug` or `trace`.
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl LoggerSettings {
    pub fn tracing_config(&self) -> CliResult<TracingConfig> {
        let level = parse_level(&self.level)?;
        let format: TracingOutputFormat = self.format.parse()?;
        Ok(TracingConfig::service().with_level(level).with_format(format))
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Process-local maps; data is lost on exit.
    #[default]
    Memory,
    /// PostgreSQL.
    Sql,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub kind: StorageKind,
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Full connection URL. Takes precedence over the individual fields.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database_name: String,
    pub user_name: String,
    pub password: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    /// Apply embedded migrations on startup.
    pub migrate: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            database_name: "calendar".to_string(),
            user_name: "calendar".to_string(),
            password: String::new(),
            max_connections: 5,
            connect_timeout_secs: 5,
            migrate: true,
        }
    }
}

impl DatabaseSettings {
    /// The connection URL, either as configured or assembled from parts.
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let credentials = match self.password.is_empty() {
            true => self.user_name.clone(),
            false => format!("{}:{}", self.user_name, self.password),
        };
        format!(
            "postgres://{credentials}@{}:{}/{}",
            self.host, self.port, self.database_name
        )
    }

    #[cfg(feature = "postgres")]
    pub fn pg_config(&self) -> calendar_storage::PgConfig {
        calendar_storage::PgConfig::new(self.connection_url())
            .with_max_connections(self.max_connections)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .with_migrate(self.migrate)
    }
}

/// Listen address of the HTTP adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for HttpServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: calendar_server::DEFAULT_HTTP_PORT,
        }
    }
}

impl HttpServerSettings {
    pub fn socket_addr(&self) -> CliResult<SocketAddr> {
        resolve(&self.host, self.port)
    }
}

/// Listen address of the gRPC adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for GrpcServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: calendar_server::DEFAULT_GRPC_PORT,
        }
    }
}

impl GrpcServerSettings {
    pub fn socket_addr(&self) -> CliResult<SocketAddr> {
        resolve(&self.host, self.port)
    }
}

/// Resolves `host:port`. Host names are looked up once, at startup.
fn resolve(host: &str, port: u16) -> CliResult<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| CliError::config(format!("cannot resolve {host}: {e}")))?
        .next()
        .ok_or_else(|| CliError::config(format!("no address for {host}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub interval_secs: u64,
    pub retention_months: u32,
    /// How far back the first tick after startup looks for notifications.
    pub catch_up_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_secs: 1,
            retention_months: 12,
            catch_up_secs: 60,
        }
    }
}

/// Queue, consumer and publisher settings of the notification broker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub queue: QueueConfig,
    pub consume: ConsumeConfig,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownSettings {
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 5,
        }
    }
}

impl CalendarConfig {
    /// Loads the configuration from the default path, or defaults if no
    /// file exists there.
    pub fn load() -> CliResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads the configuration from a specific path. The file must exist.
    pub fn load_from(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| CliError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calendar")
    }

    pub fn to_toml(&self) -> CliResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks every value that would otherwise fail only once the service
    /// is running.
    pub fn validate(&self) -> CliResult<()> {
        self.logger.tracing_config()?;

        if self.scheduler.interval_secs == 0 {
            return Err(CliError::config("scheduler.interval_secs must be positive"));
        }
        if self.scheduler.retention_months == 0 {
            return Err(CliError::config(
                "scheduler.retention_months must be positive",
            ));
        }
        if self.shutdown.drain_timeout_secs == 0 {
            return Err(CliError::config(
                "shutdown.drain_timeout_secs must be positive",
            ));
        }

        let broker = &self.broker;
        if broker.queue.name.is_empty() {
            return Err(CliError::config("broker.queue.name must not be empty"));
        }
        if broker.consume.queue != broker.queue.name {
            return Err(CliError::config(format!(
                "broker.consume.queue {:?} is not the declared queue {:?}",
                broker.consume.queue, broker.queue.name
            )));
        }
        if broker.publish.exchange.is_empty() && broker.publish.routing_key != broker.queue.name {
            return Err(CliError::config(format!(
                "broker.publish.routing_key {:?} does not reach queue {:?}",
                broker.publish.routing_key, broker.queue.name
            )));
        }

        self.http_server.socket_addr()?;
        self.grpc_server.socket_addr()?;
        Ok(())
    }

    /// Builds the runtime configuration of the supervisor.
    pub fn supervisor_config(&self) -> CliResult<SupervisorConfig> {
        let scheduler = SchedulerConfig::new(Duration::from_secs(self.scheduler.interval_secs))
            .with_retention_months(self.scheduler.retention_months)
            .with_catch_up(Duration::from_secs(self.scheduler.catch_up_secs))
            .with_publish(self.broker.publish.clone());

        Ok(SupervisorConfig::default()
            .with_http(HttpConfig::new(self.http_server.socket_addr()?))
            .with_grpc(GrpcConfig::new(self.grpc_server.socket_addr()?))
            .with_scheduler(scheduler)
            .with_sender(SenderConfig::new(self.broker.consume.clone()))
            .with_queue(self.broker.queue.clone())
            .with_drain_timeout(Duration::from_secs(self.shutdown.drain_timeout_secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config: CalendarConfig = toml::from_str("").unwrap();
        assert_eq!(config, CalendarConfig::default());
        assert_eq!(config.http_server.port, 8080);
        assert_eq!(config.grpc_server.port, 50051);
        assert_eq!(config.storage.kind, StorageKind::Memory);
        config.validate().unwrap();
    }

    #[test]
    fn full_file() {
        let toml_content = r#"
[logger]
level = "debug"
format = "json"

[storage]
kind = "sql"

[database]
host = "db"
port = 6432
database_name = "events"
user_name = "app"
password = "secret"

[http_server]
host = "127.0.0.1"
port = 9090

[grpc_server]
host = "127.0.0.1"

[scheduler]
interval_secs = 10
retention_months = 6
catch_up_secs = 0

[broker.queue]
name = "reminders"

[broker.consume]
queue = "reminders"
auto_ack = true

[broker.publish]
routing_key = "reminders"

[shutdown]
drain_timeout_secs = 2
"#;
        let config: CalendarConfig = toml::from_str(toml_content).unwrap();
        config.validate().unwrap();

        assert_eq!(config.storage.kind, StorageKind::Sql);
        assert_eq!(
            config.database.connection_url(),
            "postgres://app:secret@db:6432/events"
        );
        assert!(config.broker.queue.durable);

        let runtime = config.supervisor_config().unwrap();
        assert_eq!(runtime.http.addr.to_string(), "127.0.0.1:9090");
        assert_eq!(runtime.grpc.addr.to_string(), "127.0.0.1:50051");
        assert_eq!(runtime.scheduler.interval, Duration::from_secs(10));
        assert_eq!(runtime.scheduler.retention_months, 6);
        assert_eq!(runtime.scheduler.catch_up, Duration::ZERO);
        assert_eq!(runtime.scheduler.publish.routing_key, "reminders");
        assert!(runtime.sender.consume.auto_ack);
        assert_eq!(runtime.queue.name, "reminders");
        assert_eq!(runtime.drain_timeout, Duration::from_secs(2));
    }

    #[test]
    fn url_overrides_parts() {
        let settings = DatabaseSettings {
            url: Some("postgres://other/db".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.connection_url(), "postgres://other/db");
        assert_eq!(
            DatabaseSettings::default().connection_url(),
            "postgres://calendar@localhost:5432/calendar"
        );
    }

    #[test]
    fn mismatched_queue_is_rejected() {
        let config: CalendarConfig = toml::from_str(
            r#"
[broker.queue]
name = "a"
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("broker.consume.queue"));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let mut config = CalendarConfig::default();
        config.logger.format = "xml".to_string();
        assert!(matches!(config.validate(), Err(CliError::Tracing(_))));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = CalendarConfig::default();
        config.scheduler.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\nretention_months = 3").unwrap();

        let config = CalendarConfig::load_from(file.path()).unwrap();
        assert_eq!(config.scheduler.retention_months, 3);
        assert_eq!(config.scheduler.interval_secs, 1);
    }

    #[test]
    fn load_from_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = CalendarConfig::load_from(&missing).unwrap_err();
        assert!(matches!(err, CliError::ReadConfig { .. }));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[scheduler\n").unwrap();
        let err = CalendarConfig::load_from(&broken).unwrap_err();
        assert!(matches!(err, CliError::ParseConfig { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn dump_parses_back() {
        let config = CalendarConfig::default();
        let dumped = config.to_toml().unwrap();
        let parsed: CalendarConfig = toml::from_str(&dumped).unwrap();
        assert_eq!(parsed, config);
    }
}
