//! Process supervisor.
//!
//! Runs the HTTP server, the gRPC server, the scheduler and the sender as
//! independent tasks under one root [`ShutdownHandle`]. A subsystem that
//! exits with an error triggers the root handle so no sibling keeps running
//! on its own.
//!
//! Teardown order once the root handle fires:
//! 1. HTTP and gRPC stop accepting and drain, bounded by the drain timeout
//! 2. the scheduler is stopped and awaited
//! 3. the sender is stopped and awaited
//! 4. the broker is stopped
//!
//! A failing step is logged and recorded; later steps still run.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use calendar_broker::{Broker, QueueConfig};

use crate::app::Calendar;
use crate::config::{GrpcConfig, HttpConfig};
use crate::error::ServerResult;
use crate::grpc::GrpcServer;
use crate::http::HttpServer;
use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerHandle};
use crate::sender::{Sender, SenderConfig, SenderHandle};
use crate::signals::ShutdownHandle;

/// Which subsystems to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Components {
    pub http: bool,
    pub grpc: bool,
    pub scheduler: bool,
    pub sender: bool,
}

impl Default for Components {
    fn default() -> Self {
        Self {
            http: true,
            grpc: true,
            scheduler: true,
            sender: true,
        }
    }
}

impl Components {
    /// No subsystem enabled.
    pub fn none() -> Self {
        Self {
            http: false,
            grpc: false,
            scheduler: false,
            sender: false,
        }
    }

    pub fn with_http(mut self, enabled: bool) -> Self {
        self.http = enabled;
        self
    }

    pub fn with_grpc(mut self, enabled: bool) -> Self {
        self.grpc = enabled;
        self
    }

    pub fn with_scheduler(mut self, enabled: bool) -> Self {
        self.scheduler = enabled;
        self
    }

    pub fn with_sender(mut self, enabled: bool) -> Self {
        self.sender = enabled;
        self
    }
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub http: HttpConfig,
    pub grpc: GrpcConfig,
    pub scheduler: SchedulerConfig,
    pub sender: SenderConfig,
    /// Queue declared at startup, before either side of the broker runs.
    pub queue: QueueConfig,
    /// Upper bound for each teardown step.
    pub drain_timeout: Duration,
    pub components: Components,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            grpc: GrpcConfig::default(),
            scheduler: SchedulerConfig::default(),
            sender: SenderConfig::default(),
            queue: QueueConfig::default(),
            drain_timeout: Duration::from_secs(5),
            components: Components::default(),
        }
    }
}

impl SupervisorConfig {
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    pub fn with_grpc(mut self, grpc: GrpcConfig) -> Self {
        self.grpc = grpc;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_sender(mut self, sender: SenderConfig) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_components(mut self, components: Components) -> Self {
        self.components = components;
        self
    }
}

/// A subsystem or teardown step that did not finish cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentFailure {
    pub component: &'static str,
    pub message: String,
}

/// Outcome of a supervised run.
#[derive(Debug, Clone, Default)]
pub struct SupervisorReport {
    /// Subsystems that exited with an error.
    pub failures: Vec<ComponentFailure>,
    /// Teardown steps that timed out or failed.
    pub teardown_errors: Vec<ComponentFailure>,
}

impl SupervisorReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.teardown_errors.is_empty()
    }

    fn failure(&mut self, component: &'static str, message: impl Into<String>) {
        self.failures.push(ComponentFailure {
            component,
            message: message.into(),
        });
    }

    fn teardown_error(&mut self, component: &'static str, message: impl Into<String>) {
        self.teardown_errors.push(ComponentFailure {
            component,
            message: message.into(),
        });
    }
}

type Task = JoinHandle<ServerResult<()>>;

/// Owns the root shutdown handle and the lifetime of every subsystem.
pub struct Supervisor {
    config: SupervisorConfig,
    calendar: Arc<Calendar>,
    broker: Arc<dyn Broker>,
    shutdown: ShutdownHandle,
    scheduler: Scheduler,
    sender: Sender,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        calendar: Arc<Calendar>,
        broker: Arc<dyn Broker>,
        shutdown: ShutdownHandle,
    ) -> Self {
        let scheduler = Scheduler::new(
            config.scheduler.clone(),
            calendar.clone(),
            broker.clone(),
        );
        let sender = Sender::new(config.sender.clone(), broker.clone());
        Self {
            config,
            calendar,
            broker,
            shutdown,
            scheduler,
            sender,
        }
    }

    pub fn scheduler_handle(&self) -> SchedulerHandle {
        self.scheduler.handle()
    }

    pub fn sender_handle(&self) -> SenderHandle {
        self.sender.handle()
    }

    /// Runs until the root handle fires, then tears everything down.
    ///
    /// Setup failures (broker start, queue declaration, listener binds) are
    /// returned before any subsystem is spawned. Everything after that is
    /// reported through [`SupervisorReport`].
    pub async fn run(self) -> ServerResult<SupervisorReport> {
        let Self {
            config,
            calendar,
            broker,
            shutdown,
            scheduler,
            sender,
        } = self;
        let components = config.components;

        broker.start().await?;
        let bound = setup(&config, &calendar, broker.as_ref()).await;
        let (http, grpc) = match bound {
            Ok(servers) => servers,
            Err(e) => {
                error!(error = %e, "Startup failed");
                if let Err(stop_err) = broker.stop().await {
                    warn!(error = %stop_err, "Failed to stop broker after startup failure");
                }
                return Err(e);
            }
        };

        let http_stop = ShutdownHandle::new();
        let grpc_stop = ShutdownHandle::new();
        let scheduler_handle = scheduler.handle();
        let sender_handle = sender.handle();

        let http_task =
            http.map(|server| supervise("http", &shutdown, server.serve(http_stop.wait())));
        let grpc_task =
            grpc.map(|server| supervise("grpc", &shutdown, server.serve(grpc_stop.wait())));
        let scheduler_task = components
            .scheduler
            .then(|| supervise("scheduler", &shutdown, scheduler.run(shutdown.wait())));
        let sender_task = components
            .sender
            .then(|| supervise("sender", &shutdown, sender.run(shutdown.wait())));

        info!(
            http = components.http,
            grpc = components.grpc,
            scheduler = components.scheduler,
            sender = components.sender,
            storage = calendar.backend(),
            broker = broker.name(),
            "Calendar service running"
        );

        shutdown.wait().wait().await;
        info!("Shutting down");

        let drain = config.drain_timeout;
        let mut report = SupervisorReport::default();

        http_stop.trigger();
        grpc_stop.trigger();
        join("http", http_task, drain, &mut report).await;
        join("grpc", grpc_task, drain, &mut report).await;

        scheduler_handle.stop();
        join("scheduler", scheduler_task, drain, &mut report).await;

        sender_handle.stop();
        join("sender", sender_task, drain, &mut report).await;

        match tokio::time::timeout(drain, broker.stop()).await {
            Ok(Ok(())) => debug!("Broker stopped"),
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to stop broker");
                report.teardown_error("broker", e.to_string());
            }
            Err(_) => {
                warn!("Timed out stopping broker");
                report.teardown_error("broker", "timed out");
            }
        }

        if report.is_clean() {
            info!("Shutdown complete");
        } else {
            warn!(
                failures = report.failures.len(),
                teardown_errors = report.teardown_errors.len(),
                "Shutdown complete with errors"
            );
        }
        Ok(report)
    }
}

async fn setup(
    config: &SupervisorConfig,
    calendar: &Arc<Calendar>,
    broker: &dyn Broker,
) -> ServerResult<(Option<HttpServer>, Option<GrpcServer>)> {
    broker.queue_declare(&config.queue).await?;

    let http = match config.components.http {
        true => Some(HttpServer::bind(&config.http, calendar.clone()).await?),
        false => None,
    };
    let grpc = match config.components.grpc {
        true => Some(GrpcServer::bind(&config.grpc, calendar.clone()).await?),
        false => None,
    };
    Ok((http, grpc))
}

/// Spawns a subsystem. An error exit triggers the root handle.
fn supervise<F>(component: &'static str, root: &ShutdownHandle, fut: F) -> Task
where
    F: Future<Output = ServerResult<()>> + Send + 'static,
{
    let root = root.clone();
    tokio::spawn(async move {
        let result = fut.await;
        if let Err(e) = &result {
            error!(component, error = %e, "Subsystem failed, shutting down");
            root.trigger();
        }
        result
    })
}

async fn join(
    component: &'static str,
    task: Option<Task>,
    timeout: Duration,
    report: &mut SupervisorReport,
) {
    let Some(mut task) = task else {
        return;
    };
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(Ok(()))) => debug!(component, "Stopped"),
        Ok(Ok(Err(e))) => report.failure(component, e.to_string()),
        Ok(Err(join_err)) => {
            error!(component, error = %join_err, "Subsystem task panicked");
            report.failure(component, join_err.to_string());
        }
        Err(_) => {
            warn!(component, timeout_ms = timeout.as_millis() as u64, "Drain timed out, aborting");
            task.abort();
            report.teardown_error(component, "drain timed out");
        }
    }
}
