//! OS signal handling and shutdown propagation.
//!
//! SIGTERM, SIGINT and SIGHUP (Ctrl+C elsewhere) all trigger the root
//! [`ShutdownHandle`]. The same watch-channel type doubles as the private
//! stop switch of each subsystem.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::ServerResult;

/// Signal handler that turns OS signals into a shutdown trigger.
pub struct SignalHandler {
    handle: ShutdownHandle,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    /// Creates a new signal handler.
    pub fn new() -> Self {
        Self {
            handle: ShutdownHandle::new(),
        }
    }

    /// Installs the signal handlers and spawns the listener task.
    ///
    /// Fails if a handler cannot be registered.
    #[cfg(unix)]
    pub fn spawn_listener(&self) -> ServerResult<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let handle = self.handle.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
                _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
                _ = sighup.recv() => info!("Received SIGHUP, initiating shutdown"),
                _ = handle.wait().wait() => {}
            }
            handle.trigger();
            debug!("Signal listener stopped");
        });
        Ok(())
    }

    /// Non-Unix implementation: Ctrl+C only.
    #[cfg(not(unix))]
    pub fn spawn_listener(&self) -> ServerResult<()> {
        let handle = self.handle.clone();

        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        info!("Received Ctrl+C, initiating shutdown");
                    }
                }
                _ = handle.wait().wait() => {}
            }
            handle.trigger();
        });
        Ok(())
    }

    /// Returns a future that completes when a shutdown signal is received.
    pub fn shutdown(&self) -> ShutdownSignal {
        self.handle.wait()
    }

    /// Returns true if shutdown has been signaled.
    pub fn is_shutdown(&self) -> bool {
        self.handle.is_shutdown()
    }

    /// Programmatically triggers a shutdown.
    pub fn trigger_shutdown(&self) {
        self.handle.trigger();
    }

    /// Creates a shutdown handle that can be passed to other components.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }
}

/// A signal that completes when shutdown is signaled.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Returns true if the shutdown has already been triggered.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits for the shutdown signal.
    pub async fn wait(mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// A handle for triggering or checking shutdown status.
///
/// Triggering is idempotent and never blocks.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    /// Creates an untriggered handle.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Triggers a shutdown.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true if shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Returns a future that completes when shutdown is triggered.
    pub fn wait(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("triggered", &self.is_shutdown())
            .finish()
    }
}
