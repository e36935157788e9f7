//! Process-level stop signal
//!
//! A single `Shutdown` is created in `main` and handed out as cheap
//! `ShutdownToken`s. Every long wait in the process (backoff sleeps, the
//! gateway event wait, the HTTP server) races against `cancelled()`.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Why the process is stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM, SIGINT, Ctrl+C
    Interrupt,
    /// The connection supervisor reached a terminal state
    SupervisorExited,
    /// Requested by code (tests, embedding)
    Requested,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "interrupt"),
            ShutdownSignal::SupervisorExited => write!(f, "supervisor_exited"),
            ShutdownSignal::Requested => write!(f, "requested"),
        }
    }
}

/// Shutdown coordinator
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<Option<ShutdownSignal>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Request shutdown; only the first request is recorded
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        let first = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(signal);
            true
        });

        if first {
            info!("Shutdown requested: {}", signal);
        } else {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The signal that started the shutdown, if any
    pub fn signal(&self) -> Option<ShutdownSignal> {
        *self.tx.borrow()
    }

    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Token for observing shutdown from async tasks
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownToken {
    pub fn is_shutdown_requested(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Resolves once shutdown has been requested.
    ///
    /// Also resolves if the coordinator was dropped, so no task can outlive it
    /// waiting forever.
    pub async fn cancelled(&self) -> ShutdownSignal {
        let mut rx = self.rx.clone();
        // Copy out of the watch::Ref before `rx` goes out of scope
        let signal = rx
            .wait_for(|signal| signal.is_some())
            .await
            .map(|signal| *signal);
        signal.ok().flatten().unwrap_or(ShutdownSignal::Requested)
    }
}

/// Install OS signal handlers that trigger a graceful shutdown
pub fn install_signal_handlers(shutdown: Arc<Shutdown>) {
    let shutdown_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C");
                shutdown_ctrl_c.request_shutdown(ShutdownSignal::Interrupt);
            }
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("Received SIGTERM");
                    shutdown.request_shutdown(ShutdownSignal::Interrupt);
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        });
    }
}
