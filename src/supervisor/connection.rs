//! Connection supervisor
//!
//! Owns the lifecycle of the single gateway connection: connects, pumps
//! events into the registered handler, and on failure either backs off and
//! retries or gives up permanently.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;
use crate::coordination::ShutdownToken;
use crate::domain::{AttemptOutcome, ConnectionAttempt, GatewayEvent, SupervisorState};
use crate::gateway::{
    Connected, EventHandler, EventStream, FailureKind, Gateway, GatewayFailure,
};
use crate::services::Metrics;
use crate::supervisor::backoff::{BackoffPolicy, BackoffState, RetryDecision};

/// Why the supervisor gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalReason {
    /// Credential rejected; never retried
    AuthRejected(String),
    /// Consecutive recoverable failures used up the attempt budget
    RetriesExhausted { attempts: u32 },
}

impl std::fmt::Display for FatalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FatalReason::AuthRejected(reason) => write!(f, "authentication rejected: {}", reason),
            FatalReason::RetriesExhausted { attempts } => {
                write!(f, "gave up after {} consecutive failed attempts", attempts)
            }
        }
    }
}

/// Terminal result of `ConnectionSupervisor::run`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Shutdown was requested
    Stopped,
    Fatal(FatalReason),
}

/// Event emitted by the supervisor on every state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    AttemptStarted { attempt: u32 },
    Connected { attempt: u32, session_id: String },
    AttemptFailed {
        attempt: u32,
        kind: FailureKind,
        reason: String,
    },
    BackoffScheduled { attempt: u32, delay: Duration },
    RetriesExhausted { attempts: u32 },
    AuthRejected { reason: String },
    Stopped,
}

enum SessionEnd {
    Shutdown,
    Failed(GatewayFailure),
}

/// Connection supervisor for the gateway
pub struct ConnectionSupervisor {
    config: ServiceConfig,
    gateway: Arc<dyn Gateway>,
    handler: Arc<dyn EventHandler>,
    policy: BackoffPolicy,
    handler_timeout: Duration,
    metrics: Arc<Metrics>,
    state_tx: watch::Sender<SupervisorState>,
    event_tx: broadcast::Sender<SupervisorEvent>,
}

impl ConnectionSupervisor {
    pub fn new(
        config: ServiceConfig,
        gateway: Arc<dyn Gateway>,
        handler: Arc<dyn EventHandler>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Idle);
        let (event_tx, _) = broadcast::channel(64);
        Self {
            config,
            gateway,
            handler,
            policy: BackoffPolicy::default(),
            handler_timeout: Duration::from_secs(30),
            metrics,
            state_tx,
            event_tx,
        }
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Upper bound for a single handler invocation
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Subscribe to supervisor events
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.event_tx.subscribe()
    }

    /// Receiver of state changes, for the health endpoint
    pub fn state_receiver(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SupervisorState) {
        let from = self.state_tx.send_replace(state);
        if from != state {
            debug!("Supervisor state: {} -> {}", from, state);
        }
    }

    fn emit(&self, event: SupervisorEvent) {
        let _ = self.event_tx.send(event);
    }

    fn stopped(&self) -> SupervisorExit {
        info!("🛑 Connection supervisor stopped");
        self.set_state(SupervisorState::Stopped);
        self.emit(SupervisorEvent::Stopped);
        SupervisorExit::Stopped
    }

    fn fatal(&self, reason: FatalReason) -> SupervisorExit {
        self.set_state(SupervisorState::Fatal);
        SupervisorExit::Fatal(reason)
    }

    /// Run until shutdown or a terminal failure.
    ///
    /// Attempts are strictly sequential; the attempt counter is shared by
    /// network and unexpected failures and reset by every successful
    /// connection.
    pub async fn run(&self, shutdown: ShutdownToken) -> SupervisorExit {
        let mut backoff = BackoffState::new(self.policy.clone());
        let mut sessions_established: u64 = 0;

        loop {
            if shutdown.is_shutdown_requested() {
                return self.stopped();
            }

            let attempt = ConnectionAttempt::begin(backoff.attempt_count() + 1);
            self.set_state(SupervisorState::Connecting);
            self.metrics.inc_connection_attempts();
            info!("Connection attempt #{}", attempt.attempt_number);
            self.emit(SupervisorEvent::AttemptStarted {
                attempt: attempt.attempt_number,
            });

            let connected = tokio::select! {
                result = self.gateway.connect(self.config.token()) => result,
                _ = shutdown.cancelled() => return self.stopped(),
            };

            let (attempt, failure) = match connected {
                Ok(Connected { ready, mut stream }) => {
                    let attempt = attempt.finish(AttemptOutcome::Success);
                    backoff.reset();
                    if sessions_established > 0 {
                        self.metrics.inc_reconnections();
                    }
                    sessions_established += 1;

                    self.set_state(SupervisorState::Connected);
                    info!(
                        "✅ Connected as {} after attempt #{} (session {})",
                        ready.user.username, attempt.attempt_number, ready.session_id
                    );
                    self.emit(SupervisorEvent::Connected {
                        attempt: attempt.attempt_number,
                        session_id: ready.session_id.clone(),
                    });

                    let on_connect =
                        tokio::time::timeout(self.handler_timeout, self.handler.on_connect(&ready));
                    tokio::select! {
                        result = on_connect => {
                            if result.is_err() {
                                warn!("on_connect handler timed out after {:?}", self.handler_timeout);
                            }
                        }
                        _ = shutdown.cancelled() => {
                            stream.close().await;
                            return self.stopped();
                        }
                    }

                    match self.pump(stream.as_mut(), &shutdown).await {
                        SessionEnd::Shutdown => {
                            stream.close().await;
                            return self.stopped();
                        }
                        SessionEnd::Failed(failure) => {
                            warn!("⚠️ Disconnected from gateway: {}", failure);
                            let reason = failure.to_string();
                            let on_disconnect = tokio::time::timeout(
                                self.handler_timeout,
                                self.handler.on_disconnect(&reason),
                            );
                            tokio::select! {
                                result = on_disconnect => {
                                    if result.is_err() {
                                        warn!("on_disconnect handler timed out");
                                    }
                                }
                                _ = shutdown.cancelled() => return self.stopped(),
                            }
                            (attempt, failure)
                        }
                    }
                }
                Err(failure) => {
                    let outcome = match failure.kind() {
                        FailureKind::Fatal => AttemptOutcome::FatalFailure,
                        _ => AttemptOutcome::RecoverableFailure,
                    };
                    (attempt.finish(outcome), failure)
                }
            };

            let kind = failure.kind();
            warn!(
                "Attempt #{} ended after {}s: {}",
                attempt.attempt_number,
                (chrono::Utc::now() - attempt.started_at).num_seconds(),
                failure
            );
            self.emit(SupervisorEvent::AttemptFailed {
                attempt: attempt.attempt_number,
                kind,
                reason: failure.to_string(),
            });

            match backoff.record_failure(kind) {
                RetryDecision::Abort => {
                    error!("❌ Bot token rejected, not retrying: {}", failure);
                    self.emit(SupervisorEvent::AuthRejected {
                        reason: failure.to_string(),
                    });
                    return self.fatal(FatalReason::AuthRejected(failure.to_string()));
                }
                RetryDecision::GiveUp { attempts } => {
                    error!(
                        "❌ Max retries reached ({} consecutive failures), giving up",
                        attempts
                    );
                    self.emit(SupervisorEvent::RetriesExhausted { attempts });
                    return self.fatal(FatalReason::RetriesExhausted { attempts });
                }
                RetryDecision::RetryAfter(delay) => {
                    self.set_state(SupervisorState::Backoff);
                    warn!(
                        "⚠️ Connection lost. Retrying in {:?} (attempt {}/{})",
                        delay,
                        backoff.attempt_count(),
                        backoff.policy().max_attempts
                    );
                    self.emit(SupervisorEvent::BackoffScheduled {
                        attempt: backoff.attempt_count(),
                        delay,
                    });

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.cancelled() => return self.stopped(),
                    }
                }
            }
        }
    }

    /// Feed events to the handler until the stream ends or shutdown
    async fn pump(&self, stream: &mut dyn EventStream, shutdown: &ShutdownToken) -> SessionEnd {
        loop {
            let next = tokio::select! {
                next = stream.next_event() => next,
                _ = shutdown.cancelled() => return SessionEnd::Shutdown,
            };

            match next {
                Ok(Some(event)) => {
                    // A hung handler must not hold up shutdown
                    tokio::select! {
                        _ = self.dispatch(event) => {}
                        _ = shutdown.cancelled() => return SessionEnd::Shutdown,
                    }
                }
                Ok(None) => {
                    return SessionEnd::Failed(GatewayFailure::closed("remote closed the stream"))
                }
                Err(failure) => return SessionEnd::Failed(failure),
            }
        }
    }

    /// Deliver one event; a failing or slow handler is logged, never fatal
    async fn dispatch(&self, event: GatewayEvent) {
        self.metrics.inc_events();
        let kind = event.kind();

        let outcome = match &event {
            GatewayEvent::Ready(ready) => {
                tokio::time::timeout(self.handler_timeout, self.handler.on_connect(ready))
                    .await
                    .map(Ok)
            }
            _ => {
                tokio::time::timeout(self.handler_timeout, self.handler.on_state_change(&event))
                    .await
            }
        };

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.metrics.inc_handler_errors();
                error!("Error handling {} event: {}", kind, e);
            }
            Err(_) => {
                self.metrics.inc_handler_errors();
                error!(
                    "Handler for {} event timed out after {:?}",
                    kind, self.handler_timeout
                );
            }
        }
    }
}
