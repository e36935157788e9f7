//! Keep-awake self-pinger
//!
//! Periodically calls the liveness endpoint so that hosting platforms which
//! idle out silent processes see regular inbound traffic. Failures are
//! logged and the loop keeps its fixed interval.

use chrono::Local;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::PingResult;
use crate::services::{LivenessClient, Metrics};

/// How long `stop` waits for the loop to exit
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Background pinger of the liveness endpoint
pub struct SelfPinger {
    client: LivenessClient,
    interval: Duration,
    recovery_delay: Duration,
    running: AtomicBool,
    active_loops: Arc<AtomicUsize>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    results: broadcast::Sender<PingResult>,
    metrics: Option<Arc<Metrics>>,
}

impl SelfPinger {
    pub fn new(client: LivenessClient, interval: Duration, recovery_delay: Duration) -> Self {
        let (results, _) = broadcast::channel(32);
        Self {
            client,
            interval,
            recovery_delay,
            running: AtomicBool::new(false),
            active_loops: Arc::new(AtomicUsize::new(0)),
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
            results,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Subscribe to ping results
    pub fn subscribe(&self) -> broadcast::Receiver<PingResult> {
        self.results.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of ping loops currently alive
    pub fn active_loops(&self) -> usize {
        self.active_loops.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the ping loop.
    ///
    /// Returns `false` without side effects when a loop is already running.
    pub fn start(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Keep-awake already running, ignoring start");
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        self.active_loops.fetch_add(1, Ordering::SeqCst);

        let ctx = LoopContext {
            client: self.client.clone(),
            interval: self.interval,
            recovery_delay: self.recovery_delay,
            results: self.results.clone(),
            metrics: self.metrics.clone(),
            _guard: LoopGuard(Arc::clone(&self.active_loops)),
        };
        let handle = tokio::spawn(ping_loop(ctx, stop_rx));

        if let Ok(mut slot) = self.stop_tx.lock() {
            *slot = Some(stop_tx);
        }
        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }

        info!(
            "🔄 Keep-awake started, pinging {} every {:?}",
            self.client.base_url(),
            self.interval
        );
        true
    }

    /// Signal the loop and wait for it to exit.
    ///
    /// The loop leaves at its next wake point; an in-flight request is
    /// allowed to finish within the stop timeout.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let stop_tx = self.stop_tx.lock().ok().and_then(|mut slot| slot.take());
        if let Some(tx) = stop_tx {
            let _ = tx.send(true);
        }

        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(mut handle) = handle {
            match tokio::time::timeout(STOP_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => debug!("Keep-awake loop joined"),
                Ok(Err(e)) => error!("Keep-awake loop panicked: {}", e),
                Err(_) => {
                    warn!("Keep-awake loop did not stop within {:?}, aborting", STOP_TIMEOUT);
                    handle.abort();
                }
            }
        }

        info!("🛑 Keep-awake stopped");
    }
}

/// Decrements the live-loop counter when the loop is dropped
struct LoopGuard(Arc<AtomicUsize>);

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct LoopContext {
    client: LivenessClient,
    interval: Duration,
    recovery_delay: Duration,
    results: broadcast::Sender<PingResult>,
    metrics: Option<Arc<Metrics>>,
    _guard: LoopGuard,
}

async fn ping_loop(ctx: LoopContext, mut stop_rx: watch::Receiver<bool>) {
    loop {
        if sleep_or_stop(&mut stop_rx, ctx.interval).await {
            break;
        }

        match ctx.client.ping().await {
            Ok(result) => {
                if result.success {
                    let next = Local::now()
                        + chrono::Duration::from_std(ctx.interval)
                            .unwrap_or_else(|_| chrono::Duration::zero());
                    info!(
                        "✅ Ping successful - next ping at {}",
                        next.format("%H:%M:%S")
                    );
                } else {
                    warn!(
                        "⚠️ Ping failed: {}",
                        result.detail.as_deref().unwrap_or("unknown error")
                    );
                }
                if let Some(metrics) = &ctx.metrics {
                    metrics.record_ping(result.success);
                }
                let _ = ctx.results.send(result);
            }
            Err(e) => {
                error!("❌ Keep-awake error: {}", e);
                if let Some(metrics) = &ctx.metrics {
                    metrics.record_ping(false);
                }
                let _ = ctx.results.send(PingResult::failed(None, e.to_string()));
                if sleep_or_stop(&mut stop_rx, ctx.recovery_delay).await {
                    break;
                }
            }
        }
    }
    debug!("Keep-awake loop exiting");
}

/// Sleep for `duration`; true if stop was signalled first
async fn sleep_or_stop(stop_rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *stop_rx.borrow() {
        return true;
    }
    let changed = tokio::select! {
        _ = tokio::time::sleep(duration) => return false,
        changed = stop_rx.changed() => changed,
    };
    changed.is_err() || *stop_rx.borrow()
}
