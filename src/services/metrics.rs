use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel for "no heartbeat acknowledged yet"
const LATENCY_UNKNOWN: u64 = u64::MAX;

/// Metrics collector for observability
pub struct Metrics {
    /// Connection attempts started
    pub connection_attempts: AtomicU64,
    /// Gateway reconnections after an established session ended
    pub gateway_reconnections: AtomicU64,
    /// Gateway events dispatched to the relay
    pub events_received: AtomicU64,
    /// Events whose handler failed or timed out
    pub handler_errors: AtomicU64,
    /// Notifications posted to the text channel
    pub notifications_sent: AtomicU64,
    /// Commands answered
    pub commands_handled: AtomicU64,
    /// Successful liveness pings
    pub pings_succeeded: AtomicU64,
    /// Failed liveness pings
    pub pings_failed: AtomicU64,
    /// Last heartbeat round trip
    latency_ms: AtomicU64,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            connection_attempts: AtomicU64::new(0),
            gateway_reconnections: AtomicU64::new(0),
            events_received: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            commands_handled: AtomicU64::new(0),
            pings_succeeded: AtomicU64::new(0),
            pings_failed: AtomicU64::new(0),
            latency_ms: AtomicU64::new(LATENCY_UNKNOWN),
        }
    }

    pub fn inc_connection_attempts(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reconnections(&self) {
        self.gateway_reconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_events(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_handler_errors(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_commands(&self) {
        self.commands_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ping(&self, success: bool) {
        if success {
            self.pings_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.pings_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a heartbeat round trip
    pub fn set_latency_ms(&self, ms: u64) {
        self.latency_ms.store(ms.min(LATENCY_UNKNOWN - 1), Ordering::Relaxed);
    }

    /// Last heartbeat round trip, if one was acknowledged
    pub fn latency_ms(&self) -> Option<u64> {
        match self.latency_ms.load(Ordering::Relaxed) {
            LATENCY_UNKNOWN => None,
            ms => Some(ms),
        }
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self, uptime_seconds: u64, connected: bool) -> String {
        format!(
            r#"# HELP voice_relay_up Gateway connection status (1=connected)
# TYPE voice_relay_up gauge
voice_relay_up {}

# HELP voice_relay_uptime_seconds Uptime in seconds
# TYPE voice_relay_uptime_seconds counter
voice_relay_uptime_seconds {}

# HELP voice_relay_gateway_latency_ms Last heartbeat round trip (-1 when unknown)
# TYPE voice_relay_gateway_latency_ms gauge
voice_relay_gateway_latency_ms {}

# HELP voice_relay_connection_attempts_total Gateway connection attempts
# TYPE voice_relay_connection_attempts_total counter
voice_relay_connection_attempts_total {}

# HELP voice_relay_gateway_reconnections_total Gateway reconnections
# TYPE voice_relay_gateway_reconnections_total counter
voice_relay_gateway_reconnections_total {}

# HELP voice_relay_events_total Gateway events dispatched
# TYPE voice_relay_events_total counter
voice_relay_events_total {}

# HELP voice_relay_handler_errors_total Failed event handlers
# TYPE voice_relay_handler_errors_total counter
voice_relay_handler_errors_total {}

# HELP voice_relay_notifications_total Notifications posted
# TYPE voice_relay_notifications_total counter
voice_relay_notifications_total {}

# HELP voice_relay_commands_total Commands answered
# TYPE voice_relay_commands_total counter
voice_relay_commands_total {}

# HELP voice_relay_pings_total Keep-awake pings by outcome
# TYPE voice_relay_pings_total counter
voice_relay_pings_total{{outcome="success"}} {}
voice_relay_pings_total{{outcome="failure"}} {}
"#,
            if connected { 1 } else { 0 },
            uptime_seconds,
            self.latency_ms().map(|ms| ms as i64).unwrap_or(-1),
            self.connection_attempts.load(Ordering::Relaxed),
            self.gateway_reconnections.load(Ordering::Relaxed),
            self.events_received.load(Ordering::Relaxed),
            self.handler_errors.load(Ordering::Relaxed),
            self.notifications_sent.load(Ordering::Relaxed),
            self.commands_handled.load(Ordering::Relaxed),
            self.pings_succeeded.load(Ordering::Relaxed),
            self.pings_failed.load(Ordering::Relaxed),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_unknown_until_recorded() {
        let metrics = Metrics::new();
        assert_eq!(metrics.latency_ms(), None);
        metrics.set_latency_ms(42);
        assert_eq!(metrics.latency_ms(), Some(42));
    }

    #[test]
    fn test_prometheus_output() {
        let metrics = Metrics::new();
        metrics.record_ping(true);
        metrics.record_ping(false);
        metrics.record_ping(false);
        metrics.inc_notifications();

        let text = metrics.prometheus(12, true);
        assert!(text.contains("voice_relay_up 1"));
        assert!(text.contains("voice_relay_uptime_seconds 12"));
        assert!(text.contains("voice_relay_gateway_latency_ms -1"));
        assert!(text.contains(r#"voice_relay_pings_total{outcome="success"} 1"#));
        assert!(text.contains(r#"voice_relay_pings_total{outcome="failure"} 2"#));
        assert!(text.contains("voice_relay_notifications_total 1"));
    }
}
