//! Standalone uptime monitor
//!
//! Pings a deployed relay from outside with the same cadence and failure
//! policy as the in-process keep-awake loop.

use std::time::Duration;
use tracing::{info, warn};

use crate::coordination::ShutdownToken;
use crate::error::Result;
use crate::services::LivenessClient;
use crate::supervisor::SelfPinger;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RECOVERY_DELAY: Duration = Duration::from_secs(60);

pub struct UptimeMonitor {
    client: LivenessClient,
    pinger: SelfPinger,
}

impl UptimeMonitor {
    pub fn new(target_url: &str, interval: Duration) -> Result<Self> {
        let client = LivenessClient::new(target_url, REQUEST_TIMEOUT)?;
        let pinger = SelfPinger::new(client.clone(), interval, RECOVERY_DELAY);
        Ok(Self { client, pinger })
    }

    pub fn pinger(&self) -> &SelfPinger {
        &self.pinger
    }

    /// Initial health check, then ping until shutdown
    pub async fn run(&self, shutdown: ShutdownToken) -> Result<()> {
        info!("🚀 Uptime monitor started");
        info!("📍 Target: {}", self.client.base_url());
        info!("⏰ Interval: {} minutes", self.pinger.interval().as_secs() / 60);

        if self.client.health_check().await {
            info!("✅ Initial health check passed");
        } else {
            warn!("⚠️ Initial health check failed, continuing anyway");
        }

        self.pinger.start();
        let signal = shutdown.cancelled().await;
        info!("🛑 Uptime monitor stopping ({})", signal);
        self.pinger.stop().await;
        Ok(())
    }
}
