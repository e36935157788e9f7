pub mod health;
pub mod liveness_client;
pub mod metrics;
pub mod uptime_monitor;

pub use health::{HealthResponse, HealthServer, HealthState, PingResponse, StatusResponse};
pub use liveness_client::LivenessClient;
pub use metrics::Metrics;
pub use uptime_monitor::UptimeMonitor;
