//! HTTP client for the liveness endpoint
//!
//! Shared by the in-process self-pinger and the standalone uptime monitor.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::domain::PingResult;
use crate::error::{RelayError, Result};

#[derive(Debug, Deserialize)]
struct PingBody {
    status: String,
    #[allow(dead_code)]
    timestamp: i64,
}

/// Liveness client bound to one base URL
#[derive(Clone)]
pub struct LivenessClient {
    client: Client,
    base_url: Url,
}

impl LivenessClient {
    /// Create a client; every request is bounded by `request_timeout`
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(RelayError::InvalidSetting {
                key: "target_url",
                reason: format!("{} cannot be used as a base URL", base_url),
            });
        }

        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// `GET /ping`.
    ///
    /// Transport failures, timeouts, non-200 responses and unexpected bodies
    /// come back as a failed `PingResult`. `Err` is reserved for requests
    /// that could not even be built.
    pub async fn ping(&self) -> Result<PingResult> {
        let url = self.endpoint("/ping")?;

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) if e.is_builder() => return Err(e.into()),
            Err(e) if e.is_timeout() => return Ok(PingResult::failed(None, "request timed out")),
            Err(e) => return Ok(PingResult::failed(None, format!("request failed: {}", e))),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Ok(PingResult::failed(
                    Some(status.as_u16()),
                    format!("failed to read body: {}", e),
                ))
            }
        };

        if status != StatusCode::OK {
            return Ok(PingResult::failed(
                Some(status.as_u16()),
                format!("unexpected status {}", status),
            ));
        }

        match serde_json::from_str::<PingBody>(&body) {
            Ok(parsed) if parsed.status == "alive" => {
                debug!("Ping response: {}", body);
                Ok(PingResult::succeeded(status.as_u16(), body))
            }
            Ok(parsed) => Ok(PingResult::failed(
                Some(status.as_u16()),
                format!("unexpected status field {:?}", parsed.status),
            )),
            Err(e) => Ok(PingResult::failed(
                Some(status.as_u16()),
                format!("malformed ping body: {}", e),
            )),
        }
    }

    /// `GET /health`; true only on a 200
    pub async fn health_check(&self) -> bool {
        let Ok(url) = self.endpoint("/health") else {
            return false;
        };
        match self.client.get(url).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!("Health check request failed: {}", e);
                false
            }
        }
    }
}
