//! Discord REST client
//!
//! Posts relay notifications and command replies to text channels.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, warn};
use zeroize::Zeroizing;

use crate::error::{RelayError, Result};
use crate::relay::{MessageSink, OutgoingMessage};

/// Longest rate-limit wait honoured before giving up on a message
const MAX_RETRY_AFTER: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct RateLimited {
    retry_after: f64,
}

/// Discord REST client
/// Discord asks bots to identify as `DiscordBot (<name or url>, <version>)`
const USER_AGENT: &str = concat!(
    "DiscordBot (",
    env!("CARGO_PKG_NAME"),
    ", ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

pub struct DiscordRest {
    client: Client,
    api_base: String,
    token: Zeroizing<String>,
}

impl DiscordRest {
    pub fn new(api_base: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: Zeroizing::new(token.to_string()),
        })
    }

    fn messages_url(&self, channel_id: u64) -> String {
        format!("{}/channels/{}/messages", self.api_base, channel_id)
    }

    async fn post(&self, channel_id: u64, message: &OutgoingMessage) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.messages_url(channel_id))
            .header("Authorization", format!("Bot {}", self.token.as_str()))
            .json(message)
            .send()
            .await?)
    }
}

#[async_trait]
impl MessageSink for DiscordRest {
    async fn send_message(&self, channel_id: u64, message: &OutgoingMessage) -> Result<()> {
        let mut response = self.post(channel_id, message).await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            let wait = serde_json::from_str::<RateLimited>(&body)
                .ok()
                .and_then(|r| Duration::try_from_secs_f64(r.retry_after).ok())
                .unwrap_or(Duration::from_secs(1));
            if wait > MAX_RETRY_AFTER {
                return Err(RelayError::Discord { status: 429, body });
            }
            warn!("Rate limited on channel {}, retrying in {:?}", channel_id, wait);
            tokio::time::sleep(wait).await;
            response = self.post(channel_id, message).await?;
        }

        let status = response.status();
        if status.is_success() {
            debug!("Message delivered to channel {}", channel_id);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            error!("Canale di testo con ID {} non trovato", channel_id);
            return Err(RelayError::ChannelNotFound(channel_id));
        }
        Err(RelayError::Discord {
            status: status.as_u16(),
            body,
        })
    }
}
