use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{GatewayEvent, ReadyInfo};
use crate::error::Result;

/// Why a connection attempt or an established connection failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayFailure {
    /// Credential or application rejected by the remote service
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Remote close, network drop, zombied connection
    #[error("connection closed ({}): {reason}", describe_code(.code))]
    Closed { code: Option<u16>, reason: String },

    /// Anything else
    #[error("unexpected gateway error: {0}")]
    Unexpected(String),
}

fn describe_code(code: &Option<u16>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "no code".to_string())
}

/// Retry classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Never retried
    Fatal,
    /// Retried with exponential backoff
    RecoverableNetwork,
    /// Retried with a fixed delay
    RecoverableUnexpected,
}

impl GatewayFailure {
    pub fn closed(reason: impl Into<String>) -> Self {
        GatewayFailure::Closed {
            code: None,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            GatewayFailure::Auth(_) => FailureKind::Fatal,
            GatewayFailure::Closed { .. } => FailureKind::RecoverableNetwork,
            GatewayFailure::Unexpected(_) => FailureKind::RecoverableUnexpected,
        }
    }

    /// Classify a Discord gateway close code.
    ///
    /// 4004 is an invalid token; 4010..=4014 are shard, version and intent
    /// rejections that a reconnect cannot fix.
    pub fn from_close_code(code: u16, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match code {
            4004 | 4010..=4014 => GatewayFailure::Auth(format!("close code {code}: {reason}")),
            _ => GatewayFailure::Closed {
                code: Some(code),
                reason,
            },
        }
    }
}

/// An established connection
pub struct Connected {
    pub ready: ReadyInfo,
    pub stream: Box<dyn EventStream>,
}

impl std::fmt::Debug for Connected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connected")
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}

/// Real-time service the supervisor connects to
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Open a connection and complete the handshake
    async fn connect(&self, token: &str) -> std::result::Result<Connected, GatewayFailure>;
}

/// Inbound event stream of an established connection
#[async_trait]
pub trait EventStream: Send {
    /// Next event; `Ok(None)` once the remote side closed the stream
    async fn next_event(&mut self) -> std::result::Result<Option<GatewayEvent>, GatewayFailure>;

    /// Close the connection from our side
    async fn close(&mut self);
}

/// Capability interface registered with the supervisor
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_connect(&self, ready: &ReadyInfo);

    async fn on_state_change(&self, event: &GatewayEvent) -> Result<()>;

    async fn on_disconnect(&self, reason: &str);
}
