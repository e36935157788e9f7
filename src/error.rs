use thiserror::Error;

/// Main error type for the relay
#[derive(Error, Debug)]
pub enum RelayError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Discord REST errors
    #[error("Discord API error: HTTP {status}: {body}")]
    Discord { status: u16, body: String },

    #[error("Text channel {0} not found")]
    ChannelNotFound(u64),

    #[error("Channel {0} is not a text channel")]
    NotTextChannel(u64),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RelayError {
    /// Startup-time configuration failures; the process must not start.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            RelayError::Config(_) | RelayError::MissingSetting(_) | RelayError::InvalidSetting { .. }
        )
    }
}

/// Result type alias for RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_classified() {
        assert!(RelayError::MissingSetting("DISCORD_BOT_TOKEN").is_config_error());
        assert!(RelayError::InvalidSetting {
            key: "TEXT_CHANNEL_ID",
            reason: "not a number".to_string()
        }
        .is_config_error());
        assert!(!RelayError::ChannelNotFound(1).is_config_error());
        assert!(!RelayError::Internal("boom".to_string()).is_config_error());
    }

    #[test]
    fn test_display_messages() {
        let err = RelayError::Discord {
            status: 403,
            body: "Missing Access".to_string(),
        };
        assert_eq!(err.to_string(), "Discord API error: HTTP 403: Missing Access");
        assert_eq!(
            RelayError::MissingSetting("DISCORD_BOT_TOKEN").to_string(),
            "Missing required setting: DISCORD_BOT_TOKEN"
        );
    }
}
