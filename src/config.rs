use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use zeroize::Zeroizing;

use crate::error::{RelayError, Result};

/// Environment variable holding the bot credential
pub const TOKEN_ENV: &str = "DISCORD_BOT_TOKEN";
/// Environment variable holding the notification channel id
pub const CHANNEL_ENV: &str = "TEXT_CHANNEL_ID";

/// Required service settings, resolved once at startup and never mutated.
#[derive(Clone)]
pub struct ServiceConfig {
    token: Zeroizing<String>,
    pub target_channel_id: u64,
    pub ping_interval: Duration,
}

impl ServiceConfig {
    /// Resolve from the process environment
    pub fn from_env(ping_interval: Duration) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), ping_interval)
    }

    /// Resolve from an arbitrary key lookup.
    ///
    /// Fails when the token is absent or blank, or when the channel id is
    /// absent or not an unsigned integer. No network activity happens here.
    pub fn from_lookup<F>(lookup: F, ping_interval: Duration) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup(TOKEN_ENV)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(RelayError::MissingSetting(TOKEN_ENV))?;

        let raw_channel = lookup(CHANNEL_ENV)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(RelayError::MissingSetting(CHANNEL_ENV))?;

        let target_channel_id =
            raw_channel
                .parse::<u64>()
                .map_err(|e| RelayError::InvalidSetting {
                    key: CHANNEL_ENV,
                    reason: format!("{raw_channel:?} is not an integer id ({e})"),
                })?;

        if ping_interval.is_zero() {
            return Err(RelayError::InvalidSetting {
                key: "keep_awake.interval_secs",
                reason: "ping interval must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            token: Zeroizing::new(token),
            target_channel_id,
            ping_interval,
        })
    }

    pub fn token(&self) -> &str {
        self.token.as_str()
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("token", &"<redacted>")
            .field("target_channel_id", &self.target_channel_id)
            .field("ping_interval", &self.ping_interval)
            .finish()
    }
}

/// Tunable settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub http: HttpSettings,
    pub keep_awake: KeepAwakeSettings,
    pub reconnect: ReconnectSettings,
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    /// Bind address of the liveness server
    pub host: String,
    /// Port of the liveness server (default: 5000)
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeepAwakeSettings {
    pub enabled: bool,
    /// Seconds between self pings (default: 12 minutes)
    pub interval_secs: u64,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Pause after an unexpected error before resuming the loop
    pub recovery_delay_secs: u64,
    /// Grace period for the HTTP server before the first cycle is scheduled
    pub startup_delay_secs: u64,
}

impl KeepAwakeSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn recovery_delay(&self) -> Duration {
        Duration::from_secs(self.recovery_delay_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectSettings {
    /// Consecutive failed attempts before giving up
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    /// Upper bound of the exponential delay
    pub max_delay_secs: u64,
    /// Fixed delay after an unclassified failure
    pub unexpected_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    pub url: String,
    pub api_base: String,
    pub connect_timeout_secs: u64,
    pub handler_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory of the rolling log file
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Enable JSON formatted console logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Settings {
    /// Load settings from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load settings from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Self::with_defaults()?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(
                    std::env::var("VOICE_RELAY_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // VOICE_RELAY__KEEP_AWAKE__INTERVAL_SECS, etc.
            .add_source(
                Environment::with_prefix("VOICE_RELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Built-in defaults only, without files or environment
    pub fn defaults() -> std::result::Result<Self, ConfigError> {
        Self::with_defaults()?.build()?.try_deserialize()
    }

    fn with_defaults(
    ) -> std::result::Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("http.host", "0.0.0.0")?
            .set_default("http.port", 5000)?
            .set_default("keep_awake.enabled", true)?
            .set_default("keep_awake.interval_secs", 12 * 60)?
            .set_default("keep_awake.request_timeout_secs", 10)?
            .set_default("keep_awake.recovery_delay_secs", 60)?
            .set_default("keep_awake.startup_delay_secs", 10)?
            .set_default("reconnect.max_attempts", 5)?
            .set_default("reconnect.base_delay_secs", 1)?
            .set_default("reconnect.max_delay_secs", 300)?
            .set_default("reconnect.unexpected_delay_secs", 10)?
            .set_default("gateway.url", "wss://gateway.discord.gg/?v=10&encoding=json")?
            .set_default("gateway.api_base", "https://discord.com/api/v10")?
            .set_default("gateway.connect_timeout_secs", 30)?
            .set_default("gateway.handler_timeout_secs", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.dir", "logs")?
            .set_default("logging.json", false)
    }

    /// Validate settings values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.keep_awake.interval_secs == 0 {
            errors.push("keep_awake.interval_secs must be greater than zero".to_string());
        }

        if self.keep_awake.request_timeout_secs == 0 {
            errors.push("keep_awake.request_timeout_secs must be greater than zero".to_string());
        }

        if self.reconnect.max_attempts == 0 {
            errors.push("reconnect.max_attempts must be at least 1".to_string());
        }

        if self.reconnect.max_delay_secs < self.reconnect.base_delay_secs {
            errors.push("reconnect.max_delay_secs must not be below base_delay_secs".to_string());
        }

        if self.gateway.handler_timeout_secs == 0 {
            errors.push("gateway.handler_timeout_secs must be greater than zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Address the self pinger should target
    pub fn local_base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.http.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TWELVE_MINUTES: Duration = Duration::from_secs(720);

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_accepts_well_formed_pair() {
        let cfg = ServiceConfig::from_lookup(
            lookup(&[(TOKEN_ENV, "tok"), (CHANNEL_ENV, "1404522797765492858")]),
            TWELVE_MINUTES,
        )
        .unwrap();
        assert_eq!(cfg.token(), "tok");
        assert_eq!(cfg.target_channel_id, 1404522797765492858);
        assert_eq!(cfg.ping_interval, TWELVE_MINUTES);
    }

    #[test]
    fn test_rejects_empty_token() {
        let err = ServiceConfig::from_lookup(
            lookup(&[(TOKEN_ENV, ""), (CHANNEL_ENV, "123")]),
            TWELVE_MINUTES,
        )
        .unwrap_err();
        assert!(err.is_config_error());
        assert!(matches!(err, RelayError::MissingSetting(TOKEN_ENV)));
    }

    #[test]
    fn test_rejects_missing_token() {
        let err = ServiceConfig::from_lookup(lookup(&[(CHANNEL_ENV, "123")]), TWELVE_MINUTES)
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingSetting(TOKEN_ENV)));
    }

    #[test]
    fn test_rejects_non_integer_channel() {
        let err = ServiceConfig::from_lookup(
            lookup(&[(TOKEN_ENV, "tok"), (CHANNEL_ENV, "abc")]),
            TWELVE_MINUTES,
        )
        .unwrap_err();
        assert!(err.is_config_error());
        assert!(matches!(
            err,
            RelayError::InvalidSetting {
                key: CHANNEL_ENV,
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_missing_channel() {
        let err = ServiceConfig::from_lookup(lookup(&[(TOKEN_ENV, "tok")]), TWELVE_MINUTES)
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingSetting(CHANNEL_ENV)));
    }

    #[test]
    fn test_rejects_zero_ping_interval() {
        let err = ServiceConfig::from_lookup(
            lookup(&[(TOKEN_ENV, "tok"), (CHANNEL_ENV, "123")]),
            Duration::ZERO,
        )
        .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_debug_redacts_token() {
        let cfg = ServiceConfig::from_lookup(
            lookup(&[(TOKEN_ENV, "super-secret"), (CHANNEL_ENV, "42")]),
            TWELVE_MINUTES,
        )
        .unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("42"));
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::defaults().unwrap();
        assert_eq!(settings.http.port, 5000);
        assert_eq!(settings.keep_awake.interval(), TWELVE_MINUTES);
        assert_eq!(settings.reconnect.max_attempts, 5);
        assert_eq!(settings.reconnect.max_delay_secs, 300);
        assert_eq!(settings.reconnect.unexpected_delay_secs, 10);
        assert!(settings.validate().is_ok());
        assert_eq!(settings.local_base_url(), "http://127.0.0.1:5000");
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut settings = Settings::defaults().unwrap();
        settings.keep_awake.interval_secs = 0;
        settings.reconnect.max_attempts = 0;
        let errors = settings.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
