//! OAuth2 invite link for the bot

use url::Url;

use crate::error::{RelayError, Result};

pub const VIEW_CHANNEL: u64 = 1 << 10;
pub const SEND_MESSAGES: u64 = 1 << 11;
pub const READ_MESSAGE_HISTORY: u64 = 1 << 16;
pub const CONNECT: u64 = 1 << 20;
pub const USE_VOICE_ACTIVITY: u64 = 1 << 21;

/// Permissions the relay needs in a guild
pub const REQUIRED_PERMISSIONS: u64 =
    VIEW_CHANNEL | SEND_MESSAGES | READ_MESSAGE_HISTORY | CONNECT | USE_VOICE_ACTIVITY;

const AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";

/// Build the invite URL for an application id
pub fn invite_url(client_id: &str) -> Result<String> {
    let client_id = client_id.trim();
    if client_id.is_empty() || !client_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(RelayError::InvalidSetting {
            key: "client_id",
            reason: format!("{:?} is not a Discord application id", client_id),
        });
    }

    let url = Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("client_id", client_id),
            ("permissions", &REQUIRED_PERMISSIONS.to_string()),
            ("scope", "bot"),
        ],
    )?;
    Ok(url.into())
}

/// Human readable list of the requested permissions
pub fn permission_names() -> &'static [&'static str] {
    &[
        "Visualizza canali",
        "Invia messaggi",
        "Leggi cronologia messaggi",
        "Connetti (voice)",
        "Usa attività vocale",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permissions_value() {
        assert_eq!(REQUIRED_PERMISSIONS, 3214336);
    }

    #[test]
    fn test_invite_url() {
        assert_eq!(
            invite_url(" 123456789012345678 ").unwrap(),
            "https://discord.com/oauth2/authorize?client_id=123456789012345678&permissions=3214336&scope=bot"
        );
    }

    #[test]
    fn test_invalid_client_id() {
        assert!(invite_url("").is_err());
        assert!(invite_url("abc").is_err());
    }
}
