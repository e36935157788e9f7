//! Gateway events consumed by the relay
//!
//! Only the dispatches the relay reacts to are modelled; the gateway client
//! drops everything else.

use serde::Deserialize;

/// Discord user
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

/// Guild member attached to voice states and messages
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub nick: Option<String>,
}

impl Member {
    /// Guild nickname, then global name, then username
    pub fn display_name(&self) -> Option<&str> {
        if let Some(nick) = self.nick.as_deref() {
            return Some(nick);
        }
        let user = self.user.as_ref()?;
        Some(user.global_name.as_deref().unwrap_or(&user.username))
    }

    pub fn is_bot(&self) -> bool {
        self.user.as_ref().map(|u| u.bot).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnavailableGuild {
    pub id: String,
}

/// Payload of the READY dispatch
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReadyInfo {
    pub user: User,
    pub session_id: String,
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
}

/// Channel as announced in GUILD_CREATE and channel events
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub guild_id: Option<String>,
}

impl ChannelInfo {
    /// Whether plain messages can be posted to this channel.
    ///
    /// Text (0), announcement (5) and thread channels (10, 11, 12) accept
    /// messages. Voice, stage, category, forum and media channels do not.
    pub fn is_messageable(&self) -> bool {
        matches!(self.kind, 0 | 5 | 10 | 11 | 12)
    }
}

/// A member's voice connection state
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoiceState {
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub member: Option<Member>,
}

/// Guild snapshot delivered once per guild after READY
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GuildSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub member_count: Option<u64>,
    #[serde(default)]
    pub channels: Vec<ChannelInfo>,
    #[serde(default)]
    pub voice_states: Vec<VoiceState>,
}

/// Chat message (used for `!` commands)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub content: String,
    pub author: User,
}

/// Events delivered by an established gateway connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Ready(ReadyInfo),
    Resumed,
    GuildAvailable(GuildSnapshot),
    ChannelUpsert(ChannelInfo),
    ChannelRemoved(ChannelInfo),
    VoiceStateUpdate(VoiceState),
    MessageCreate(ChatMessage),
}

impl GatewayEvent {
    /// Decode a dispatch (`op` 0) by its event name.
    ///
    /// Returns `Ok(None)` for dispatches the relay does not consume.
    pub fn from_dispatch(
        name: &str,
        data: serde_json::Value,
    ) -> Result<Option<Self>, serde_json::Error> {
        let event = match name {
            "READY" => GatewayEvent::Ready(serde_json::from_value(data)?),
            "RESUMED" => GatewayEvent::Resumed,
            "GUILD_CREATE" => GatewayEvent::GuildAvailable(serde_json::from_value(data)?),
            "CHANNEL_CREATE" | "CHANNEL_UPDATE" => {
                GatewayEvent::ChannelUpsert(serde_json::from_value(data)?)
            }
            "CHANNEL_DELETE" => GatewayEvent::ChannelRemoved(serde_json::from_value(data)?),
            "VOICE_STATE_UPDATE" => GatewayEvent::VoiceStateUpdate(serde_json::from_value(data)?),
            "MESSAGE_CREATE" => GatewayEvent::MessageCreate(serde_json::from_value(data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GatewayEvent::Ready(_) => "ready",
            GatewayEvent::Resumed => "resumed",
            GatewayEvent::GuildAvailable(_) => "guild_available",
            GatewayEvent::ChannelUpsert(_) => "channel_upsert",
            GatewayEvent::ChannelRemoved(_) => "channel_removed",
            GatewayEvent::VoiceStateUpdate(_) => "voice_state_update",
            GatewayEvent::MessageCreate(_) => "message_create",
        }
    }
}
