//! Channel and voice presence cache
//!
//! Gateway voice updates only carry the new channel; the previous one comes
//! from this cache.

use std::collections::HashMap;

use crate::domain::{ChannelInfo, GuildSnapshot};

/// A member's move between voice channels, by channel name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceTransition {
    Joined { channel: String },
    Left { channel: String },
    Moved { from: String, to: String },
}

impl VoiceTransition {
    /// Transition between two channel ids; `None` when nothing moved
    /// (mute, deafen, stream toggles).
    pub fn detect(before: Option<&str>, after: Option<&str>) -> Option<Self> {
        match (before, after) {
            (None, Some(to)) => Some(VoiceTransition::Joined {
                channel: to.to_string(),
            }),
            (Some(from), None) => Some(VoiceTransition::Left {
                channel: from.to_string(),
            }),
            (Some(from), Some(to)) if from != to => Some(VoiceTransition::Moved {
                from: from.to_string(),
                to: to.to_string(),
            }),
            _ => None,
        }
    }

    /// Replace channel ids with names
    pub fn named(self, cache: &PresenceCache) -> Self {
        match self {
            VoiceTransition::Joined { channel } => VoiceTransition::Joined {
                channel: cache.channel_name(&channel),
            },
            VoiceTransition::Left { channel } => VoiceTransition::Left {
                channel: cache.channel_name(&channel),
            },
            VoiceTransition::Moved { from, to } => VoiceTransition::Moved {
                from: cache.channel_name(&from),
                to: cache.channel_name(&to),
            },
        }
    }

    /// Notification text (markdown)
    pub fn message(&self, member: &str) -> String {
        match self {
            VoiceTransition::Joined { channel } => {
                format!("🔊 **{}** si è collegato a **{}**", member, channel)
            }
            VoiceTransition::Left { channel } => {
                format!("🔇 **{}** si è disconnesso da **{}**", member, channel)
            }
            VoiceTransition::Moved { from, to } => {
                format!("🔄 **{}** si è spostato da **{}** a **{}**", member, from, to)
            }
        }
    }

    /// Plain log line
    pub fn log_line(&self, member: &str) -> String {
        match self {
            VoiceTransition::Joined { channel } => format!("{} si è collegato a {}", member, channel),
            VoiceTransition::Left { channel } => format!("{} si è disconnesso da {}", member, channel),
            VoiceTransition::Moved { from, to } => {
                format!("{} si è spostato da {} a {}", member, from, to)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct CachedChannel {
    name: Option<String>,
    kind: u8,
    guild_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct PresenceCache {
    channels: HashMap<String, CachedChannel>,
    /// (guild id, user id) -> voice channel id
    voice: HashMap<(String, String), String>,
    /// guild id -> approximate member count
    guilds: HashMap<String, Option<u64>>,
}

impl PresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything known about a guild with its snapshot
    pub fn apply_guild(&mut self, guild: &GuildSnapshot) {
        self.guilds.insert(guild.id.clone(), guild.member_count);

        for channel in &guild.channels {
            self.channels.insert(
                channel.id.clone(),
                CachedChannel {
                    name: channel.name.clone(),
                    kind: channel.kind,
                    guild_id: Some(guild.id.clone()),
                },
            );
        }

        self.voice.retain(|(guild_id, _), _| guild_id != &guild.id);
        for state in &guild.voice_states {
            if let Some(channel_id) = &state.channel_id {
                self.voice.insert(
                    (guild.id.clone(), state.user_id.clone()),
                    channel_id.clone(),
                );
            }
        }
    }

    pub fn upsert_channel(&mut self, channel: &ChannelInfo) {
        let previous_guild = self
            .channels
            .get(&channel.id)
            .and_then(|c| c.guild_id.clone());
        self.channels.insert(
            channel.id.clone(),
            CachedChannel {
                name: channel.name.clone(),
                kind: channel.kind,
                guild_id: channel.guild_id.clone().or(previous_guild),
            },
        );
    }

    pub fn remove_channel(&mut self, channel: &ChannelInfo) {
        self.channels.remove(&channel.id);
    }

    /// Record a member's current voice channel and return the previous one
    pub fn update_voice(
        &mut self,
        guild_id: &str,
        user_id: &str,
        channel_id: Option<&str>,
    ) -> Option<String> {
        let key = (guild_id.to_string(), user_id.to_string());
        match channel_id {
            Some(channel_id) => self.voice.insert(key, channel_id.to_string()),
            None => self.voice.remove(&key),
        }
    }

    /// Channel name, falling back to the id when unknown
    pub fn channel_name(&self, channel_id: &str) -> String {
        self.channels
            .get(channel_id)
            .and_then(|c| c.name.clone())
            .unwrap_or_else(|| channel_id.to_string())
    }

    /// Whether a channel accepts plain messages; `None` when never seen
    pub fn is_messageable(&self, channel_id: &str) -> Option<bool> {
        self.channels.get(channel_id).map(|c| {
            ChannelInfo {
                id: channel_id.to_string(),
                kind: c.kind,
                name: None,
                guild_id: None,
            }
            .is_messageable()
        })
    }

    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }

    /// Sum of announced member counts
    pub fn member_count(&self) -> u64 {
        self.guilds.values().filter_map(|count| *count).sum()
    }

    pub fn voice_channel_of(&self, guild_id: &str, user_id: &str) -> Option<&str> {
        self.voice
            .get(&(guild_id.to_string(), user_id.to_string()))
            .map(String::as_str)
    }
}
