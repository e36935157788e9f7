//! Event relay
//!
//! Turns voice presence changes into notifications for the configured text
//! channel and answers the `!ping` and `!status` commands.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::domain::{ChatMessage, GatewayEvent, ReadyInfo, VoiceState};
use crate::error::{RelayError, Result};
use crate::gateway::EventHandler;
use crate::relay::presence::{PresenceCache, VoiceTransition};
use crate::relay::sink::{Embed, MessageSink, OutgoingMessage};
use crate::services::Metrics;

const COMMAND_PREFIX: char = '!';
const STATUS_COLOR: u32 = 0x00ff00;
const STATUS_ERROR_TEXT: &str = "❌ Errore durante il recupero delle informazioni del bot";

/// Gateway event handler of the relay
pub struct EventRelay {
    sink: Arc<dyn MessageSink>,
    target_channel_id: u64,
    metrics: Arc<Metrics>,
    cache: RwLock<PresenceCache>,
    ready_guilds: AtomicUsize,
}

impl EventRelay {
    pub fn new(sink: Arc<dyn MessageSink>, target_channel_id: u64, metrics: Arc<Metrics>) -> Self {
        Self {
            sink,
            target_channel_id,
            metrics,
            cache: RwLock::new(PresenceCache::new()),
            ready_guilds: AtomicUsize::new(0),
        }
    }

    fn latency_text(&self) -> String {
        match self.metrics.latency_ms() {
            Some(ms) => format!("{}ms", ms),
            None => "n/d".to_string(),
        }
    }

    async fn handle_voice(&self, state: &VoiceState) -> Result<()> {
        let Some(guild_id) = state.guild_id.as_deref() else {
            return Ok(());
        };

        let transition = {
            let mut cache = self.cache.write().await;
            let previous =
                cache.update_voice(guild_id, &state.user_id, state.channel_id.as_deref());
            VoiceTransition::detect(previous.as_deref(), state.channel_id.as_deref())
                .map(|t| t.named(&cache))
        };

        let member = state.member.as_ref();
        if member.map(|m| m.is_bot()).unwrap_or(false) {
            return Ok(());
        }
        let Some(transition) = transition else {
            return Ok(());
        };

        let name = member
            .and_then(|m| m.display_name())
            .unwrap_or(&state.user_id)
            .to_string();

        self.ensure_target_is_text().await?;
        self.sink
            .send_message(
                self.target_channel_id,
                &OutgoingMessage::text(transition.message(&name)),
            )
            .await?;
        self.metrics.inc_notifications();
        info!("{}", transition.log_line(&name));
        Ok(())
    }

    /// Fails when the target is known to be a channel that cannot hold messages
    async fn ensure_target_is_text(&self) -> Result<()> {
        let target = self.target_channel_id.to_string();
        match self.cache.read().await.is_messageable(&target) {
            Some(false) => {
                error!(
                    "Il canale con ID {} non è un canale di testo",
                    self.target_channel_id
                );
                Err(RelayError::NotTextChannel(self.target_channel_id))
            }
            _ => Ok(()),
        }
    }

    async fn handle_message(&self, message: &ChatMessage) -> Result<()> {
        if message.author.bot {
            return Ok(());
        }
        let Some(command) = message
            .content
            .trim()
            .strip_prefix(COMMAND_PREFIX)
            .and_then(|rest| rest.split_whitespace().next())
        else {
            return Ok(());
        };

        let channel_id: u64 = message.channel_id.parse().map_err(|_| {
            RelayError::Internal(format!("invalid channel id {}", message.channel_id))
        })?;

        match command {
            "ping" => self.ping_command(channel_id, message).await,
            "status" => self.status_command(channel_id, message).await,
            other => {
                debug!("Ignoring unknown command !{}", other);
                Ok(())
            }
        }
    }

    async fn ping_command(&self, channel_id: u64, message: &ChatMessage) -> Result<()> {
        let latency = self.latency_text();
        self.sink
            .send_message(
                channel_id,
                &OutgoingMessage::text(format!("🏓 Pong! Latenza: {}", latency)),
            )
            .await?;
        self.metrics.inc_commands();
        info!(
            "Comando ping eseguito da {} - Latenza: {}",
            message.author.username, latency
        );
        Ok(())
    }

    async fn status_command(&self, channel_id: u64, message: &ChatMessage) -> Result<()> {
        let embed = self.status_embed().await;
        match self
            .sink
            .send_message(channel_id, &OutgoingMessage::embed(embed))
            .await
        {
            Ok(()) => {
                self.metrics.inc_commands();
                info!("Comando status eseguito da {}", message.author.username);
                Ok(())
            }
            Err(e) => {
                error!("Errore nel comando status: {}", e);
                if let Err(reply_error) = self
                    .sink
                    .send_message(channel_id, &OutgoingMessage::text(STATUS_ERROR_TEXT))
                    .await
                {
                    warn!("Failed to send status error reply: {}", reply_error);
                }
                Err(e)
            }
        }
    }

    pub async fn status_embed(&self) -> Embed {
        let (guilds, members) = {
            let cache = self.cache.read().await;
            (cache.guild_count(), cache.member_count())
        };
        let guilds = guilds.max(self.ready_guilds.load(Ordering::Relaxed));

        Embed::new("📊 Stato del Bot", STATUS_COLOR)
            .description("Il bot è online e funzionante!")
            .inline_field("🏓 Latenza", self.latency_text())
            .inline_field("🔗 Server", guilds.to_string())
            .inline_field("👥 Utenti", members.to_string())
    }
}

#[async_trait]
impl EventHandler for EventRelay {
    async fn on_connect(&self, ready: &ReadyInfo) {
        self.ready_guilds.store(ready.guilds.len(), Ordering::Relaxed);
        info!("✅ Bot connesso come {}", ready.user.username);
        info!("Bot ID: {}", ready.user.id);
        info!("Connesso a {} server(s)", ready.guilds.len());
    }

    async fn on_state_change(&self, event: &GatewayEvent) -> Result<()> {
        match event {
            GatewayEvent::Ready(_) => Ok(()),
            GatewayEvent::Resumed => {
                info!("🔄 Connessione ripristinata");
                Ok(())
            }
            GatewayEvent::GuildAvailable(guild) => {
                debug!(
                    "Guild available: {} ({} channels, {} in voice)",
                    guild.name.as_deref().unwrap_or(&guild.id),
                    guild.channels.len(),
                    guild.voice_states.len()
                );
                self.cache.write().await.apply_guild(guild);
                Ok(())
            }
            GatewayEvent::ChannelUpsert(channel) => {
                self.cache.write().await.upsert_channel(channel);
                Ok(())
            }
            GatewayEvent::ChannelRemoved(channel) => {
                self.cache.write().await.remove_channel(channel);
                Ok(())
            }
            GatewayEvent::VoiceStateUpdate(state) => self.handle_voice(state).await,
            GatewayEvent::MessageCreate(message) => self.handle_message(message).await,
        }
    }

    async fn on_disconnect(&self, reason: &str) {
        warn!("⚠️ Bot disconnesso da Discord: {}", reason);
    }
}
