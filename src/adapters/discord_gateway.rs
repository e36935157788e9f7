//! Discord gateway adapter
//!
//! Speaks gateway v10 with JSON encoding: HELLO, IDENTIFY, READY, then
//! dispatches interleaved with heartbeats. Resume is not implemented; every
//! reconnect starts a fresh session.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::GatewaySettings;
use crate::domain::{GatewayEvent, ReadyInfo};
use crate::error::Result;
use crate::gateway::{Connected, EventStream, Gateway, GatewayFailure};
use crate::services::Metrics;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

const INTENT_GUILDS: u64 = 1 << 0;
const INTENT_GUILD_MEMBERS: u64 = 1 << 1;
const INTENT_GUILD_VOICE_STATES: u64 = 1 << 7;
const INTENT_GUILD_MESSAGES: u64 = 1 << 9;
const INTENT_MESSAGE_CONTENT: u64 = 1 << 15;

/// Intents requested at IDENTIFY
pub const INTENTS: u64 = INTENT_GUILDS
    | INTENT_GUILD_MEMBERS
    | INTENT_GUILD_VOICE_STATES
    | INTENT_GUILD_MESSAGES
    | INTENT_MESSAGE_CONTENT;

/// Presence shown as "Watching i canali vocali 👀"
pub const PRESENCE_NAME: &str = "i canali vocali 👀";
const ACTIVITY_WATCHING: u8 = 3;

/// Raw gateway payload
#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Hello {
    heartbeat_interval: u64,
}

fn identify_payload(token: &str) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "voice-relay",
                "device": "voice-relay",
            },
            "presence": {
                "since": null,
                "activities": [{ "name": PRESENCE_NAME, "type": ACTIVITY_WATCHING }],
                "status": "online",
                "afk": false,
            },
        },
    })
}

fn map_ws_error(error: WsError) -> GatewayFailure {
    match error {
        WsError::Url(e) => GatewayFailure::Unexpected(format!("invalid gateway url: {}", e)),
        WsError::HttpFormat(e) => GatewayFailure::Unexpected(format!("malformed request: {}", e)),
        WsError::Http(response) if response.status().as_u16() == 401 => {
            GatewayFailure::Auth("gateway returned 401 Unauthorized".to_string())
        }
        other => GatewayFailure::closed(other.to_string()),
    }
}

fn close_failure(frame: Option<CloseFrame<'_>>) -> GatewayFailure {
    match frame {
        Some(frame) => GatewayFailure::from_close_code(u16::from(frame.code), frame.reason.to_string()),
        None => GatewayFailure::closed("closed without a close frame"),
    }
}

fn decode(text: &str) -> std::result::Result<GatewayPayload, GatewayFailure> {
    serde_json::from_str(text)
        .map_err(|e| GatewayFailure::Unexpected(format!("malformed gateway payload: {}", e)))
}

/// Gateway client used by the connection supervisor
pub struct DiscordGateway {
    url: Url,
    connect_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl DiscordGateway {
    pub fn new(url: &str, connect_timeout: Duration, metrics: Arc<Metrics>) -> Result<Self> {
        Ok(Self {
            url: Url::parse(url)?,
            connect_timeout,
            metrics,
        })
    }

    pub fn from_settings(settings: &GatewaySettings, metrics: Arc<Metrics>) -> Result<Self> {
        Self::new(
            &settings.url,
            Duration::from_secs(settings.connect_timeout_secs),
            metrics,
        )
    }
}

#[async_trait]
impl Gateway for DiscordGateway {
    async fn connect(&self, token: &str) -> std::result::Result<Connected, GatewayFailure> {
        info!("Connecting to Discord gateway: {}", self.url);

        let (ws, _) = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| {
                GatewayFailure::closed(format!(
                    "connection timed out after {:?}",
                    self.connect_timeout
                ))
            })?
            .map_err(map_ws_error)?;

        let (ready, session) =
            DiscordSession::handshake(ws, token, Arc::clone(&self.metrics), self.connect_timeout)
                .await?;

        Ok(Connected {
            ready,
            stream: Box::new(session),
        })
    }
}

/// An identified gateway session
pub struct DiscordSession<S> {
    ws: WebSocketStream<S>,
    heartbeat: Interval,
    awaiting_ack: bool,
    last_heartbeat: Option<Instant>,
    sequence: Option<u64>,
    metrics: Arc<Metrics>,
}

impl<S> DiscordSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// HELLO, IDENTIFY, then wait for READY.
    ///
    /// The whole exchange is bounded by `timeout`.
    pub async fn handshake(
        mut ws: WebSocketStream<S>,
        token: &str,
        metrics: Arc<Metrics>,
        timeout: Duration,
    ) -> std::result::Result<(ReadyInfo, Self), GatewayFailure> {
        let handshake = async move {
            let hello = read_hello(&mut ws).await?;
            let period = Duration::from_millis(hello.heartbeat_interval.max(1));
            debug!("Gateway HELLO, heartbeat every {:?}", period);

            let mut heartbeat = interval_at(Instant::now() + period, period);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut session = Self {
                ws,
                heartbeat,
                awaiting_ack: false,
                last_heartbeat: None,
                sequence: None,
                metrics,
            };
            session.send_json(&identify_payload(token)).await?;

            loop {
                match session.next_dispatch().await? {
                    Some((name, data)) if name == "READY" => {
                        let ready: ReadyInfo = serde_json::from_value(data).map_err(|e| {
                            GatewayFailure::Unexpected(format!("malformed READY: {}", e))
                        })?;
                        return Ok((ready, session));
                    }
                    Some((name, _)) => debug!("Ignoring {} before READY", name),
                    None => return Err(GatewayFailure::closed("stream ended before READY")),
                }
            }
        };

        tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| GatewayFailure::closed(format!("handshake timed out after {:?}", timeout)))?
    }

    async fn send_json(&mut self, payload: &Value) -> std::result::Result<(), GatewayFailure> {
        self.ws
            .send(Message::Text(payload.to_string()))
            .await
            .map_err(map_ws_error)
    }

    async fn send_heartbeat(&mut self) -> std::result::Result<(), GatewayFailure> {
        let payload = json!({ "op": OP_HEARTBEAT, "d": self.sequence });
        self.send_json(&payload).await?;
        self.awaiting_ack = true;
        self.last_heartbeat = Some(Instant::now());
        debug!("Sent heartbeat (seq {:?})", self.sequence);
        Ok(())
    }

    fn on_heartbeat_ack(&mut self) {
        self.awaiting_ack = false;
        if let Some(sent) = self.last_heartbeat {
            let latency = sent.elapsed().as_millis() as u64;
            self.metrics.set_latency_ms(latency);
            debug!("Heartbeat acknowledged in {}ms", latency);
        }
    }

    /// Next dispatch as `(event name, data)`; `Ok(None)` when the socket ended.
    ///
    /// Heartbeats, acks and control opcodes are handled here.
    async fn next_dispatch(
        &mut self,
    ) -> std::result::Result<Option<(String, Value)>, GatewayFailure> {
        loop {
            tokio::select! {
                msg = self.ws.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => return Err(close_failure(frame)),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(map_ws_error(e)),
                        None => return Ok(None),
                    };

                    let payload = decode(&text)?;
                    if payload.s.is_some() {
                        self.sequence = payload.s;
                    }

                    match payload.op {
                        OP_DISPATCH => {
                            if let Some(name) = payload.t {
                                return Ok(Some((name, payload.d)));
                            }
                        }
                        OP_HEARTBEAT => self.send_heartbeat().await?,
                        OP_HEARTBEAT_ACK => self.on_heartbeat_ack(),
                        OP_RECONNECT => {
                            return Err(GatewayFailure::closed("server requested reconnect"))
                        }
                        OP_INVALID_SESSION => {
                            return Err(GatewayFailure::closed("session invalidated"))
                        }
                        other => debug!("Ignoring gateway opcode {}", other),
                    }
                }
                _ = self.heartbeat.tick() => {
                    if self.awaiting_ack {
                        return Err(GatewayFailure::closed("heartbeat not acknowledged"));
                    }
                    self.send_heartbeat().await?;
                }
            }
        }
    }
}

async fn read_hello<S>(ws: &mut WebSocketStream<S>) -> std::result::Result<Hello, GatewayFailure>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let text = match ws.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(frame))) => return Err(close_failure(frame)),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(map_ws_error(e)),
            None => return Err(GatewayFailure::closed("stream ended before HELLO")),
        };

        let payload = decode(&text)?;
        if payload.op != OP_HELLO {
            debug!("Ignoring opcode {} before HELLO", payload.op);
            continue;
        }
        return serde_json::from_value(payload.d)
            .map_err(|e| GatewayFailure::Unexpected(format!("malformed HELLO: {}", e)));
    }
}

#[async_trait]
impl<S> EventStream for DiscordSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn next_event(&mut self) -> std::result::Result<Option<GatewayEvent>, GatewayFailure> {
        loop {
            let Some((name, data)) = self.next_dispatch().await? else {
                return Ok(None);
            };
            match GatewayEvent::from_dispatch(&name, data) {
                Ok(Some(event)) => return Ok(Some(event)),
                Ok(None) => {}
                Err(e) => warn!("Skipping undecodable {} dispatch: {}", name, e),
            }
        }
    }

    async fn close(&mut self) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "shutting down".into(),
        };
        if let Err(e) = self.ws.close(Some(frame)).await {
            debug!("Error while closing gateway socket: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::FailureKind;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn socket_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
        (client, server)
    }

    async fn send(server: &mut WebSocketStream<DuplexStream>, payload: Value) {
        server.send(Message::Text(payload.to_string())).await.unwrap();
    }

    async fn recv_json(server: &mut WebSocketStream<DuplexStream>) -> Value {
        loop {
            match server.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("unexpected frame: {:?}", other),
            }
        }
    }

    fn hello(interval_ms: u64) -> Value {
        json!({ "op": 10, "d": { "heartbeat_interval": interval_ms } })
    }

    fn ready() -> Value {
        json!({
            "op": 0, "s": 1, "t": "READY",
            "d": {
                "user": { "id": "42", "username": "relay", "bot": true },
                "session_id": "sess-1",
                "guilds": [{ "id": "7" }],
            }
        })
    }

    #[test]
    fn test_intents() {
        assert_eq!(INTENTS, 1 | 2 | 128 | 512 | 32768);
    }

    #[test]
    fn test_identify_payload() {
        let payload = identify_payload("secret");
        assert_eq!(payload["op"], 2);
        assert_eq!(payload["d"]["token"], "secret");
        assert_eq!(payload["d"]["intents"], INTENTS);
        assert_eq!(payload["d"]["presence"]["activities"][0]["type"], 3);
        assert_eq!(payload["d"]["presence"]["activities"][0]["name"], PRESENCE_NAME);
    }

    #[test]
    fn test_close_frame_classification() {
        let auth = close_failure(Some(CloseFrame {
            code: CloseCode::from(4004),
            reason: "Authentication failed.".into(),
        }));
        assert_eq!(auth.kind(), FailureKind::Fatal);

        let normal = close_failure(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }));
        assert_eq!(
            normal,
            GatewayFailure::Closed {
                code: Some(1000),
                reason: String::new()
            }
        );
        assert_eq!(close_failure(None).kind(), FailureKind::RecoverableNetwork);
    }

    #[tokio::test]
    async fn test_handshake_then_events() {
        let (client, mut server) = socket_pair().await;

        let server_task = tokio::spawn(async move {
            send(&mut server, hello(45_000)).await;
            let identify = recv_json(&mut server).await;
            assert_eq!(identify["op"], 2);
            assert_eq!(identify["d"]["token"], "tok");

            send(&mut server, ready()).await;
            send(&mut server, json!({ "op": 0, "s": 2, "t": "TYPING_START", "d": {} })).await;
            send(&mut server, json!({ "op": 0, "s": 3, "t": "VOICE_STATE_UPDATE", "d": { "bogus": true } })).await;
            send(
                &mut server,
                json!({
                    "op": 0, "s": 4, "t": "VOICE_STATE_UPDATE",
                    "d": { "guild_id": "7", "channel_id": "100", "user_id": "5" }
                }),
            )
            .await;
            server
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "bye".into(),
                })))
                .await
                .unwrap();
            server
        });

        let metrics = Arc::new(Metrics::new());
        let (ready, mut session) =
            DiscordSession::handshake(client, "tok", metrics, Duration::from_secs(5))
                .await
                .unwrap();
        assert_eq!(ready.session_id, "sess-1");
        assert_eq!(ready.user.username, "relay");

        match session.next_event().await.unwrap() {
            Some(GatewayEvent::VoiceStateUpdate(state)) => {
                assert_eq!(state.user_id, "5");
                assert_eq!(state.channel_id.as_deref(), Some("100"));
            }
            other => panic!("expected voice state update, got {:?}", other),
        }
        assert_eq!(session.sequence, Some(4));

        let failure = session.next_event().await.unwrap_err();
        assert_eq!(failure.kind(), FailureKind::RecoverableNetwork);

        let _server = server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_token_close_is_auth() {
        let (client, mut server) = socket_pair().await;

        let server_task = tokio::spawn(async move {
            send(&mut server, hello(45_000)).await;
            recv_json(&mut server).await;
            server
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::from(4004),
                    reason: "Authentication failed.".into(),
                })))
                .await
                .unwrap();
            server
        });

        let result = DiscordSession::handshake(
            client,
            "bad",
            Arc::new(Metrics::new()),
            Duration::from_secs(5),
        )
        .await;
        match result {
            Err(GatewayFailure::Auth(reason)) => assert!(reason.contains("4004")),
            Err(other) => panic!("expected auth failure, got {:?}", other),
            Ok(_) => panic!("expected auth failure, got a session"),
        }

        let _server = server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_opcode_is_recoverable() {
        let (client, mut server) = socket_pair().await;

        let server_task = tokio::spawn(async move {
            send(&mut server, hello(45_000)).await;
            recv_json(&mut server).await;
            send(&mut server, ready()).await;
            send(&mut server, json!({ "op": 7, "d": null })).await;
            server
        });

        let (_, mut session) = DiscordSession::handshake(
            client,
            "tok",
            Arc::new(Metrics::new()),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let failure = session.next_event().await.unwrap_err();
        assert_eq!(failure, GatewayFailure::closed("server requested reconnect"));

        let _server = server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_missed_heartbeat_ack_closes_session() {
        let (client, mut server) = socket_pair().await;

        let server_task = tokio::spawn(async move {
            send(&mut server, hello(50)).await;
            recv_json(&mut server).await;
            send(&mut server, ready()).await;

            // Acknowledge only the first heartbeat
            let beat = recv_json(&mut server).await;
            assert_eq!(beat["op"], 1);
            assert_eq!(beat["d"], 1);
            send(&mut server, json!({ "op": 11 })).await;

            while let Some(Ok(_)) = server.next().await {}
        });

        let metrics = Arc::new(Metrics::new());
        let (_, mut session) = DiscordSession::handshake(
            client,
            "tok",
            Arc::clone(&metrics),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let failure = tokio::time::timeout(Duration::from_secs(5), session.next_event())
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(failure, GatewayFailure::closed("heartbeat not acknowledged"));
        assert!(metrics.latency_ms().is_some());

        drop(session);
        let _ = server_task.await;
    }

    #[test]
    fn test_gateway_rejects_bad_url() {
        assert!(DiscordGateway::new("not a url", Duration::from_secs(1), Arc::new(Metrics::new())).is_err());
    }
}
