use crate::error::AppError;
use crate::gateway::events::{
    decode_dispatch, heartbeat_payload, identify_payload, GatewayPayload, GuildEvent, Hello,
    IdentifyProperties, OP_DISPATCH, OP_HEARTBEAT, OP_HEARTBEAT_ACK, OP_HELLO, OP_INVALID_SESSION,
    OP_RECONNECT,
};
use crate::util::mask_token;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Close codes after which reconnecting cannot help
const FATAL_CLOSE_CODES: [u16; 6] = [4004, 4010, 4011, 4012, 4013, 4014];

/// Connection settings shared by every session
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub api_version: String,
    pub properties: IdentifyProperties,
}

impl GatewayConfig {
    pub fn endpoint(&self) -> Result<url::Url, AppError> {
        let mut url = url::Url::parse(&self.url)?;
        url.query_pairs_mut()
            .append_pair("v", &self.api_version)
            .append_pair("encoding", "json");
        Ok(url)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Disconnect {
    Shutdown,
    Reconnect(String),
    Fatal(String),
}

/// One authenticated gateway connection. Decoded guild events are pushed to
/// `events` until shutdown, reconnecting with backoff when the socket drops.
pub struct GatewaySession {
    token: String,
    label: String,
    config: Arc<GatewayConfig>,
    events: mpsc::Sender<GuildEvent>,
    shutdown: watch::Receiver<bool>,
    backoff: Duration,
}

impl GatewaySession {
    pub fn new(
        token: String,
        config: Arc<GatewayConfig>,
        events: mpsc::Sender<GuildEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let label = mask_token(&token, 30);
        Self {
            token,
            label,
            config,
            events,
            shutdown,
            backoff: INITIAL_BACKOFF,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("Logging in with token: {}", self.label);

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            match self.connect_once().await {
                Ok(Disconnect::Shutdown) => break,
                Ok(Disconnect::Fatal(reason)) => {
                    tracing::error!("Session {} closed for good: {reason}", self.label);
                    break;
                }
                Ok(Disconnect::Reconnect(reason)) => {
                    tracing::warn!("Session {} disconnected: {reason}", self.label);
                }
                Err(e) => {
                    tracing::error!("Session {} connection failed: {e}", self.label);
                }
            }

            tracing::info!(
                "Reconnecting session {} in {:.0}s",
                self.label,
                self.backoff.as_secs_f64()
            );
            tokio::select! {
                _ = tokio::time::sleep(self.backoff) => {}
                _ = self.shutdown.changed() => break,
            }
            self.backoff = next_backoff(self.backoff);
        }

        tracing::debug!("Session {} stopped", self.label);
    }

    async fn connect_once(&mut self) -> Result<Disconnect, AppError> {
        let Self {
            token,
            label,
            config,
            events,
            shutdown,
            backoff,
        } = self;

        let endpoint = config.endpoint()?;
        let (ws_stream, _response) = tokio_tungstenite::connect_async(endpoint.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let hello = match read.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<GatewayPayload>(&text)?,
            Some(Ok(other)) => {
                return Err(AppError::Gateway(format!("expected hello, got {other:?}")));
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(Disconnect::Reconnect("closed before hello".into())),
        };
        if hello.op != OP_HELLO {
            return Err(AppError::Gateway(format!("expected hello, got op {}", hello.op)));
        }
        let hello: Hello = serde_json::from_value(hello.d.unwrap_or_default())?;
        let period = Duration::from_millis(hello.heartbeat_interval.max(1));

        let identify = identify_payload(token, &config.properties);
        write.send(Message::Text(identify.to_string())).await?;

        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sequence: Option<u64> = None;
        let mut awaiting_ack = false;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    return Ok(Disconnect::Shutdown);
                }
                _ = heartbeat.tick() => {
                    if awaiting_ack {
                        return Ok(Disconnect::Reconnect("heartbeat was not acknowledged".into()));
                    }
                    awaiting_ack = true;
                    write.send(Message::Text(heartbeat_payload(sequence).to_string())).await?;
                }
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => return Ok(classify_close(frame)),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(Disconnect::Reconnect("stream ended".into())),
                    };

                    let payload: GatewayPayload = match serde_json::from_str(&text) {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::debug!("Skipping undecodable gateway frame: {e}");
                            continue;
                        }
                    };
                    if payload.s.is_some() {
                        sequence = payload.s;
                    }

                    match payload.op {
                        OP_DISPATCH => {
                            let kind = payload.t.unwrap_or_default();
                            if kind == "READY" {
                                *backoff = INITIAL_BACKOFF;
                            }
                            let event = match decode_dispatch(&kind, payload.d.unwrap_or_default()) {
                                Ok(Some(event)) => event,
                                Ok(None) => continue,
                                Err(e) => {
                                    tracing::warn!("Failed to decode {kind} on session {label}: {e}");
                                    continue;
                                }
                            };
                            if events.send(event).await.is_err() {
                                return Ok(Disconnect::Shutdown);
                            }
                        }
                        OP_HEARTBEAT => {
                            write.send(Message::Text(heartbeat_payload(sequence).to_string())).await?;
                        }
                        OP_HEARTBEAT_ACK => awaiting_ack = false,
                        OP_RECONNECT => return Ok(Disconnect::Reconnect("server requested reconnect".into())),
                        OP_INVALID_SESSION => return Ok(Disconnect::Reconnect("session invalidated".into())),
                        _ => {}
                    }
                }
            }
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

fn classify_close(frame: Option<CloseFrame<'_>>) -> Disconnect {
    let Some(frame) = frame else {
        return Disconnect::Reconnect("closed without a frame".into());
    };
    let code = u16::from(frame.code);
    let reason = format!("close code {code}: {}", frame.reason);
    if FATAL_CLOSE_CODES.contains(&code) {
        Disconnect::Fatal(reason)
    } else {
        Disconnect::Reconnect(reason)
    }
}
