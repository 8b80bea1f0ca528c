//! Live bidirectional sessions over a persistent WebSocket connection.
//!
//! The protocol is JSON-over-WebSocket with one complete JSON document per
//! message and one union variant populated per message in each direction.
//! Connect sends a `setup` message and waits for the `setupComplete`
//! acknowledgement before any client content may be sent; an `error` message
//! at any point (setup included) terminates the session with that error.
//!
//! Sends are serialized behind a lock; a concurrent reader may drain
//! received messages independently — the two directions use independent
//! halves of the transport.

pub mod message;

pub use message::{
    Blob, Content, GoAway, LiveClientContent, LiveClientMessage, LiveClientSetup,
    LiveConnectConfig, LiveRealtimeInput, LiveServerContent, LiveServerMessage, LiveToolResponse,
    Part, SessionResumption, SessionResumptionUpdate, SpeechConfig, Transcription,
};

use crate::config::{Backend, ClientConfig};
use crate::error::{Error, ErrorContext};
use crate::Result;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open live session. Created by a successful connect (after the
/// setup-complete acknowledgement); alive until closed or the transport
/// fails.
pub struct LiveSession {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    closed: AtomicBool,
    /// Wakes a receive parked on the transport when the session is closed
    /// locally; the peer may never answer the close handshake.
    close_signal: Notify,
    /// The setup parameters the session was negotiated with.
    setup: LiveClientSetup,
    /// Latest resumption handle, updated as the server delivers them.
    resumption_handle: Mutex<Option<String>>,
    receive_timeout: Option<Duration>,
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("model", &self.setup.model)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Open a live session against `model` with the given connect parameters.
pub(crate) async fn connect_live(
    config: &ClientConfig,
    model: &str,
    connect_config: LiveConnectConfig,
) -> Result<LiveSession> {
    connect_config.validate_for(config.backend.is_key_addressed())?;

    let url = live_url(config)?;
    let mut request = url.as_str().into_client_request()?;
    if let Backend::ProjectAddressed {
        access_token: Some(token),
        ..
    } = &config.backend
    {
        let value = format!("Bearer {}", token)
            .parse()
            .map_err(|_| Error::build("access token is not a valid header value"))?;
        request.headers_mut().insert("authorization", value);
    }

    debug!(model = model, "opening live session");
    let (ws, _response) = connect_async(request).await?;
    let (mut sink, mut stream) = ws.split();

    let setup = build_setup(config, model, &connect_config);
    let initial_handle = setup
        .session_resumption
        .as_ref()
        .and_then(|r| r.handle.clone());
    let first = LiveClientMessage {
        setup: Some(setup.clone()),
        ..LiveClientMessage::default()
    };
    sink.send(Message::Text(serde_json::to_string(&first)?))
        .await?;

    // Wait for the acknowledgement; anything else first is a violation.
    loop {
        let message = match stream.next().await {
            Some(frame) => frame?,
            None => {
                return Err(Error::protocol_with_context(
                    "connection closed before setup acknowledgement",
                    ErrorContext::new().with_source("live_session"),
                ));
            }
        };
        let decoded = match decode_frame(message)? {
            Frame::Closing => {
                return Err(Error::protocol_with_context(
                    "connection closed before setup acknowledgement",
                    ErrorContext::new().with_source("live_session"),
                ));
            }
            Frame::Control => continue,
            Frame::Protocol(decoded) => decoded,
        };

        if let Some(envelope) = decoded.error {
            let _ = sink.close().await;
            return Err(Error::Api(envelope));
        }
        if decoded.setup_complete.is_some() {
            break;
        }
        return Err(Error::protocol_with_context(
            "expected setup acknowledgement, received another message",
            ErrorContext::new().with_source("live_session"),
        ));
    }

    Ok(LiveSession {
        sink: Mutex::new(sink),
        stream: Mutex::new(stream),
        closed: AtomicBool::new(false),
        close_signal: Notify::new(),
        setup,
        resumption_handle: Mutex::new(initial_handle),
        receive_timeout: config.timeout,
    })
}

impl LiveSession {
    /// The setup parameters this session was negotiated with.
    pub fn setup(&self) -> &LiveClientSetup {
        &self.setup
    }

    /// Latest session-resumption handle, if resumption was requested and the
    /// server has delivered one.
    pub async fn resumption_handle(&self) -> Option<String> {
        self.resumption_handle.lock().await.clone()
    }

    /// Send turn-structured content, optionally marking the final turn.
    pub async fn send_client_content(
        &self,
        turns: Vec<Content>,
        turn_complete: bool,
    ) -> Result<()> {
        self.send(&LiveClientMessage {
            client_content: Some(LiveClientContent {
                turns,
                turn_complete,
            }),
            ..LiveClientMessage::default()
        })
        .await
    }

    /// Send one realtime input. Exactly one field of `input` must be
    /// populated; the check runs before anything goes over the wire.
    pub async fn send_realtime_input(&self, input: LiveRealtimeInput) -> Result<()> {
        input.validate()?;
        self.send(&LiveClientMessage {
            realtime_input: Some(input),
            ..LiveClientMessage::default()
        })
        .await
    }

    /// Send function-call results.
    pub async fn send_tool_response(&self, function_responses: Vec<Value>) -> Result<()> {
        self.send(&LiveClientMessage {
            tool_response: Some(LiveToolResponse { function_responses }),
            ..LiveClientMessage::default()
        })
        .await
    }

    async fn send(&self, message: &LiveClientMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::protocol("live session is closed"));
        }
        let text = serde_json::to_string(message)?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Pull exactly the next server message. Returns `Ok(None)` once the
    /// server closes the connection or after [`close`](Self::close) — a
    /// local close wakes a receive already parked on the transport even when
    /// the peer never answers the close handshake. An `error` message
    /// terminates the session and surfaces as `Error::Api`.
    pub async fn receive(&self) -> Result<Option<LiveServerMessage>> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let mut stream = self.stream.lock().await;
        // The session may have been closed while this receive waited for the
        // transport lock.
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        loop {
            let next = match self.receive_timeout {
                Some(t) => tokio::select! {
                    next = tokio::time::timeout(t, stream.next()) => match next {
                        Ok(next) => next,
                        Err(_) => return Err(Error::DeadlineExceeded(t)),
                    },
                    _ = self.close_signal.notified() => return Ok(None),
                },
                None => tokio::select! {
                    next = stream.next() => next,
                    _ = self.close_signal.notified() => return Ok(None),
                },
            };

            let frame = match next {
                Some(frame) => frame?,
                None => {
                    self.closed.store(true, Ordering::SeqCst);
                    return Ok(None);
                }
            };

            let decoded = match decode_frame(frame)? {
                Frame::Closing => {
                    self.closed.store(true, Ordering::SeqCst);
                    return Ok(None);
                }
                Frame::Control => continue,
                Frame::Protocol(decoded) => decoded,
            };

            if let Some(envelope) = decoded.error {
                drop(stream);
                self.close().await;
                return Err(Error::Api(envelope));
            }
            if let Some(update) = &decoded.session_resumption_update {
                if let Some(handle) = &update.new_handle {
                    *self.resumption_handle.lock().await = Some(handle.clone());
                }
            }
            return Ok(Some(decoded));
        }
    }

    /// Close the session. Always releases the transport; safe to call
    /// multiple times, and failures here are logged rather than surfaced so
    /// cleanup never masks a primary error.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Unblock a receive parked on the transport before touching the sink;
        // the stored permit also covers a receive not yet parked.
        self.close_signal.notify_one();
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            warn!(error = %e, "best-effort close of live transport failed");
        }
    }
}

enum Frame {
    /// Peer is closing the connection.
    Closing,
    /// Ping/pong and raw frames: transport noise, not protocol messages.
    Control,
    Protocol(LiveServerMessage),
}

fn decode_frame(frame: Message) -> Result<Frame> {
    let text = match frame {
        Message::Text(text) => text,
        Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Message::Close(_) => return Ok(Frame::Closing),
        _ => return Ok(Frame::Control),
    };
    let decoded: LiveServerMessage = serde_json::from_str(&text).map_err(|e| {
        Error::decode_with_context(
            format!("invalid JSON in live message: {}", e),
            ErrorContext::new().with_source("live_session"),
        )
    })?;
    Ok(Frame::Protocol(decoded))
}

fn live_url(config: &ClientConfig) -> Result<String> {
    let base = config.ws_base()?;
    Ok(match &config.backend {
        Backend::KeyAddressed { api_key } => format!(
            "{}/ws/google.ai.generativelanguage.{}.GenerativeService.BidiGenerateContent?key={}",
            base, config.api_version, api_key
        ),
        Backend::ProjectAddressed { .. } => format!(
            "{}/ws/google.cloud.aiplatform.{}.LlmBidiService/BidiGenerateContent",
            base, config.api_version
        ),
    })
}

fn build_setup(
    config: &ClientConfig,
    model: &str,
    connect_config: &LiveConnectConfig,
) -> LiveClientSetup {
    // Speech configuration rides inside the generation config on the wire.
    let generation_config = match (&connect_config.generation_config, &connect_config.speech_config)
    {
        (None, None) => None,
        (generation, speech) => {
            let mut map = match generation {
                Some(Value::Object(m)) => m.clone(),
                Some(other) => {
                    let mut m = serde_json::Map::new();
                    m.insert("config".to_string(), other.clone());
                    m
                }
                None => serde_json::Map::new(),
            };
            if let Some(speech) = speech {
                if let Ok(value) = serde_json::to_value(speech) {
                    map.insert("speechConfig".to_string(), value);
                }
            }
            Some(Value::Object(map))
        }
    };

    LiveClientSetup {
        model: config.backend.qualify_model(model),
        generation_config,
        system_instruction: connect_config.system_instruction.clone(),
        tools: connect_config.tools.clone(),
        session_resumption: connect_config.session_resumption.clone(),
        input_audio_transcription: connect_config
            .input_audio_transcription
            .then(|| Value::Object(serde_json::Map::new())),
        output_audio_transcription: connect_config
            .output_audio_transcription
            .then(|| Value::Object(serde_json::Map::new())),
    }
}
