//! Capture Sources
//!
//! The upstream collaborator is modeled as a restartable source of sessions.
//! Each session yields raw payloads plus connection lifecycle events.
//!
//! [`WebSocketSource`] talks to the upstream WebSocket directly.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};

use super::error::CaptureError;

/// Event emitted by a capture session
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// An upstream connection was opened (diagnostic only)
    ConnectionCreated { url: String },
    /// An upstream connection was closed (diagnostic only)
    ConnectionClosed { reason: String },
    /// A raw encoded payload
    Payload(String),
}

/// Source of capture sessions.
///
/// Implementations must be restartable: `start` may be called again after a
/// previous session failed, and must build a fresh session each time.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Establish a new session
    async fn start(&self) -> Result<Box<dyn CaptureSession>, CaptureError>;
}

/// A live capture session.
#[async_trait]
pub trait CaptureSession: Send {
    /// Wait for the next event.
    ///
    /// `Err` means the session is over; the supervisor restarts it.
    async fn next_event(&mut self) -> Result<CaptureEvent, CaptureError>;

    /// Release the session. Called on shutdown and after failures.
    async fn close(&mut self) {}
}

/// Configuration for [`WebSocketSource`]
#[derive(Debug, Clone)]
pub struct WebSocketSourceConfig {
    /// Upstream WebSocket URL
    pub url: String,
    /// Text frame sent right after connecting, if any
    pub handshake: Option<String>,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// End the session when no frame arrives for this long
    pub idle_timeout: Option<Duration>,
}

impl Default for WebSocketSourceConfig {
    fn default() -> Self {
        Self {
            url: "wss://ws1.blitzortung.org/".to_string(),
            handshake: Some(r#"{"a":111}"#.to_string()),
            connect_timeout: Duration::from_secs(60),
            idle_timeout: Some(Duration::from_secs(120)),
        }
    }
}

/// Direct WebSocket client for the upstream strike feed
pub struct WebSocketSource {
    config: WebSocketSourceConfig,
}

impl WebSocketSource {
    pub fn new(config: WebSocketSourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CaptureSource for WebSocketSource {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn start(&self) -> Result<Box<dyn CaptureSession>, CaptureError> {
        tracing::info!(url = %self.config.url, "Connecting to upstream");

        let connect_result =
            tokio::time::timeout(self.config.connect_timeout, connect_async(self.config.url.as_str())).await;

        let (ws_stream, _) = match connect_result {
            Ok(Ok((stream, response))) => (stream, response),
            Ok(Err(e)) => return Err(CaptureError::Connection(e.to_string())),
            Err(_) => return Err(CaptureError::Timeout),
        };

        let (mut write, read) = ws_stream.split();

        if let Some(handshake) = &self.config.handshake {
            write.send(Message::Text(handshake.clone())).await?;
        }

        Ok(Box::new(WebSocketSession {
            url: self.config.url.clone(),
            idle_timeout: self.config.idle_timeout,
            write,
            read,
            announced: false,
            closed: false,
        }))
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WebSocketSession {
    url: String,
    idle_timeout: Option<Duration>,
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    announced: bool,
    closed: bool,
}

#[async_trait]
impl CaptureSession for WebSocketSession {
    async fn next_event(&mut self) -> Result<CaptureEvent, CaptureError> {
        if !self.announced {
            self.announced = true;
            return Ok(CaptureEvent::ConnectionCreated {
                url: self.url.clone(),
            });
        }
        if self.closed {
            return Err(CaptureError::StreamEnded);
        }

        loop {
            // A half-open connection yields neither frames nor errors
            let frame = match self.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, self.read.next()).await {
                    Ok(frame) => frame,
                    Err(_) => return Err(CaptureError::Idle(limit)),
                },
                None => self.read.next().await,
            };

            match frame {
                Some(Ok(Message::Text(text))) => return Ok(CaptureEvent::Payload(text)),
                Some(Ok(Message::Binary(bytes))) => {
                    // Some upstream mirrors send text as binary frames
                    match String::from_utf8(bytes) {
                        Ok(text) => return Ok(CaptureEvent::Payload(text)),
                        Err(e) => {
                            tracing::debug!(error = %e, "Dropping non-UTF-8 binary frame");
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    self.write.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    self.closed = true;
                    let reason = frame
                        .map(|f| format!("{} {}", f.code, f.reason))
                        .unwrap_or_else(|| "no close frame".to_string());
                    return Ok(CaptureEvent::ConnectionClosed { reason });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => {
                    self.closed = true;
                    return Ok(CaptureEvent::ConnectionClosed {
                        reason: "stream ended".to_string(),
                    });
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.write.close().await {
            tracing::debug!(error = %e, "Upstream close failed");
        }
    }
}
