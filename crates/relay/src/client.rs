//! WebSocket client for the push relay.
//!
//! [`RelayClient`] holds the relay address and handshake settings.
//! Call [`RelayClient::connect`] to open the transport, complete the
//! Engine.IO / Socket.IO handshake and obtain a live [`RelayConnection`]
//! together with the relay-assigned session id.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};

use crate::packet::{
    encode_connect, encode_pong, parse_engine_packet, parse_socket_packet, EnginePacket,
    OpenData, SocketPacketKind, DEFAULT_NAMESPACE, ENGINE_IO_VERSION,
};

/// The raw WebSocket stream type used for relay connections.
pub type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection handle for the push relay.
pub struct RelayClient {
    url: String,
    connect_timeout: Duration,
}

/// A live, handshaken connection to the relay.
pub struct RelayConnection {
    /// Socket id assigned by the relay; used as the job correlation key.
    pub session_id: String,
    /// Engine.IO transport id (distinct from the socket id).
    pub engine_sid: String,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub ws_stream: WsStream,
}

impl RelayConnection {
    /// Longest silence tolerated before the connection is considered dead.
    pub fn heartbeat_deadline(&self) -> Duration {
        self.ping_interval + self.ping_timeout
    }
}

impl RelayClient {
    /// Create a client for a relay base URL.
    ///
    /// * `url`             - `https://host`, `wss://host` or with a path prefix.
    /// * `connect_timeout` - bound on opening the transport and the handshake.
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }

    /// Full WebSocket endpoint, e.g. `wss://host/socket.io/?EIO=4&transport=websocket`.
    pub fn endpoint(&self) -> String {
        let base = self.url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/socket.io/?EIO={ENGINE_IO_VERSION}&transport=websocket")
    }

    /// Open the transport and join the default namespace.
    pub async fn connect(&self) -> Result<RelayConnection, RelayClientError> {
        match tokio::time::timeout(self.connect_timeout, self.connect_inner()).await {
            Ok(result) => result,
            Err(_) => Err(RelayClientError::Timeout(self.connect_timeout)),
        }
    }

    async fn connect_inner(&self) -> Result<RelayConnection, RelayClientError> {
        let endpoint = self.endpoint();
        let (mut ws_stream, _response) = connect_async(endpoint.as_str()).await.map_err(|e| {
            RelayClientError::Connection(format!("Failed to connect to relay at {}: {e}", self.url))
        })?;

        let open = read_open(&mut ws_stream).await?;

        ws_stream
            .send(Message::Text(encode_connect(DEFAULT_NAMESPACE)))
            .await
            .map_err(|e| RelayClientError::Protocol(format!("Failed to send connect: {e}")))?;

        let session_id = read_connect_reply(&mut ws_stream).await?;

        tracing::info!(
            session_id = %session_id,
            engine_sid = %open.sid,
            "Connected to relay at {}",
            self.url,
        );

        Ok(RelayConnection {
            session_id,
            engine_sid: open.sid,
            ping_interval: Duration::from_millis(open.ping_interval),
            ping_timeout: Duration::from_millis(open.ping_timeout),
            ws_stream,
        })
    }
}

/// Wait for the Engine.IO `open` packet.
async fn read_open(ws_stream: &mut WsStream) -> Result<OpenData, RelayClientError> {
    loop {
        let text = next_text(ws_stream).await?;
        match parse_engine_packet(&text)? {
            EnginePacket::Open(open) => return Ok(open),
            EnginePacket::Close => {
                return Err(RelayClientError::Protocol("Relay closed during handshake".into()))
            }
            other => tracing::debug!(?other, "Ignoring packet before open"),
        }
    }
}

/// Wait for the Socket.IO `CONNECT` reply and return the socket id.
async fn read_connect_reply(ws_stream: &mut WsStream) -> Result<String, RelayClientError> {
    loop {
        let text = next_text(ws_stream).await?;
        match parse_engine_packet(&text)? {
            EnginePacket::Ping(data) => {
                ws_stream
                    .send(Message::Text(encode_pong(&data)))
                    .await
                    .map_err(|e| RelayClientError::Protocol(e.to_string()))?;
            }
            EnginePacket::Message(body) => {
                let packet = parse_socket_packet(&body)?;
                match packet.kind {
                    SocketPacketKind::Connect => {
                        return packet.connect_sid().map(str::to_string).ok_or_else(|| {
                            RelayClientError::Protocol("CONNECT reply without sid".into())
                        });
                    }
                    SocketPacketKind::ConnectError => {
                        return Err(RelayClientError::Rejected(
                            packet.error_message().unwrap_or_else(|| "unknown reason".into()),
                        ));
                    }
                    _ => tracing::debug!(kind = ?packet.kind, "Ignoring packet before connect"),
                }
            }
            EnginePacket::Close => {
                return Err(RelayClientError::Protocol("Relay closed during handshake".into()))
            }
            _ => {}
        }
    }
}

/// Next text frame, skipping control frames.
async fn next_text(ws_stream: &mut WsStream) -> Result<String, RelayClientError> {
    while let Some(msg) = ws_stream.next().await {
        match msg {
            Ok(Message::Text(text)) => return Ok(text),
            Ok(Message::Close(frame)) => {
                return Err(RelayClientError::Protocol(format!(
                    "Relay closed during handshake: {frame:?}"
                )))
            }
            Ok(_) => continue,
            Err(e) => return Err(RelayClientError::Protocol(e.to_string())),
        }
    }
    Err(RelayClientError::Protocol("Stream ended during handshake".into()))
}

/// Errors that can occur when connecting to the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayClientError {
    /// Failed to establish the WebSocket transport.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transport or handshake did not complete in time.
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// The relay refused the namespace connection.
    #[error("Connection rejected: {0}")]
    Rejected(String),

    /// A protocol-level error on an established transport.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A frame could not be decoded.
    #[error(transparent)]
    Packet(#[from] crate::packet::PacketError),
}
