//! Engine.IO v4 and Socket.IO v5 packet codec.
//!
//! Every WebSocket text frame is one Engine.IO packet: a single type
//! digit followed by an optional payload. Engine.IO `message` packets
//! carry a Socket.IO packet, laid out as
//!
//! ```text
//! <type>[<attachments>-][<namespace>,][<ack id>][<json>]
//! ```
//!
//! Binary attachments of a `BINARY_EVENT` arrive as the next N binary
//! WebSocket frames, referenced from the JSON by
//! `{"_placeholder": true, "num": i}`.

use serde::Deserialize;
use serde_json::Value;

/// Default Socket.IO namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Engine.IO protocol revision requested in the handshake URL.
pub const ENGINE_IO_VERSION: u8 = 4;

/// Largest attachment count accepted on a binary packet.
pub const MAX_ATTACHMENTS: usize = 64;

/// A decoded Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    /// Handshake data sent by the server right after the upgrade.
    Open(OpenData),
    /// The server is closing the transport.
    Close,
    /// Heartbeat probe; must be answered with a pong carrying the same data.
    Ping(String),
    Pong(String),
    /// A Socket.IO packet, still encoded.
    Message(String),
    Upgrade,
    Noop,
}

/// Payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenData {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// Socket.IO packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl SocketPacketKind {
    fn from_digit(c: char) -> Result<Self, PacketError> {
        match c {
            '0' => Ok(Self::Connect),
            '1' => Ok(Self::Disconnect),
            '2' => Ok(Self::Event),
            '3' => Ok(Self::Ack),
            '4' => Ok(Self::ConnectError),
            '5' => Ok(Self::BinaryEvent),
            '6' => Ok(Self::BinaryAck),
            other => Err(PacketError::UnknownType(other)),
        }
    }

    /// Whether this packet type is followed by binary attachment frames.
    pub fn is_binary(self) -> bool {
        matches!(self, Self::BinaryEvent | Self::BinaryAck)
    }
}

/// A decoded Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub kind: SocketPacketKind,
    pub namespace: String,
    /// Number of binary frames that follow (binary packet types only).
    pub attachments: usize,
    pub ack_id: Option<u64>,
    pub data: Option<Value>,
}

impl SocketPacket {
    /// Event name for `EVENT` / `BINARY_EVENT` packets.
    pub fn event_name(&self) -> Option<&str> {
        match self.kind {
            SocketPacketKind::Event | SocketPacketKind::BinaryEvent => self
                .data
                .as_ref()
                .and_then(Value::as_array)
                .and_then(|args| args.first())
                .and_then(Value::as_str),
            _ => None,
        }
    }

    /// Event arguments after the name.
    pub fn event_args(&self) -> &[Value] {
        match self.data.as_ref().and_then(Value::as_array) {
            Some(args) if !args.is_empty() => &args[1..],
            _ => &[],
        }
    }

    /// Socket id carried by a `CONNECT` reply.
    pub fn connect_sid(&self) -> Option<&str> {
        match self.kind {
            SocketPacketKind::Connect => self
                .data
                .as_ref()
                .and_then(|d| d.get("sid"))
                .and_then(Value::as_str),
            _ => None,
        }
    }

    /// Human-readable message carried by a `CONNECT_ERROR`.
    pub fn error_message(&self) -> Option<String> {
        match (&self.kind, &self.data) {
            (SocketPacketKind::ConnectError, Some(Value::String(s))) => Some(s.clone()),
            (SocketPacketKind::ConnectError, Some(d)) => d
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }
}

/// Errors produced while decoding a packet.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("Empty packet")]
    Empty,

    #[error("Unknown packet type '{0}'")]
    UnknownType(char),

    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse one Engine.IO text frame.
pub fn parse_engine_packet(text: &str) -> Result<EnginePacket, PacketError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(PacketError::Empty)?;
    let rest = chars.as_str();

    match kind {
        '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(rest.to_string())),
        '3' => Ok(EnginePacket::Pong(rest.to_string())),
        '4' => Ok(EnginePacket::Message(rest.to_string())),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(PacketError::UnknownType(other)),
    }
}

/// Parse the Socket.IO packet carried inside an Engine.IO message.
pub fn parse_socket_packet(text: &str) -> Result<SocketPacket, PacketError> {
    let mut chars = text.chars();
    let kind = SocketPacketKind::from_digit(chars.next().ok_or(PacketError::Empty)?)?;
    let mut rest = chars.as_str();

    let mut attachments = 0;
    if kind.is_binary() {
        let dash = rest
            .find('-')
            .ok_or_else(|| PacketError::Malformed("binary packet without attachment count".into()))?;
        attachments = rest[..dash]
            .parse()
            .map_err(|_| PacketError::Malformed(format!("bad attachment count {:?}", &rest[..dash])))?;
        if attachments > MAX_ATTACHMENTS {
            return Err(PacketError::Malformed(format!(
                "{attachments} attachments exceeds the limit of {MAX_ATTACHMENTS}"
            )));
        }
        rest = &rest[dash + 1..];
    }

    let mut namespace = DEFAULT_NAMESPACE.to_string();
    if rest.starts_with('/') {
        match rest.find(',') {
            Some(end) => {
                namespace = rest[..end].to_string();
                rest = &rest[end + 1..];
            }
            None => {
                namespace = rest.to_string();
                rest = "";
            }
        }
    }

    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let ack_id = if digits > 0 {
        Some(
            rest[..digits]
                .parse()
                .map_err(|_| PacketError::Malformed("ack id out of range".into()))?,
        )
    } else {
        None
    };
    rest = &rest[digits..];

    let data = if rest.is_empty() {
        None
    } else {
        Some(serde_json::from_str(rest)?)
    };

    Ok(SocketPacket {
        kind,
        namespace,
        attachments,
        ack_id,
        data,
    })
}

/// Engine.IO pong answering a ping with the same payload.
pub fn encode_pong(data: &str) -> String {
    format!("3{data}")
}

/// Socket.IO connect request for a namespace, wrapped in an Engine.IO message.
pub fn encode_connect(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE {
        "40".to_string()
    } else {
        format!("40{namespace},")
    }
}

/// Socket.IO disconnect notice, wrapped in an Engine.IO message.
pub fn encode_disconnect(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE {
        "41".to_string()
    } else {
        format!("41{namespace},")
    }
}
