//! Frame processing loop for a live relay connection.
//!
//! Reads frames from the WebSocket, answers heartbeats, reassembles
//! binary events from their attachment frames and publishes the
//! completion event. Returns when the connection ends, reporting why.

use enhance_core::artifact::RawCompletion;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::RelayConnection;
use crate::events::{CompletionEvent, DisconnectReason};
use crate::packet::{
    encode_disconnect, encode_pong, parse_engine_packet, parse_socket_packet, EnginePacket,
    SocketPacket, SocketPacketKind, DEFAULT_NAMESPACE,
};
use crate::session::SessionSignals;

/// A binary event waiting for its attachment frames.
struct PendingBinary {
    packet: SocketPacket,
    attachments: Vec<Vec<u8>>,
}

/// Outcome of handling one frame.
enum Flow {
    Continue,
    Stop(DisconnectReason),
}

/// Process frames until the connection ends or `cancel` fires.
pub(crate) async fn process_frames(
    conn: &mut RelayConnection,
    completion_event: &str,
    signals: &SessionSignals,
    cancel: &CancellationToken,
) -> DisconnectReason {
    let deadline = conn.heartbeat_deadline();
    let session_id = conn.session_id.clone();
    let mut pending: Option<PendingBinary> = None;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => None,
            next = tokio::time::timeout(deadline, conn.ws_stream.next()) => Some(next),
        };

        let Some(next) = next else {
            let _ = conn
                .ws_stream
                .send(Message::Text(encode_disconnect(DEFAULT_NAMESPACE)))
                .await;
            let _ = conn.ws_stream.close(None).await;
            return DisconnectReason::ClientClosed;
        };

        let msg = match next {
            Err(_) => {
                tracing::warn!(session_id = %session_id, ?deadline, "Relay heartbeat timed out");
                return DisconnectReason::PingTimeout;
            }
            Ok(None) => {
                tracing::info!(session_id = %session_id, "Relay stream exhausted");
                return DisconnectReason::TransportClose;
            }
            Ok(Some(Err(e))) => {
                tracing::error!(session_id = %session_id, error = %e, "WebSocket receive error");
                return DisconnectReason::TransportClose;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        let flow = match msg {
            Message::Text(text) => {
                handle_text(conn, &text, &mut pending, completion_event, signals).await
            }
            Message::Binary(data) => {
                handle_binary(&session_id, data, &mut pending, completion_event, signals);
                Flow::Continue
            }
            Message::Close(frame) => {
                tracing::info!(session_id = %session_id, ?frame, "Relay WebSocket closed");
                Flow::Stop(DisconnectReason::TransportClose)
            }
            // Ping/Pong are handled by tungstenite.
            _ => Flow::Continue,
        };

        if let Flow::Stop(reason) = flow {
            return reason;
        }
    }
}

/// Dispatch a single Engine.IO text frame.
async fn handle_text(
    conn: &mut RelayConnection,
    text: &str,
    pending: &mut Option<PendingBinary>,
    completion_event: &str,
    signals: &SessionSignals,
) -> Flow {
    let packet = match parse_engine_packet(text) {
        Ok(packet) => packet,
        Err(e) => {
            tracing::warn!(error = %e, raw_message = %text, "Failed to parse relay frame");
            return Flow::Continue;
        }
    };

    match packet {
        EnginePacket::Ping(data) => {
            tracing::trace!("Relay ping");
            if let Err(e) = conn.ws_stream.send(Message::Text(encode_pong(&data))).await {
                tracing::error!(error = %e, "Failed to answer relay ping");
                return Flow::Stop(DisconnectReason::TransportClose);
            }
            Flow::Continue
        }
        EnginePacket::Close => Flow::Stop(DisconnectReason::TransportClose),
        EnginePacket::Message(body) => match parse_socket_packet(&body) {
            Ok(packet) => handle_socket_packet(&conn.session_id, packet, pending, completion_event, signals),
            Err(e) => {
                tracing::warn!(error = %e, raw_message = %body, "Failed to parse Socket.IO packet");
                Flow::Continue
            }
        },
        EnginePacket::Open(_) | EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {
            Flow::Continue
        }
    }
}

fn handle_socket_packet(
    session_id: &str,
    packet: SocketPacket,
    pending: &mut Option<PendingBinary>,
    completion_event: &str,
    signals: &SessionSignals,
) -> Flow {
    match packet.kind {
        SocketPacketKind::Event => {
            dispatch_event(session_id, &packet, Vec::new(), completion_event, signals);
            Flow::Continue
        }
        SocketPacketKind::BinaryEvent if packet.attachments == 0 => {
            dispatch_event(session_id, &packet, Vec::new(), completion_event, signals);
            Flow::Continue
        }
        SocketPacketKind::BinaryEvent => {
            if pending.is_some() {
                tracing::warn!(session_id, "Binary event superseded before its attachments arrived");
            }
            *pending = Some(PendingBinary {
                attachments: Vec::new(),
                packet,
            });
            Flow::Continue
        }
        SocketPacketKind::Disconnect => {
            tracing::warn!(session_id, "Relay disconnected this socket");
            Flow::Stop(DisconnectReason::ServerDisconnect)
        }
        SocketPacketKind::ConnectError => {
            tracing::warn!(
                session_id,
                error = %packet.error_message().unwrap_or_default(),
                "Relay reported a connect error",
            );
            Flow::Continue
        }
        SocketPacketKind::Connect | SocketPacketKind::Ack | SocketPacketKind::BinaryAck => {
            tracing::debug!(session_id, kind = ?packet.kind, "Ignoring Socket.IO packet");
            Flow::Continue
        }
    }
}

/// Attach a binary frame to the pending event, dispatching it once complete.
fn handle_binary(
    session_id: &str,
    data: Vec<u8>,
    pending: &mut Option<PendingBinary>,
    completion_event: &str,
    signals: &SessionSignals,
) {
    let Some(waiting) = pending.as_mut() else {
        tracing::debug!(session_id, bytes = data.len(), "Ignoring unexpected binary frame");
        return;
    };

    waiting.attachments.push(data);
    if waiting.attachments.len() < waiting.packet.attachments {
        return;
    }

    if let Some(done) = pending.take() {
        dispatch_event(session_id, &done.packet, done.attachments, completion_event, signals);
    }
}

fn dispatch_event(
    session_id: &str,
    packet: &SocketPacket,
    attachments: Vec<Vec<u8>>,
    completion_event: &str,
    signals: &SessionSignals,
) {
    let Some(name) = packet.event_name() else {
        tracing::warn!(session_id, "Event packet without a name");
        return;
    };

    if name != completion_event {
        tracing::debug!(session_id, event = name, "Ignoring relay event");
        return;
    }

    let data = packet
        .event_args()
        .first()
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    tracing::info!(
        session_id,
        attachments = attachments.len(),
        "Completion event received",
    );
    signals.emit_completion(CompletionEvent::new(
        session_id,
        RawCompletion::new(data, attachments),
    ));
}
