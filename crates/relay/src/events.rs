//! Events published by [`ChannelSession`](crate::session::ChannelSession).
//!
//! Lifecycle signals are informational: they are logged and surfaced to
//! whoever subscribes, but only the session snapshot changes as a result.
//! The completion event is the one payload-carrying event the client
//! cares about.

use chrono::Utc;
use enhance_core::artifact::RawCompletion;
use enhance_core::types::Timestamp;
use serde::Serialize;
use tokio::sync::broadcast;

/// Connection lifecycle signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// First successful connection; the relay assigned `session_id`.
    Connected { session_id: String },

    /// A connection attempt failed.
    ConnectError { error: String },

    /// A reconnection attempt is about to be made (1-based).
    ReconnectAttempt { attempt: u32 },

    /// A reconnection attempt succeeded with a (possibly new) session id.
    Reconnected { session_id: String, attempt: u32 },

    /// The live connection dropped.
    Disconnected { reason: DisconnectReason },

    /// All reconnection attempts were used up; the session is unusable
    /// until [`reconnect`](crate::session::ChannelSession::reconnect).
    ReconnectFailed { attempts: u32 },
}

/// Why a live connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The relay closed the transport or the socket errored.
    TransportClose,
    /// No heartbeat within `pingInterval + pingTimeout`.
    PingTimeout,
    /// The relay explicitly disconnected this socket; not retried.
    ServerDisconnect,
    /// Local teardown.
    ClientClosed,
}

impl DisconnectReason {
    /// Whether automatic reconnection applies.
    pub fn should_reconnect(self) -> bool {
        matches!(self, Self::TransportClose | Self::PingTimeout)
    }
}

/// A completion event received on the relay.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    /// Session the event arrived on.
    pub session_id: String,
    pub raw: RawCompletion,
    pub received_at: Timestamp,
}

impl CompletionEvent {
    pub fn new(session_id: impl Into<String>, raw: RawCompletion) -> Self {
        Self {
            session_id: session_id.into(),
            raw,
            received_at: Utc::now(),
        }
    }
}

/// A typed subscription to one kind of event.
///
/// Dropping the subscription cancels it.
pub struct Subscription<T> {
    rx: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    pub fn new(rx: broadcast::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Wait for the next event. Returns `None` once the publisher is gone.
    ///
    /// A slow subscriber that lagged behind skips the dropped events.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll for an already buffered event.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
