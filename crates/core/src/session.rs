//! Push-channel session as seen by the rest of the client.

use serde::Serialize;

/// Lifecycle of the push-channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
}

/// Snapshot of the push-channel session.
///
/// The id is assigned by the relay on every successful connect and is
/// only meaningful while [`ConnectionStatus::Connected`]; a reconnect may
/// issue a different one, so callers must read it fresh each time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: Option<String>,
    pub status: ConnectionStatus,
}

impl Session {
    pub fn connecting() -> Self {
        Self {
            id: None,
            status: ConnectionStatus::Connecting,
        }
    }

    pub fn connected(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            status: ConnectionStatus::Connected,
        }
    }

    pub fn reconnecting() -> Self {
        Self {
            id: None,
            status: ConnectionStatus::Reconnecting,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            id: None,
            status: ConnectionStatus::Disconnected,
        }
    }

    /// The session id, if the channel is currently connected.
    pub fn current_id(&self) -> Option<&str> {
        match self.status {
            ConnectionStatus::Connected => self.id.as_deref(),
            _ => None,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::disconnected()
    }
}
