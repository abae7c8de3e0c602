//! Bounded, fixed-delay reconnection for the relay connection.
//!
//! When the connection drops, the session task calls
//! [`reconnect_loop`], which waits a fixed delay before each attempt and
//! gives up after [`ReconnectConfig::max_attempts`]. Giving up is not an
//! error: the session simply ends up `Disconnected`.

use std::time::Duration;

use enhance_core::session::Session;
use tokio_util::sync::CancellationToken;

use crate::client::{RelayClient, RelayConnection};
use crate::events::ChannelEvent;
use crate::session::SessionSignals;

/// Default number of reconnection attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay between attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

/// Tunable parameters for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Whether to reconnect at all after a drop.
    pub enabled: bool,
    /// Attempts made before giving up.
    pub max_attempts: u32,
    /// Fixed wait before every attempt (no backoff growth).
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

/// Try to reconnect up to `max_attempts` times.
///
/// Returns the new connection and the attempt number that succeeded, or
/// `None` if attempts ran out or `cancel` fired.
pub(crate) async fn reconnect_loop(
    client: &RelayClient,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
    signals: &SessionSignals,
) -> Option<(RelayConnection, u32)> {
    if !config.enabled {
        return None;
    }

    for attempt in 1..=config.max_attempts {
        signals.set_session(Session::reconnecting());

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Reconnect cancelled");
                return None;
            }
            _ = tokio::time::sleep(config.delay) => {}
        }

        tracing::info!(
            attempt,
            max_attempts = config.max_attempts,
            delay_ms = config.delay.as_millis() as u64,
            "Reconnecting to relay",
        );
        signals.emit(ChannelEvent::ReconnectAttempt { attempt });

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Reconnect cancelled");
                return None;
            }
            result = client.connect() => {
                match result {
                    Ok(conn) => {
                        tracing::info!(attempt, session_id = %conn.session_id, "Reconnected to relay");
                        return Some((conn, attempt));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Reconnect attempt {attempt} failed");
                        signals.emit(ChannelEvent::ConnectError { error: e.to_string() });
                    }
                }
            }
        }
    }

    tracing::warn!(attempts = config.max_attempts, "Giving up on relay reconnection");
    signals.emit(ChannelEvent::ReconnectFailed {
        attempts: config.max_attempts,
    });
    None
}
