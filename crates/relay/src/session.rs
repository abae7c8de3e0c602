//! Process-wide push-channel session.
//!
//! [`ChannelSession`] owns the relay connection for the lifetime of the
//! interactive client. [`ChannelSession::connect`] spawns a long-lived
//! task (connect -> process -> reconnect loop) and returns a handle that
//! exposes:
//!
//! * the current [`Session`] snapshot (id + connection status), via
//!   [`session`](ChannelSession::session) or a `watch` receiver;
//! * a typed [`Subscription`] for the completion event;
//! * a typed [`Subscription`] for lifecycle [`ChannelEvent`]s.
//!
//! The session only reports; it never touches job progress. Call
//! [`teardown`](ChannelSession::teardown) to release the connection.
//! Dropping the handle cancels the task as well.

use std::sync::Arc;
use std::time::Duration;

use enhance_core::session::Session;
use enhance_core::wire::DEFAULT_COMPLETION_EVENT;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::RelayClient;
use crate::events::{ChannelEvent, CompletionEvent, Subscription};
use crate::processor::process_frames;
use crate::reconnect::{reconnect_loop, ReconnectConfig};

/// Broadcast channel capacity for lifecycle and completion events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How long teardown waits for the connection task to exit.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on transport + handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Settings for the relay connection.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Relay base URL (`https://`, `http://`, `wss://` or `ws://`).
    pub url: String,
    /// Name of the event carrying the finished artifact.
    pub completion_event: String,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl RelayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            completion_event: DEFAULT_COMPLETION_EVENT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Senders shared between the handle and the connection task.
pub(crate) struct SessionSignals {
    session_tx: watch::Sender<Session>,
    lifecycle_tx: broadcast::Sender<ChannelEvent>,
    completion_tx: broadcast::Sender<CompletionEvent>,
}

impl SessionSignals {
    pub(crate) fn new() -> Self {
        let (session_tx, _) = watch::channel(Session::connecting());
        let (lifecycle_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (completion_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session_tx,
            lifecycle_tx,
            completion_tx,
        }
    }

    pub(crate) fn session(&self) -> Session {
        self.session_tx.borrow().clone()
    }

    pub(crate) fn set_session(&self, session: Session) {
        self.session_tx.send_replace(session);
    }

    pub(crate) fn emit(&self, event: ChannelEvent) {
        // No receivers is fine.
        let _ = self.lifecycle_tx.send(event);
    }

    pub(crate) fn emit_completion(&self, event: CompletionEvent) {
        if self.completion_tx.send(event).is_err() {
            tracing::warn!("Completion event received with no subscriber");
        }
    }

    pub(crate) fn subscribe_lifecycle(&self) -> Subscription<ChannelEvent> {
        Subscription::new(self.lifecycle_tx.subscribe())
    }
}

/// Handle to the push-channel connection.
pub struct ChannelSession {
    config: Arc<RelayConfig>,
    signals: Arc<SessionSignals>,
    /// Master cancellation token -- cancelled on teardown or drop.
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelSession {
    /// Open the push channel and keep it alive in a background task.
    ///
    /// Must be called from within a tokio runtime. The returned session
    /// starts out `Connecting`; failures end in `Disconnected`, never in
    /// an error.
    pub fn connect(config: RelayConfig) -> Self {
        let config = Arc::new(config);
        let signals = Arc::new(SessionSignals::new());
        let cancel = CancellationToken::new();
        let handle = spawn_connection(&config, &signals, &cancel);

        Self {
            config,
            signals,
            cancel,
            task: Mutex::new(Some(handle)),
        }
    }

    /// Current session snapshot.
    pub fn session(&self) -> Session {
        self.signals.session()
    }

    /// The relay-assigned id, absent before the first connect and while
    /// not connected.
    pub fn current_session_id(&self) -> Option<String> {
        self.signals.session().current_id().map(str::to_string)
    }

    /// Receiver that observes every session change.
    pub fn watch_session(&self) -> watch::Receiver<Session> {
        self.signals.session_tx.subscribe()
    }

    /// Subscribe to completion events.
    pub fn on_completion(&self) -> Subscription<CompletionEvent> {
        Subscription::new(self.signals.completion_tx.subscribe())
    }

    /// Subscribe to connection lifecycle signals.
    pub fn lifecycle(&self) -> Subscription<ChannelEvent> {
        self.signals.subscribe_lifecycle()
    }

    /// Wait until a session id is available, up to `timeout`.
    pub async fn wait_for_session_id(&self, timeout: Duration) -> Option<String> {
        let mut rx = self.watch_session();
        let wait = async {
            loop {
                if let Some(id) = rx.borrow_and_update().current_id() {
                    return Some(id.to_string());
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }

    /// Restart the connection after it ended in `Disconnected`.
    ///
    /// Returns `false` if a connection task is still running or the
    /// session has been torn down.
    pub async fn reconnect(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let mut slot = self.task.lock().await;
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        tracing::info!(url = %self.config.url, "Manual relay reconnect");
        *slot = Some(spawn_connection(&self.config, &self.signals, &self.cancel));
        true
    }

    /// Release the connection and wait (bounded) for the task to exit.
    pub async fn teardown(&self) {
        tracing::info!("Tearing down relay session");
        self.cancel.cancel();

        if let Some(handle) = self.task.lock().await.take() {
            let _ = tokio::time::timeout(TEARDOWN_TIMEOUT, handle).await;
        }
        self.signals.set_session(Session::disconnected());
        tracing::info!("Relay session torn down");
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn the long-lived connection task.
fn spawn_connection(
    config: &Arc<RelayConfig>,
    signals: &Arc<SessionSignals>,
    cancel: &CancellationToken,
) -> JoinHandle<()> {
    let config = Arc::clone(config);
    let signals = Arc::clone(signals);
    let cancel = cancel.clone();

    tokio::spawn(async move {
        tracing::info!(url = %config.url, "Starting relay connection task");
        let client = RelayClient::new(config.url.clone(), config.connect_timeout);
        run_connection_loop(&client, &config, &signals, &cancel).await;
        signals.set_session(Session::disconnected());
        tracing::info!("Relay connection task exited");
    })
}

/// Core connection loop: connect -> process frames -> reconnect.
///
/// Runs until cancelled, the relay disconnects the socket, or
/// reconnection attempts run out.
async fn run_connection_loop(
    client: &RelayClient,
    config: &RelayConfig,
    signals: &SessionSignals,
    cancel: &CancellationToken,
) {
    signals.set_session(Session::connecting());

    let first = tokio::select! {
        _ = cancel.cancelled() => return,
        result = client.connect() => result,
    };

    let mut conn = match first {
        Ok(conn) => {
            signals.emit(ChannelEvent::Connected {
                session_id: conn.session_id.clone(),
            });
            conn
        }
        Err(e) => {
            tracing::warn!(error = %e, "Relay connection failed, entering reconnect loop");
            signals.emit(ChannelEvent::ConnectError { error: e.to_string() });
            match reconnect_loop(client, &config.reconnect, cancel, signals).await {
                Some((conn, attempt)) => {
                    signals.emit(ChannelEvent::Reconnected {
                        session_id: conn.session_id.clone(),
                        attempt,
                    });
                    conn
                }
                None => return,
            }
        }
    };

    loop {
        signals.set_session(Session::connected(conn.session_id.clone()));

        let reason = process_frames(&mut conn, &config.completion_event, signals, cancel).await;

        tracing::info!(session_id = %conn.session_id, ?reason, "Relay connection ended");
        signals.set_session(Session::disconnected());
        signals.emit(ChannelEvent::Disconnected { reason });

        if cancel.is_cancelled() || !reason.should_reconnect() {
            return;
        }

        conn = match reconnect_loop(client, &config.reconnect, cancel, signals).await {
            Some((conn, attempt)) => {
                signals.emit(ChannelEvent::Reconnected {
                    session_id: conn.session_id.clone(),
                    attempt,
                });
                conn
            }
            None => return,
        };
    }
}
