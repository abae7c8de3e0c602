//! In-process stand-in for the hosted push relay.
//!
//! Speaks just enough Engine.IO / Socket.IO over an axum WebSocket to
//! complete the handshake, then hands every accepted socket to the test
//! as a [`FakeSocket`] that can push frames and read what the client sent.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::sync::{mpsc, Mutex};

use enhance_relay::reconnect::ReconnectConfig;
use enhance_relay::session::RelayConfig;

/// Frames the test pushes to the client.
enum Outgoing {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// One accepted, handshaken relay socket.
pub struct FakeSocket {
    pub sid: String,
    out: mpsc::UnboundedSender<Outgoing>,
    incoming: mpsc::UnboundedReceiver<String>,
}

impl FakeSocket {
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.out.send(Outgoing::Text(text.into()));
    }

    pub fn send_binary(&self, data: Vec<u8>) {
        let _ = self.out.send(Outgoing::Binary(data));
    }

    /// Emit a Socket.IO event with a JSON argument.
    pub fn emit(&self, event: &str, payload: serde_json::Value) {
        self.send_text(format!("42{}", serde_json::json!([event, payload])));
    }

    /// Close the WebSocket cleanly from the relay side.
    pub fn close(self) {
        let _ = self.out.send(Outgoing::Close);
    }

    /// Next text frame the client sent after the handshake.
    pub async fn next_client_text(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.incoming.recv())
            .await
            .ok()
            .flatten()
    }
}

struct RelayState {
    next_id: AtomicUsize,
    accepting: AtomicBool,
    ping_interval_ms: u64,
    ping_timeout_ms: u64,
    sockets: mpsc::UnboundedSender<FakeSocket>,
}

/// A running fake relay.
pub struct FakeRelay {
    pub url: String,
    state: Arc<RelayState>,
    sockets: Mutex<mpsc::UnboundedReceiver<FakeSocket>>,
}

impl FakeRelay {
    pub async fn start() -> Self {
        Self::start_with_heartbeat(25_000, 20_000).await
    }

    pub async fn start_with_heartbeat(ping_interval_ms: u64, ping_timeout_ms: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(RelayState {
            next_id: AtomicUsize::new(1),
            accepting: AtomicBool::new(true),
            ping_interval_ms,
            ping_timeout_ms,
            sockets: tx,
        });

        let app = Router::new()
            .route("/socket.io/", get(upgrade))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            state,
            sockets: Mutex::new(rx),
        }
    }

    /// Refuse (or accept again) new WebSocket upgrades.
    pub fn set_accepting(&self, accepting: bool) {
        self.state.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Wait for the next handshaken socket.
    pub async fn accept(&self) -> FakeSocket {
        self.try_accept(Duration::from_secs(5))
            .await
            .expect("client should connect to the relay")
    }

    pub async fn try_accept(&self, timeout: Duration) -> Option<FakeSocket> {
        let mut rx = self.sockets.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Relay config pointing at this server with fast retries.
    pub fn config(&self, max_attempts: u32) -> RelayConfig {
        let mut config = RelayConfig::new(self.url.clone());
        config.connect_timeout = Duration::from_secs(2);
        config.reconnect = ReconnectConfig {
            max_attempts,
            delay: Duration::from_millis(20),
            ..Default::default()
        };
        config
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<RelayState>>) -> Response {
    if !state.accepting.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: Arc<RelayState>) {
    let n = state.next_id.fetch_add(1, Ordering::SeqCst);
    let open = serde_json::json!({
        "sid": format!("eio-{n}"),
        "upgrades": [],
        "pingInterval": state.ping_interval_ms,
        "pingTimeout": state.ping_timeout_ms,
        "maxPayload": 1_000_000,
    });
    if socket.send(Message::Text(format!("0{open}").into())).await.is_err() {
        return;
    }

    // Wait for the namespace connect.
    loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) if text.as_str() == "40" => break,
            Some(Ok(_)) => continue,
            _ => return,
        }
    }

    let sid = format!("sock-{n}");
    let reply = format!("40{}", serde_json::json!({ "sid": sid }));
    if socket.send(Message::Text(reply.into())).await.is_err() {
        return;
    }

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let _ = state.sockets.send(FakeSocket {
        sid,
        out: out_tx,
        incoming: in_rx,
    });

    loop {
        tokio::select! {
            outgoing = out_rx.recv() => match outgoing {
                Some(Outgoing::Text(text)) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Some(Outgoing::Binary(data)) => {
                    if socket.send(Message::Binary(data.into())).await.is_err() {
                        return;
                    }
                }
                Some(Outgoing::Close) => {
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                }
                // Test dropped the socket: cut the transport.
                None => return,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = in_tx.send(text.to_string());
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            },
        }
    }
}
