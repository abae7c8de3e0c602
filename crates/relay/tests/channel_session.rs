//! Integration tests for `ChannelSession` against an in-process relay.
//!
//! Covers the handshake, completion event delivery (JSON and binary
//! attachments), heartbeats, bounded reconnection, manual reconnect and
//! teardown.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use enhance_core::session::ConnectionStatus;
use enhance_relay::events::{ChannelEvent, DisconnectReason, Subscription};
use enhance_relay::session::ChannelSession;
use serde_json::json;

use common::FakeRelay;

const WAIT: Duration = Duration::from_secs(5);

async fn wait_for_status(channel: &ChannelSession, status: ConnectionStatus) {
    let mut rx = channel.watch_session();
    tokio::time::timeout(WAIT, rx.wait_for(|s| s.status == status))
        .await
        .expect("status change timed out")
        .expect("session sender dropped");
}

async fn wait_for_event(
    lifecycle: &mut Subscription<ChannelEvent>,
    mut matches: impl FnMut(&ChannelEvent) -> bool,
) -> ChannelEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = lifecycle.recv().await.expect("lifecycle closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("lifecycle event timed out")
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_assigns_session_id() {
    let relay = FakeRelay::start().await;
    let channel = ChannelSession::connect(relay.config(5));
    let mut lifecycle = channel.lifecycle();

    let socket = relay.accept().await;
    let id = channel.wait_for_session_id(WAIT).await;

    assert_eq!(id.as_deref(), Some(socket.sid.as_str()));
    assert_eq!(channel.session().status, ConnectionStatus::Connected);

    let event = wait_for_event(&mut lifecycle, |e| matches!(e, ChannelEvent::Connected { .. })).await;
    assert_eq!(event, ChannelEvent::Connected { session_id: socket.sid.clone() });

    channel.teardown().await;
}

// ---------------------------------------------------------------------------
// Completion delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn json_completion_event_is_delivered() {
    let relay = FakeRelay::start().await;
    let channel = ChannelSession::connect(relay.config(5));
    let mut completions = channel.on_completion();

    let socket = relay.accept().await;
    channel.wait_for_session_id(WAIT).await.unwrap();

    socket.emit("chat", json!("ignored"));
    socket.emit(
        "enhanceAudioComplete",
        json!({"audioFile": {"type": "Buffer", "data": [1, 2, 3]}, "publisher": socket.sid}),
    );

    let event = tokio::time::timeout(WAIT, completions.recv()).await.unwrap().unwrap();
    assert_eq!(event.session_id, socket.sid);
    assert_eq!(event.raw.publisher(), Some(socket.sid.as_str()));
    assert!(event.raw.attachments.is_empty());
    assert_eq!(event.raw.data["audioFile"]["data"], json!([1, 2, 3]));

    channel.teardown().await;
}

#[tokio::test]
async fn binary_completion_event_is_reassembled() {
    let relay = FakeRelay::start().await;
    let channel = ChannelSession::connect(relay.config(5));
    let mut completions = channel.on_completion();

    let socket = relay.accept().await;
    channel.wait_for_session_id(WAIT).await.unwrap();

    socket.send_text(
        r#"451-["enhanceAudioComplete",{"audioFile":{"_placeholder":true,"num":0}}]"#,
    );
    socket.send_binary(vec![0xFF, 0xFB, 0x90, 0x00]);

    let event = tokio::time::timeout(WAIT, completions.recv()).await.unwrap().unwrap();
    assert_eq!(event.raw.attachments, vec![vec![0xFF, 0xFB, 0x90, 0x00]]);
    assert_eq!(event.raw.data["audioFile"]["_placeholder"], true);

    channel.teardown().await;
}

#[tokio::test]
async fn malformed_frames_do_not_drop_the_connection() {
    let relay = FakeRelay::start().await;
    let channel = ChannelSession::connect(relay.config(5));
    let mut completions = channel.on_completion();

    let socket = relay.accept().await;
    channel.wait_for_session_id(WAIT).await.unwrap();

    socket.send_text("42[not json");
    socket.send_text("x");
    socket.emit("enhanceAudioComplete", json!({"audioFile": [5]}));

    let event = tokio::time::timeout(WAIT, completions.recv()).await.unwrap().unwrap();
    assert_eq!(event.raw.data["audioFile"], json!([5]));
    assert_eq!(channel.session().status, ConnectionStatus::Connected);

    channel.teardown().await;
}

#[tokio::test]
async fn oversized_attachment_count_is_rejected() {
    let relay = FakeRelay::start().await;
    let channel = ChannelSession::connect(relay.config(5));
    let mut completions = channel.on_completion();
    let mut lifecycle = channel.lifecycle();

    let socket = relay.accept().await;
    channel.wait_for_session_id(WAIT).await.unwrap();

    socket.send_text(r#"451000000000000000000-["enhanceAudioComplete",{}]"#);
    socket.send_text(r#"4599-["enhanceAudioComplete",{}]"#);
    socket.emit("enhanceAudioComplete", json!({"audioFile": [7]}));

    let event = tokio::time::timeout(WAIT, completions.recv()).await.unwrap().unwrap();
    assert_eq!(event.raw.data["audioFile"], json!([7]));
    assert_eq!(channel.session().status, ConnectionStatus::Connected);

    // The connection task is still alive and notices the socket going away.
    drop(socket);
    wait_for_event(&mut lifecycle, |e| {
        matches!(e, ChannelEvent::Disconnected { reason: DisconnectReason::TransportClose })
    })
    .await;
    let second = relay.accept().await;
    let id = tokio::time::timeout(WAIT, async {
        loop {
            if let Some(id) = channel.current_session_id() {
                if id == second.sid {
                    return id;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session should move to the new socket");
    assert_eq!(id, "sock-2");

    channel.teardown().await;
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let relay = FakeRelay::start().await;
    let channel = ChannelSession::connect(relay.config(5));

    let mut socket = relay.accept().await;
    socket.send_text("2");

    assert_eq!(socket.next_client_text().await.as_deref(), Some("3"));
    channel.teardown().await;
}

#[tokio::test]
async fn silent_relay_times_out_and_reconnects() {
    let relay = FakeRelay::start_with_heartbeat(50, 50).await;
    let channel = ChannelSession::connect(relay.config(5));
    let mut lifecycle = channel.lifecycle();

    let _first = relay.accept().await;
    let event = wait_for_event(&mut lifecycle, |e| matches!(e, ChannelEvent::Disconnected { .. })).await;
    assert_eq!(event, ChannelEvent::Disconnected { reason: DisconnectReason::PingTimeout });

    let second = relay.accept().await;
    assert_eq!(second.sid, "sock-2");
    channel.teardown().await;
}

// ---------------------------------------------------------------------------
// Reconnection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transport_drop_reconnects_with_new_session_id() {
    let relay = FakeRelay::start().await;
    let channel = ChannelSession::connect(relay.config(5));
    let mut lifecycle = channel.lifecycle();

    let first = relay.accept().await;
    let first_id = channel.wait_for_session_id(WAIT).await.unwrap();
    assert_eq!(first_id, first.sid);
    drop(first);

    wait_for_event(&mut lifecycle, |e| {
        matches!(e, ChannelEvent::Disconnected { reason: DisconnectReason::TransportClose })
    })
    .await;
    wait_for_event(&mut lifecycle, |e| matches!(e, ChannelEvent::ReconnectAttempt { attempt: 1 })).await;

    let second = relay.accept().await;
    let event = wait_for_event(&mut lifecycle, |e| matches!(e, ChannelEvent::Reconnected { .. })).await;
    assert_matches!(event, ChannelEvent::Reconnected { session_id, attempt: 1 } if session_id == second.sid);

    wait_for_status(&channel, ConnectionStatus::Connected).await;
    let second_id = channel.current_session_id().unwrap();
    assert_ne!(second_id, first_id);

    channel.teardown().await;
}

#[tokio::test]
async fn server_disconnect_is_not_retried() {
    let relay = FakeRelay::start().await;
    let channel = ChannelSession::connect(relay.config(5));

    let socket = relay.accept().await;
    channel.wait_for_session_id(WAIT).await.unwrap();
    socket.send_text("41");

    wait_for_status(&channel, ConnectionStatus::Disconnected).await;
    assert!(relay.try_accept(Duration::from_millis(200)).await.is_none());
    assert_eq!(channel.current_session_id(), None);

    channel.teardown().await;
}

#[tokio::test]
async fn exhausted_retries_end_disconnected_until_manual_reconnect() {
    let relay = FakeRelay::start().await;
    let channel = ChannelSession::connect(relay.config(2));
    let mut lifecycle = channel.lifecycle();

    let socket = relay.accept().await;
    channel.wait_for_session_id(WAIT).await.unwrap();

    relay.set_accepting(false);
    drop(socket);

    let event = wait_for_event(&mut lifecycle, |e| matches!(e, ChannelEvent::ReconnectFailed { .. })).await;
    assert_eq!(event, ChannelEvent::ReconnectFailed { attempts: 2 });
    wait_for_status(&channel, ConnectionStatus::Disconnected).await;
    assert_eq!(channel.current_session_id(), None);

    relay.set_accepting(true);
    // The task may still be winding down right after the status flip.
    tokio::time::timeout(WAIT, async {
        while !channel.reconnect().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("manual reconnect should be accepted");
    let socket = relay.accept().await;
    let id = channel.wait_for_session_id(WAIT).await;
    assert_eq!(id.as_deref(), Some(socket.sid.as_str()));

    channel.teardown().await;
}

#[tokio::test]
async fn reconnect_is_refused_while_connected() {
    let relay = FakeRelay::start().await;
    let channel = ChannelSession::connect(relay.config(5));
    let _socket = relay.accept().await;
    channel.wait_for_session_id(WAIT).await.unwrap();

    assert!(!channel.reconnect().await);
    channel.teardown().await;
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn teardown_releases_the_connection() {
    let relay = FakeRelay::start().await;
    let channel = ChannelSession::connect(relay.config(5));
    let mut socket = relay.accept().await;
    channel.wait_for_session_id(WAIT).await.unwrap();

    channel.teardown().await;

    assert_eq!(socket.next_client_text().await.as_deref(), Some("41"));
    assert_eq!(channel.session().status, ConnectionStatus::Disconnected);
    assert!(relay.try_accept(Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn dropping_the_session_releases_the_connection() {
    let relay = FakeRelay::start().await;
    let channel = ChannelSession::connect(relay.config(5));
    let mut socket = relay.accept().await;
    channel.wait_for_session_id(WAIT).await.unwrap();

    drop(channel);

    assert_eq!(socket.next_client_text().await.as_deref(), Some("41"));
}
