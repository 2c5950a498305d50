use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tonearm_common::{GuildId, NodeId};

use super::*;
use crate::protocol::{IncomingMessage, OutgoingCommand};

fn config(url: &str) -> NodeConfig {
    NodeConfig {
        id: NodeId::from("test"),
        url: url.to_string(),
        password: "secret".into(),
        region: Some("europe".into()),
        user_id: "1001".into(),
        shard_count: 2,
    }
}

fn detached() -> (Arc<NodeConnection>, mpsc::Receiver<NodeEvent>) {
    NodeConnection::new(config("ws://127.0.0.1:1"), 64)
}

async fn next_event(rx: &mut mpsc::Receiver<NodeEvent>) -> NodeEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for node event")
        .expect("event channel closed")
}

#[tokio::test]
async fn stats_frame_updates_snapshot_instead_of_forwarding() {
    let (node, mut events) = detached();
    node.on_message(r#"{"op":"stats","players":7,"playingPlayers":3}"#)
        .await;

    assert!(matches!(next_event(&mut events).await, NodeEvent::Stats(s) if s.players == 7));
    assert_eq!(node.stats().await.playing_players, 3);
    assert_eq!(node.snapshot().await.players, 7);
}

#[tokio::test]
async fn guild_frames_are_forwarded_as_messages() {
    let (node, mut events) = detached();
    node.on_message(r#"{"op":"playerUpdate","guildId":"9","state":{"position":5,"time":6}}"#)
        .await;

    let NodeEvent::Message(msg) = next_event(&mut events).await else {
        panic!("expected message");
    };
    assert!(matches!(msg, IncomingMessage::PlayerUpdate { .. }));
}

#[tokio::test]
async fn malformed_frame_reports_error_and_keeps_going() {
    let (node, mut events) = detached();
    node.on_message("definitely not json").await;
    node.on_message(r#"{"op":"unheardOf"}"#).await;

    assert!(matches!(next_event(&mut events).await, NodeEvent::Error(_)));
    assert!(matches!(next_event(&mut events).await, NodeEvent::Error(_)));
    assert_eq!(node.stats().await.players, 0);
}

#[tokio::test]
async fn send_while_disconnected_is_dropped_with_error() {
    let (node, mut events) = detached();
    let sent = node
        .send(&OutgoingCommand::Stop {
            guild_id: GuildId::from("9"),
        })
        .await;
    assert!(!sent);

    let NodeEvent::Error(msg) = next_event(&mut events).await else {
        panic!("expected error");
    };
    assert!(msg.contains("stop"));
    assert!(msg.contains("not connected"));
}

#[tokio::test]
async fn send_while_connected_writes_json_frame() {
    let (node, _events) = detached();
    let mut wire = node.attach_for_test().await;

    let sent = node
        .send(&OutgoingCommand::Seek {
            guild_id: GuildId::from("9"),
            position: 42,
        })
        .await;
    assert!(sent);

    let frame: serde_json::Value = serde_json::from_str(&wire.recv().await.unwrap()).unwrap();
    assert_eq!(
        frame,
        serde_json::json!({"op": "seek", "guildId": "9", "position": 42})
    );
}

#[tokio::test]
async fn drain_flag_shows_in_snapshot() {
    let (node, _events) = detached();
    assert!(!node.is_draining().await);
    node.set_draining(true).await;
    let snap = node.snapshot().await;
    assert!(snap.draining);
    assert!(!snap.connected);
    assert_eq!(snap.region.as_deref(), Some("europe"));
}

#[tokio::test]
async fn handshake_request_carries_identity_headers() {
    let request = config("ws://node.internal:2333").handshake_request().unwrap();
    let headers = request.headers();
    assert_eq!(headers["authorization"], "secret");
    assert_eq!(headers["num-shards"], "2");
    assert_eq!(headers["user-id"], "1001");
    assert!(headers["client-name"].to_str().unwrap().starts_with("tonearm/"));
}

#[tokio::test]
async fn bad_header_value_is_a_handshake_error() {
    let mut cfg = config("ws://node.internal:2333");
    cfg.password = "line\nbreak".into();
    assert!(cfg.handshake_request().is_err());
}

type Captured = (Option<String>, Option<String>, Option<String>);

#[tokio::test]
async fn live_connection_round_trip_then_reconnect_is_armed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (hdr_tx, hdr_rx) = oneshot::channel::<Captured>();
    let (frame_tx, frame_rx) = oneshot::channel::<String>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let get = |name: &str| {
                req.headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let _ = hdr_tx.send((get("authorization"), get("num-shards"), get("user-id")));
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();

        let stats = r#"{"op":"stats","players":3,"playingPlayers":1}"#.to_string();
        ws.send(Message::Text(stats.into())).await.unwrap();
        let update =
            r#"{"op":"playerUpdate","guildId":"9","state":{"position":10,"time":20}}"#.to_string();
        ws.send(Message::Text(update.into())).await.unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let _ = frame_tx.send(text.as_str().to_string());
                break;
            }
        }
        let _ = ws.close(None).await;
    });

    let (node, mut events) = NodeConnection::new(config(&format!("ws://127.0.0.1:{port}")), 64);
    node.connect().await;

    assert!(matches!(next_event(&mut events).await, NodeEvent::Ready));
    assert!(node.is_connected().await);
    assert_eq!(node.retries().await, 0);

    let (auth, shards, user) = hdr_rx.await.unwrap();
    assert_eq!(auth.as_deref(), Some("secret"));
    assert_eq!(shards.as_deref(), Some("2"));
    assert_eq!(user.as_deref(), Some("1001"));

    assert!(matches!(next_event(&mut events).await, NodeEvent::Stats(s) if s.players == 3));
    assert!(matches!(
        next_event(&mut events).await,
        NodeEvent::Message(IncomingMessage::PlayerUpdate { .. })
    ));

    node.send(&OutgoingCommand::Stop {
        guild_id: GuildId::from("9"),
    })
    .await;
    let frame = tokio::time::timeout(Duration::from_secs(5), frame_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame, r#"{"op":"stop","guildId":"9"}"#);

    assert!(matches!(
        next_event(&mut events).await,
        NodeEvent::Disconnected { .. }
    ));
    assert!(matches!(
        node.reconnect_state().await,
        ReconnectState::Pending { attempt: 1, .. }
    ));
    assert_eq!(node.retries().await, 1);

    node.destroy().await;
    assert!(node.is_destroyed());
    assert_eq!(node.reconnect_state().await, ReconnectState::Idle);
    assert_eq!(node.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn full_event_channel_never_blocks_senders() {
    let (node, mut events) = NodeConnection::new(config("ws://127.0.0.1:1"), 1);
    let stop = OutgoingCommand::Stop {
        guild_id: GuildId::from("9"),
    };

    let sends = async {
        for _ in 0..4 {
            assert!(!node.send(&stop).await);
        }
    };
    tokio::time::timeout(Duration::from_secs(1), sends)
        .await
        .expect("send waited on a full event channel");

    assert!(matches!(next_event(&mut events).await, NodeEvent::Error(_)));
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn refused_opens_back_off_25_36_49_seconds() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (node, mut events) = NodeConnection::new(config(&format!("ws://127.0.0.1:{port}")), 64);
    node.connect().await;

    let expected = [25_000, 36_000, 49_000];
    for (attempt, delay_ms) in (1..).zip(expected) {
        // No timeout here: the paused clock jumps straight to the next timer.
        loop {
            match events.recv().await.expect("event channel closed") {
                NodeEvent::Disconnected { .. } => break,
                NodeEvent::Error(message) => assert!(message.contains("connection"), "{message}"),
                other => panic!("unexpected {other:?}"),
            }
        }

        let ReconnectState::Pending { deadline, attempt: armed } = node.reconnect_state().await else {
            panic!("no reconnect timer armed after attempt {attempt}");
        };
        assert_eq!(armed, attempt);
        assert_eq!(node.retries().await, attempt);
        assert_eq!(
            deadline.duration_since(tokio::time::Instant::now()),
            Duration::from_millis(delay_ms)
        );
        assert_eq!(node.state().await, ConnectionState::Disconnected);
    }

    node.destroy().await;
    assert_eq!(node.reconnect_state().await, ReconnectState::Idle);
}
