//! WebSocket connector against a local tungstenite server

use futures::{SinkExt, StreamExt};
use rentride_transport::{
    ChannelState, ClientFrame, ServerFrame, TransportChannel, TransportConfig, WebSocketConnector,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[tokio::test]
async fn test_websocket_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let auth = ws.next().await.unwrap().unwrap();
        let auth = ClientFrame::decode(auth.to_text().unwrap()).unwrap();

        let welcome = ServerFrame::ReceiveMessage {
            sender_id: "support".to_string(),
            body: "welcome".to_string(),
            timestamp: chrono::Utc::now(),
        };
        ws.send(Message::Text(welcome.encode().unwrap()))
            .await
            .unwrap();

        let next = ws.next().await.unwrap().unwrap();
        let next = ClientFrame::decode(next.to_text().unwrap()).unwrap();
        (auth, next)
    });

    let connector =
        WebSocketConnector::new(&format!("ws://{addr}/socket"), Duration::from_secs(5)).unwrap();
    let channel = TransportChannel::new(Arc::new(connector), TransportConfig::default());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    channel.on_message(move |msg| {
        let _ = tx.send(msg);
    });
    channel.connect("u1").unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("No message pushed")
        .unwrap();
    assert_eq!(msg.sender_id, "support");
    assert_eq!(msg.body, "welcome");
    assert_eq!(channel.state(), ChannelState::Connected);

    channel.emit_message("u1", "support", "thanks");

    let (auth, next) = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        auth,
        ClientFrame::Authenticate {
            actor_id: "u1".to_string()
        }
    );
    assert_eq!(
        next,
        ClientFrame::SendMessage {
            sender_id: "u1".to_string(),
            receiver_id: "support".to_string(),
            body: "thanks".to_string()
        }
    );

    channel.disconnect().await;
    assert_eq!(channel.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn test_unreachable_server_fails_after_retries() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connector =
        WebSocketConnector::new(&format!("ws://{addr}/socket"), Duration::from_secs(1)).unwrap();
    let channel = TransportChannel::new(
        Arc::new(connector),
        TransportConfig {
            reconnect_attempts: 2,
            reconnect_delay: Duration::from_millis(100),
            stable_after: Duration::from_secs(1),
        },
    );

    channel.connect("u1").unwrap();
    let mut state = channel.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(20),
        state.wait_for(|s| *s == ChannelState::Failed),
    )
    .await
    .expect("Channel never failed")
    .unwrap();

    channel.emit_typing("u1", "h1");
    assert_eq!(channel.state(), ChannelState::Failed);
}
