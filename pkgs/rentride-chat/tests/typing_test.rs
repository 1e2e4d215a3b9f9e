//! Typing presence, both directions, on paused time

mod common;

use common::*;
use rentride_chat::ChatEvent;
use rentride_transport::{ClientFrame, ServerEnd, ServerFrame};
use std::time::Duration;

fn typing(receiver: &str) -> ClientFrame {
    ClientFrame::Typing {
        sender_id: "u1".to_string(),
        receiver_id: receiver.to_string(),
    }
}

fn stop(receiver: &str) -> ClientFrame {
    ClientFrame::StopTyping {
        sender_id: "u1".to_string(),
        receiver_id: receiver.to_string(),
    }
}

fn count(frames: &[ClientFrame], wanted: &ClientFrame) -> usize {
    frames.iter().filter(|f| *f == wanted).count()
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

async fn connected_customer() -> (Harness, ServerEnd) {
    let backend = marketplace();
    let mut harness = start_session(&backend, "u1", test_config());
    let end = accept_connected(&mut harness).await;
    (harness, end)
}

#[tokio::test(start_paused = true)]
async fn test_keystrokes_debounce_to_one_stop_per_pause() {
    let (harness, mut end) = connected_customer().await;
    let session = harness.session.clone();
    session.select_peer("h1").await.unwrap();

    for _ in 0..4 {
        session.notify_keystroke();
        sleep_ms(500).await;
    }
    // 1500ms after the last keystroke: still typing
    sleep_ms(1000).await;
    let frames = end.drain();
    assert_eq!(count(&frames, &typing("h1")), 4);
    assert_eq!(count(&frames, &stop("h1")), 0);

    sleep_ms(600).await;
    assert_eq!(end.drain(), vec![stop("h1")]);

    // A second burst after the pause gets its own stop
    session.notify_keystroke();
    sleep_ms(1000).await;
    session.notify_keystroke();
    sleep_ms(2100).await;
    let frames = end.drain();
    assert_eq!(frames, vec![typing("h1"), typing("h1"), stop("h1")]);

    sleep_ms(10_000).await;
    assert!(end.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_send_stops_typing_immediately() {
    let (harness, mut end) = connected_customer().await;
    let session = harness.session.clone();
    session.select_peer("h1").await.unwrap();

    session.notify_keystroke();
    sleep_ms(300).await;
    session.send_message("h1", "on my way").await.unwrap();

    assert_eq!(next_frame(&mut end).await, typing("h1"));
    assert_eq!(next_frame(&mut end).await, stop("h1"));
    assert!(matches!(
        next_frame(&mut end).await,
        ClientFrame::SendMessage { .. }
    ));

    // The cancelled timer never fires
    sleep_ms(5_000).await;
    assert!(end.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_switching_peer_flushes_pending_timer() {
    let (harness, mut end) = connected_customer().await;
    let session = harness.session.clone();
    session.select_peer("h1").await.unwrap();

    session.notify_keystroke();
    session.select_peer("a1").await.unwrap();
    assert_eq!(next_frame(&mut end).await, typing("h1"));
    assert_eq!(next_frame(&mut end).await, stop("h1"));

    session.notify_keystroke();
    sleep_ms(2_100).await;
    assert_eq!(end.drain(), vec![typing("a1"), stop("a1")]);

    sleep_ms(5_000).await;
    assert!(end.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_keystroke_without_conversation_is_ignored() {
    let (harness, mut end) = connected_customer().await;

    harness.session.notify_keystroke();
    sleep_ms(3_000).await;
    assert!(end.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_peer_typing_indicator() {
    let (mut harness, end) = connected_customer().await;
    let session = harness.session.clone();
    drain_events(&mut harness.events);

    end.push(&ServerFrame::UserTyping {
        sender_id: "h1".to_string(),
    })
    .unwrap();
    wait_until(|| session.is_typing("h1")).await;
    assert_eq!(session.typing_peers(), vec!["h1".to_string()]);

    end.push(&ServerFrame::UserStopTyping {
        sender_id: "h1".to_string(),
    })
    .unwrap();
    wait_until(|| !session.is_typing("h1")).await;

    let typing_events: Vec<_> = drain_events(&mut harness.events)
        .into_iter()
        .filter(|e| matches!(e, ChatEvent::TypingChanged { .. }))
        .collect();
    assert_eq!(
        typing_events,
        vec![
            ChatEvent::TypingChanged {
                peer_id: "h1".to_string(),
                typing: true
            },
            ChatEvent::TypingChanged {
                peer_id: "h1".to_string(),
                typing: false
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_lost_stop_event_expires() {
    let (harness, end) = connected_customer().await;
    let session = harness.session.clone();

    end.push(&ServerFrame::UserTyping {
        sender_id: "h1".to_string(),
    })
    .unwrap();
    wait_until(|| session.is_typing("h1")).await;

    sleep_ms(3_000).await;
    // Refreshed by a second typing event, so the first expiry does nothing
    end.push(&ServerFrame::UserTyping {
        sender_id: "h1".to_string(),
    })
    .unwrap();
    sleep_ms(2_500).await;
    assert!(session.is_typing("h1"));

    sleep_ms(3_000).await;
    assert!(!session.is_typing("h1"));
}

#[tokio::test(start_paused = true)]
async fn test_own_typing_echo_is_ignored() {
    let (harness, end) = connected_customer().await;
    let session = harness.session.clone();

    end.push(&ServerFrame::UserTyping {
        sender_id: "u1".to_string(),
    })
    .unwrap();
    end.push(&ServerFrame::UserTyping {
        sender_id: "a1".to_string(),
    })
    .unwrap();
    wait_until(|| session.is_typing("a1")).await;

    assert!(!session.is_typing("u1"));
    assert_eq!(session.typing_peers(), vec!["a1".to_string()]);
}
