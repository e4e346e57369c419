//! Connection manager tests over an in-memory transport.
//!
//! Time is paused, so reconnect delays elapse instantly once every task is
//! idle and elapsed durations are exact.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use derivdeck::DeckError;
use derivdeck::models::InboundMessage;
use derivdeck::models::buy::{ContractType, TradeOrderBuilder};
use derivdeck::session::{ConnectionState, SessionEvent};
use derivdeck::websocket::ConnectionManager;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tokio::time::Instant;

use common::{ChannelConnector, tick_frame};

/// Waits for the first event matching `pred`.
async fn wait_for(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    loop {
        let event = events.recv().await.expect("event stream ended");
        if pred(&event) {
            return event;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_open_sends_tick_subscription() {
    let (connector, mut servers) = ChannelConnector::new();
    let (manager, handle, _events) = ConnectionManager::new(common::session(None), connector);
    let task = manager.spawn();

    handle.open("R_100", None).unwrap();
    let mut server = servers.recv().await.expect("connected");
    let request = server.next_request().await;

    assert_eq!(request["ticks"], "R_100");
    assert_eq!(request["subscribe"], 1);
    assert_eq!(request["req_id"], 1);

    drop(handle);
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_ticks_reach_event_stream() {
    let (connector, mut servers) = ChannelConnector::new();
    let (manager, handle, mut events) = ConnectionManager::new(common::session(None), connector);
    manager.spawn();

    handle.open("R_100", None).unwrap();
    let mut server = servers.recv().await.unwrap();
    server.next_request().await;

    server.push_text("garbage".to_string());
    server.push_text(tick_frame("R_100", "t-1", Some(1), 1_700_000_000.5, 99.5));

    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::Message(_))).await;
    match event {
        SessionEvent::Message(InboundMessage::Tick(tick)) => assert_eq!(tick.quote, 99.5),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_switch_sends_forget_then_subscribe() {
    let (connector, mut servers) = ChannelConnector::new();
    let (manager, handle, mut events) = ConnectionManager::new(common::session(None), connector);
    manager.spawn();

    handle.open("R_100", None).unwrap();
    let mut server = servers.recv().await.unwrap();
    server.next_request().await;
    server.push_text(tick_frame("R_100", "t-1", Some(1), 1_700_000_000.0, 100.0));
    wait_for(&mut events, |e| matches!(e, SessionEvent::Message(_))).await;

    handle.switch_instrument("R_50", None).unwrap();

    let first = server.next_request().await;
    let second = server.next_request().await;
    assert_eq!(first["forget"], "t-1");
    assert_eq!(second["ticks"], "R_50");
}

#[tokio::test(start_paused = true)]
async fn test_lost_transport_reconnects_after_two_seconds() {
    let (connector, mut servers) = ChannelConnector::new();
    let connects = connector.connects();
    let (manager, handle, mut events) = ConnectionManager::new(common::session(None), connector);
    manager.spawn();

    handle.open("R_100", None).unwrap();
    let server = servers.recv().await.unwrap();
    wait_for(&mut events, |e| {
        *e == SessionEvent::StateChanged(ConnectionState::Open)
    })
    .await;

    let lost_at = Instant::now();
    drop(server);

    let mut server = servers.recv().await.expect("reconnected");
    assert_eq!(lost_at.elapsed(), Duration::from_secs(2));
    assert_eq!(connects.load(Ordering::SeqCst), 2);

    // The new transport resubscribes.
    let request = server.next_request().await;
    assert_eq!(request["ticks"], "R_100");

    // Only one reconnect was scheduled for the single loss.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connects.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_close_during_backoff_prevents_reconnect() {
    let (connector, mut servers) = ChannelConnector::new();
    let connects = connector.connects();
    let (manager, handle, mut events) = ConnectionManager::new(common::session(None), connector);
    manager.spawn();

    handle.open("R_100", None).unwrap();
    let server = servers.recv().await.unwrap();
    wait_for(&mut events, |e| {
        *e == SessionEvent::StateChanged(ConnectionState::Open)
    })
    .await;
    drop(server);

    wait_for(&mut events, |e| matches!(e, SessionEvent::Reconnecting { .. })).await;
    handle.close().unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert!(servers.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_refused_connection_is_retried() {
    let (connector, mut servers) = ChannelConnector::new();
    let connects = connector.connects();
    let refuse = connector.refuse();
    refuse.store(true, Ordering::SeqCst);
    let (manager, handle, mut events) = ConnectionManager::new(common::session(None), connector);
    manager.spawn();

    handle.open("R_100", None).unwrap();
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::Reconnecting { .. })).await;
    assert_eq!(
        event,
        SessionEvent::Reconnecting {
            attempt: 1,
            after: Duration::from_secs(2)
        }
    );

    refuse.store(false, Ordering::SeqCst);
    servers.recv().await.expect("second attempt connects");
    assert_eq!(connects.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_handle_rejects_trade_without_token() {
    let (connector, _servers) = ChannelConnector::new();
    let (_manager, handle, _events) = ConnectionManager::new(common::session(None), connector);

    let order = TradeOrderBuilder::new("R_100", ContractType::Put, dec!(5), "10t".parse().unwrap())
        .build()
        .unwrap();
    let result = handle.place_trade(order);

    assert!(matches!(result, Err(DeckError::UserInput(_))));
}

#[tokio::test(start_paused = true)]
async fn test_handle_errors_after_manager_stops() {
    let (connector, _servers) = ChannelConnector::new();
    let (manager, handle, _events) = ConnectionManager::new(common::session(None), connector);
    drop(manager);

    assert!(matches!(
        handle.open("R_100", None),
        Err(DeckError::NotConnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_close_during_handshake_cancels_attempt() {
    let (connector, mut servers) = ChannelConnector::new();
    let connector = connector.with_connect_delay(Duration::from_secs(5));
    let connects = connector.connects();
    let (manager, handle, mut events) = ConnectionManager::new(common::session(None), connector);
    manager.spawn();

    handle.open("R_100", None).unwrap();
    wait_for(&mut events, |e| {
        *e == SessionEvent::StateChanged(ConnectionState::Connecting)
    })
    .await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let closed_at = Instant::now();
    handle.close().unwrap();
    let mut seen = Vec::new();
    loop {
        let event = events.recv().await.expect("event stream ended");
        let done = event == SessionEvent::StateChanged(ConnectionState::Disconnected);
        seen.push(event);
        if done {
            break;
        }
    }
    // The close is not held up by the handshake.
    assert!(closed_at.elapsed() < Duration::from_secs(5));
    assert!(!seen.contains(&SessionEvent::StateChanged(ConnectionState::Open)));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert!(servers.try_recv().is_err());
    while let Ok(event) = events.try_recv() {
        assert_ne!(event, SessionEvent::StateChanged(ConnectionState::Open));
    }
}

#[tokio::test(start_paused = true)]
async fn test_open_during_handshake_replaces_attempt() {
    let (connector, mut servers) = ChannelConnector::new();
    let connector = connector.with_connect_delay(Duration::from_secs(5));
    let connects = connector.connects();
    let (manager, handle, mut events) = ConnectionManager::new(common::session(None), connector);
    manager.spawn();

    handle.open("R_100", None).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.open("R_50", None).unwrap();

    let mut server = servers.recv().await.expect("connected");
    assert_eq!(connects.load(Ordering::SeqCst), 2);
    let request = server.next_request().await;
    assert_eq!(request["ticks"], "R_50");
    wait_for(&mut events, |e| {
        *e == SessionEvent::StateChanged(ConnectionState::Open)
    })
    .await;

    // The abandoned attempt never produced a transport.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(servers.try_recv().is_err());
}
