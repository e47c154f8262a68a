//! End-to-end against a local `tokio-tungstenite` echo server.

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as Frame;

use ws_connection_pool::{ConnectionState, InboundMessage, Message, PoolBuilder};

// ============================================================================
// Helpers
// ============================================================================

const WAIT: Duration = Duration::from_secs(5);

/// Echo server accepting any number of clients. Returns its URL.
async fn echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(frame)) = ws.next().await {
                    if frame.is_text() && ws.send(frame).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    format!("ws://127.0.0.1:{port}")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_round_trip_through_echo_server() {
    common::init_tracing();
    let url = echo_server().await;

    let pool = PoolBuilder::new()
        .url(&url)
        .url(&url)
        .max_connections(2)
        .build()
        .expect("build");
    assert!(pool.connect().await);
    assert_eq!(pool.health_status().expect("health").active_connections, 2);

    let (tx, mut rx) = mpsc::unbounded_channel::<InboundMessage>();
    let _sub = pool.subscribe(
        "order.created",
        Arc::new(move |msg, _conn| {
            let _ = tx.send(msg.clone());
        }),
    );

    assert!(pool.send(Message::new("order.created", json!({ "table": "T4" }))));

    let echoed = timeout(WAIT, rx.recv())
        .await
        .expect("echo in time")
        .expect("channel open");
    assert_eq!(echoed.message_type, "order.created");
    assert_eq!(echoed.get_string("table"), "T4");
    assert_eq!(echoed.extra["priority"], "normal");

    let health = pool.health_status().expect("health");
    assert_eq!(health.messages_sent, 1);
    assert_eq!(health.messages_received, 1);

    pool.disconnect();
}

#[tokio::test]
async fn test_server_close_triggers_reconnect() {
    common::init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();

    // First client is closed right away; later clients are kept open.
    tokio::spawn(async move {
        let mut accepted = 0;
        while let Ok((stream, _)) = listener.accept().await {
            accepted += 1;
            let close_now = accepted == 1;
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                if close_now {
                    let _ = ws.close(None).await;
                    return;
                }
                while let Some(Ok(frame)) = ws.next().await {
                    if matches!(frame, Frame::Close(_)) {
                        break;
                    }
                }
            });
        }
    });

    let pool = PoolBuilder::new()
        .url(format!("ws://127.0.0.1:{port}"))
        .reconnect_delay(Duration::from_millis(50))
        .build()
        .expect("build");
    assert!(pool.connect().await);

    let reconnected = timeout(WAIT, async {
        loop {
            let stats = pool.statistics().expect("stats");
            let replaced = stats.connections.values().any(|c| {
                c.reconnect_attempts == 1 && c.state == ConnectionState::Connected
            });
            if replaced {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reconnected.is_ok(), "pool did not reconnect");

    pool.disconnect();
}
