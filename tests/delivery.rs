//! Outbound delivery: load balancing, queueing, backpressure and draining.

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::json;

use common::{MockConnector, builder, settle};
use ws_connection_pool::{Error, LoadBalancingStrategy, Message, Priority};

// ============================================================================
// Constants
// ============================================================================

const A: &str = "ws://kitchen-a.local/orders";
const B: &str = "ws://kitchen-b.local/orders";
const C: &str = "ws://kitchen-c.local/orders";

fn order(n: u64) -> Message {
    Message::new("order.created", json!({ "order": n }))
}

// ============================================================================
// Direct Writes
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_connected_send_writes_immediately() {
    let connector = MockConnector::new();
    let pool = builder(&connector).url(A).build().expect("build");
    assert!(pool.connect().await);

    assert!(pool.send(order(1)));

    let health = pool.health_status().expect("health");
    assert_eq!(health.messages_sent, 1);
    assert_eq!(health.queued_messages, 0);

    let stats = pool.statistics().expect("stats");
    let connection = stats.connections.values().next().expect("connection");
    assert_eq!(connection.messages_sent, 1);
    assert_eq!(connection.queued_messages, 0);
}

#[tokio::test(start_paused = true)]
async fn test_wire_format() {
    let connector = MockConnector::new();
    let pool = builder(&connector).url(A).build().expect("build");
    assert!(pool.connect().await);

    let id = pool
        .try_send(
            Message::new("payment.captured", json!({ "amount": 1250 }))
                .with_priority(Priority::High)
                .with_max_retries(1),
        )
        .expect("send");

    let frames = connector.link(0).sent_json();
    assert_eq!(frames.len(), 1);

    let frame = &frames[0];
    assert_eq!(frame["id"], id.as_u64());
    assert_eq!(frame["type"], "payment.captured");
    assert_eq!(frame["data"]["amount"], 1250);
    assert_eq!(frame["priority"], "high");
    assert_eq!(frame["retryCount"], 0);
    assert_eq!(frame["maxRetries"], 1);
    assert!(frame["timestamp"].as_u64().expect("timestamp") > 0);
}

#[tokio::test(start_paused = true)]
async fn test_message_ids_increase() {
    let connector = MockConnector::new();
    let pool = builder(&connector).url(A).build().expect("build");
    assert!(pool.connect().await);

    let first = pool.try_send(order(1)).expect("send");
    let second = pool.try_send(order(2)).expect("send");
    assert!(second > first);
}

#[tokio::test(start_paused = true)]
async fn test_round_robin_is_fair() {
    let connector = MockConnector::new();
    let pool = builder(&connector)
        .urls([A, B, C])
        .load_balancing_strategy(LoadBalancingStrategy::RoundRobin)
        .build()
        .expect("build");
    assert!(pool.connect().await);

    for n in 0..9 {
        assert!(pool.send(order(n)));
    }

    for link in connector.links() {
        assert_eq!(link.sent().len(), 3, "{} got an unfair share", link.url);
    }
    assert_eq!(pool.statistics().expect("stats").load_balancer.cursor, 9);
}

#[tokio::test(start_paused = true)]
async fn test_health_based_avoids_degraded_connection() {
    let connector = MockConnector::new();
    let pool = builder(&connector)
        .urls([A, B])
        .max_connections(2)
        .build()
        .expect("build");
    assert!(pool.connect().await);

    let degraded = connector.links_for(A).remove(0);
    degraded.push_error("flaky");
    settle().await;

    for n in 0..4 {
        assert!(pool.send(order(n)));
    }

    assert!(degraded.sent().is_empty());
    assert_eq!(connector.links_for(B)[0].sent().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_costs_health() {
    let connector = MockConnector::new();
    let pool = builder(&connector).url(A).build().expect("build");
    assert!(pool.connect().await);

    connector.link(0).set_failing(true);

    assert!(!pool.send(order(1)));
    assert!(matches!(pool.try_send(order(2)), Err(Error::ConnectionClosed)));

    let health = pool.health_status().expect("health");
    assert!((health.average_health - 0.8).abs() < 1e-9);
    assert_eq!(health.messages_sent, 0);
    assert_eq!(health.queued_messages, 0, "direct write failures are not queued");
}

#[tokio::test(start_paused = true)]
async fn test_repeated_write_failures_remove_connection_without_failover() {
    let connector = MockConnector::new();
    let pool = builder(&connector)
        .url(A)
        .enable_failover(false)
        .build()
        .expect("build");
    assert!(pool.connect().await);

    let link = connector.link(0);
    link.set_failing(true);

    for n in 0..10 {
        assert!(!pool.send(order(n)));
    }

    assert_eq!(link.close_codes(), vec![4000]);
    assert_eq!(pool.health_status().expect("health").total_connections, 0);
    assert!(matches!(
        pool.try_send(order(11)),
        Err(Error::NoConnectionAvailable)
    ));
}

// ============================================================================
// Queueing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_backpressure_keeps_queue_capacity() {
    let connector = MockConnector::new();
    let pool = builder(&connector)
        .url(A)
        .message_queue_size(5)
        .reconnect_delay(Duration::from_secs(60))
        .build()
        .expect("build");
    assert!(pool.connect().await);

    connector.link(0).close_remote(1006);
    settle().await;

    let accepted = (0..8).filter(|&n| pool.send(order(n))).count();
    assert_eq!(accepted, 5);

    match pool.try_send(order(99)) {
        Err(Error::QueueFull { capacity, .. }) => assert_eq!(capacity, 5),
        other => panic!("expected QueueFull, got {other:?}"),
    }

    let health = pool.health_status().expect("health");
    assert_eq!(health.queued_messages, 5);
    assert_eq!(health.messages_sent, 0);
}

#[tokio::test(start_paused = true)]
async fn test_queue_drains_in_batches_after_reconnect() {
    let connector = MockConnector::new();
    let pool = builder(&connector)
        .url(A)
        .reconnect_delay(Duration::from_millis(100))
        .health_check_interval(Duration::from_secs(1))
        .build()
        .expect("build");
    assert!(pool.connect().await);

    connector.link(0).close_remote(1006);
    settle().await;

    for n in 0..25 {
        assert!(pool.send(order(n)));
    }
    assert_eq!(pool.health_status().expect("health").queued_messages, 25);

    // Reconnected at +100ms; the queue moved to the replacement.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let replacement = connector.link(1);
    assert!(replacement.sent().is_empty(), "queue drains on the sweep only");
    assert_eq!(pool.health_status().expect("health").queued_messages, 25);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(replacement.sent_of_type("order.created").len(), 10);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(replacement.sent_of_type("order.created").len(), 20);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let frames = replacement.sent_of_type("order.created");
    assert_eq!(frames.len(), 25);

    let order_numbers: Vec<u64> = frames
        .iter()
        .map(|frame| frame["data"]["order"].as_u64().expect("order"))
        .collect();
    assert_eq!(order_numbers, (0..25).collect::<Vec<_>>(), "FIFO order");
    assert_eq!(pool.health_status().expect("health").queued_messages, 0);
}

#[tokio::test(start_paused = true)]
async fn test_queue_is_dropped_when_budget_exhausted() {
    let connector = MockConnector::new();
    connector.script(A, &[common::Behavior::Open, common::Behavior::Fail]);

    let pool = builder(&connector)
        .url(A)
        .reconnect_delay(Duration::from_millis(100))
        .max_reconnect_attempts(1)
        .build()
        .expect("build");
    assert!(pool.connect().await);

    connector.link(0).close_remote(1006);
    settle().await;
    assert!(pool.send(order(1)));
    assert_eq!(pool.health_status().expect("health").queued_messages, 1);

    tokio::time::sleep(Duration::from_millis(150)).await;

    let health = pool.health_status().expect("health");
    assert_eq!(health.total_connections, 0);
    assert_eq!(health.queued_messages, 0);
}
