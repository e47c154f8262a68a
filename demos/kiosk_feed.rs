//! Kiosk order feed over a pooled connection set.
//!
//! Demonstrates:
//! - Building a pool over two endpoints with round-robin balancing
//! - Subscribing with exact and regex patterns
//! - Sending orders and reading pool health
//! - Shutting down through a cleanup registry
//!
//! Starts two local kitchen servers that answer every `order.created`
//! with an `order.ready` for the same table.
//!
//! Usage:
//!   cargo run --example kiosk_feed
//!   cargo run --example kiosk_feed -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as Frame;
use tracing_subscriber::EnvFilter;

use ws_connection_pool::{
    LoadBalancingStrategy, Message, Pattern, PoolBuilder, Priority, ShutdownRegistry,
};

// ============================================================================
// Constants
// ============================================================================

const ORDERS: usize = 6;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = std::env::args().any(|a| a == "--debug");
    init_logging(debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    println!("=== Kiosk Feed ===\n");

    // ========================================================================
    // Kitchen Servers
    // ========================================================================

    println!("[1] Starting kitchen servers...");
    let first = kitchen_server("grill")
        .await
        .context("starting grill server")?;
    let second = kitchen_server("fryer")
        .await
        .context("starting fryer server")?;
    println!("    ✓ {first}");
    println!("    ✓ {second}\n");

    // ========================================================================
    // Pool
    // ========================================================================

    println!("[2] Connecting pool...");
    let registry = ShutdownRegistry::new();
    let pool = PoolBuilder::new()
        .urls([first, second])
        .max_connections(2)
        .load_balancing_strategy(LoadBalancingStrategy::RoundRobin)
        .heartbeat_interval(Duration::from_secs(5))
        .cleanup_registry(Arc::new(registry.clone()))
        .build()
        .context("building pool")?;

    if !pool.connect().await {
        println!("    ✗ No kitchen reachable");
        return Ok(());
    }
    println!("    ✓ Connected\n");

    // ========================================================================
    // Subscriptions
    // ========================================================================

    println!("[3] Subscribing...");
    let ready = Arc::new(AtomicUsize::new(0));
    let ready_clone = Arc::clone(&ready);
    let _ready_sub = pool.subscribe(
        "order.ready",
        Arc::new(move |msg, conn| {
            ready_clone.fetch_add(1, Ordering::SeqCst);
            println!(
                "    ← table {} ready at {} via {conn}",
                msg.get_string("table"),
                msg.get_string("station")
            );
        }),
    );
    let _audit_sub = pool.subscribe(
        Pattern::regex(r#""table":"T1""#)?,
        Arc::new(|msg, _| println!("    ← [audit] T1 event: {}", msg.message_type)),
    );
    println!("    ✓ 2 subscriptions\n");

    // ========================================================================
    // Orders
    // ========================================================================

    println!("[4] Sending {ORDERS} orders...");
    for n in 1..=ORDERS {
        let priority = if n % 3 == 0 { Priority::High } else { Priority::Normal };
        let message =
            Message::new("order.created", json!({ "table": format!("T{n}") })).with_priority(priority);
        let id = pool
            .try_send(message)
            .with_context(|| format!("sending order T{n}"))?;
        println!("    → {id} table T{n}");
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    println!(
        "    ✓ {} of {ORDERS} orders ready\n",
        ready.load(Ordering::SeqCst)
    );

    // ========================================================================
    // Health
    // ========================================================================

    println!("[5] Pool health:");
    if let Some(stats) = pool.statistics() {
        let json = serde_json::to_string_pretty(&stats)?;
        for line in json.lines() {
            println!("    {line}");
        }
    }
    println!();

    // ========================================================================
    // Shutdown
    // ========================================================================

    println!("[6] Shutting down...");
    let completed = registry.shutdown_all();
    println!("    ✓ {completed} cleanup(s) ran");

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "ws_connection_pool=debug"
    } else {
        "ws_connection_pool=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

/// Starts a server that marks every order ready. Returns its URL.
async fn kitchen_server(station: &'static str) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("binding listener")?;
    let port = listener.local_addr()?.port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(frame)) = ws.next().await {
                    let Frame::Text(text) = frame else {
                        continue;
                    };
                    let Ok(order) = serde_json::from_str::<Value>(text.as_str()) else {
                        continue;
                    };
                    if order["type"] != "order.created" {
                        continue;
                    }
                    let reply = json!({
                        "type": "order.ready",
                        "data": { "table": order["data"]["table"], "station": station },
                    });
                    if ws.send(Frame::Text(reply.to_string().into())).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    Ok(format!("ws://127.0.0.1:{port}"))
}
