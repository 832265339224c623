//! End-to-end "Order broadcast convergence" property (spec.md 8): three
//! real node processes, each with its own TCP gossip listener and HTTP
//! gateway, wired into a connected mesh (a hub-and-spoke star around node
//! A, since a peer's signing key is only ever learned from its own direct
//! `Hello` — spec.md 4.3 — so a convergence test has to keep every pair
//! that must verify each other's signatures directly connected). An order
//! created on A must reach both spokes after a finite quiescent interval,
//! and a later cancellation must override the earlier announce everywhere.

use std::sync::Arc;
use std::time::Duration;

use otcswap::node::{server, Node, NodeConfig};
use serde_json::{json, Value};

const GOSSIP_A: u16 = 19401;
const GOSSIP_B: u16 = 19402;
const GOSSIP_C: u16 = 19403;
const HTTP_A: u16 = 19411;
const HTTP_B: u16 = 19412;
const HTTP_C: u16 = 19413;
const DISCOVERY_A: u16 = 19421;
const DISCOVERY_B: u16 = 19422;
const DISCOVERY_C: u16 = 19423;

fn config(gossip: u16, http: u16, discovery: u16, connect: Option<String>) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.port = gossip;
    config.http_port = http;
    config.discovery_port = discovery;
    config.bootstrap_peer = connect;
    config
}

fn spawn_node(config: NodeConfig) {
    let node = Arc::new(Node::new(config));
    tokio::spawn(async move {
        if let Err(e) = server::run(node).await {
            eprintln!("test node exited early: {e}");
        }
    });
}

async fn order_ids_on(client: &reqwest::Client, base: &str) -> Vec<String> {
    let body: Value = client
        .get(format!("{base}/orders"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body.as_array()
        .unwrap()
        .iter()
        .map(|o| o["order_id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn order_converges_to_every_peer_and_cancellation_overrides_it() {
    spawn_node(config(GOSSIP_A, HTTP_A, DISCOVERY_A, None));
    spawn_node(config(GOSSIP_B, HTTP_B, DISCOVERY_B, Some(format!("127.0.0.1:{GOSSIP_A}"))));
    spawn_node(config(GOSSIP_C, HTTP_C, DISCOVERY_C, Some(format!("127.0.0.1:{GOSSIP_A}"))));

    // Let the listeners bind and both spokes finish dialing the hub.
    tokio::time::sleep(Duration::from_millis(600)).await;

    let client = reqwest::Client::new();
    let base_a = format!("http://127.0.0.1:{HTTP_A}");
    let base_b = format!("http://127.0.0.1:{HTTP_B}");
    let base_c = format!("http://127.0.0.1:{HTTP_C}");

    client
        .post(format!("{base_a}/auth/register"))
        .json(&json!({"username": "alice", "password": "hunter2"}))
        .send()
        .await
        .unwrap();
    let login: Value = client
        .post(format!("{base_a}/auth/login"))
        .json(&json!({"username": "alice", "password": "hunter2"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = login["token"].as_str().unwrap().to_string();

    let order: Value = client
        .post(format!("{base_a}/orders"))
        .bearer_auth(&token)
        .json(&json!({
            "side": "Sell",
            "base_asset": "ZEC",
            "base_chain": "zcash",
            "quote_asset": "STRK",
            "quote_chain": "starknet",
            "base_amount": 10_000,
            "min_price": 25.0,
            "max_price": 30.0,
            "ttl_secs": 3600,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let order_id = order["order_id"].as_str().unwrap().to_string();

    // Finite quiescent interval for the broadcast to reach both spokes.
    tokio::time::sleep(Duration::from_millis(800)).await;

    for (label, base) in [("B", &base_b), ("C", &base_c)] {
        let ids = order_ids_on(&client, base).await;
        assert!(
            ids.contains(&order_id),
            "order did not converge to node {label}'s cache: {ids:?}"
        );
    }

    client
        .post(format!("{base_a}/orders/{order_id}/cancel"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(800)).await;

    for (label, base) in [("A", &base_a), ("B", &base_b), ("C", &base_c)] {
        let ids = order_ids_on(&client, base).await;
        assert!(
            !ids.contains(&order_id),
            "cancellation did not override the earlier broadcast on node {label}: {ids:?}"
        );
    }
}
