//! HTTP/REST Gateway (spec.md 6): the operator-facing surface over one
//! node's account, order book, negotiation, and settlement state. One
//! `Router` merged from per-concern submodules, all sharing the same
//! `Arc<Node>` application state the gossip/dispatch side also uses.

mod auth;
pub mod error;
mod orders;
mod peers;
mod proposals;
mod settlement;
mod wallet;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    Router,
};
use tower::{timeout::TimeoutLayer, BoxError, ServiceBuilder};

use crate::node::Node;

/// No single request against a node's own state should ever take this long;
/// a hang here means a lock is stuck, not that the client should wait longer.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

async fn on_timeout(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("unhandled middleware error: {err}"))
    }
}

pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(orders::router())
        .merge(proposals::router())
        .merge(settlement::router())
        .merge(wallet::router())
        .merge(peers::router())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(on_timeout))
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(node)
}

/// Binds and serves the HTTP surface until the process is killed, mirroring
/// the teacher's RPC server's run-until-cancelled shape.
pub async fn serve(node: Arc<Node>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(node);
    log::info!("http gateway listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
