//! Read-only peer directory listing (SPEC_FULL.md 6 supplement): lets an
//! operator see who this node has exchanged a `Hello` with before sending a
//! request/proposal to them by peer id.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::node::Node;

use super::error::ApiError;

pub fn router() -> Router<Arc<Node>> {
    Router::new().route("/peers", get(list_peers))
}

#[derive(Serialize)]
struct PeerSummary {
    peer_id: String,
    last_seen_at: u64,
}

async fn list_peers(State(node): State<Arc<Node>>) -> Result<Json<Vec<PeerSummary>>, ApiError> {
    let peers = node
        .peers
        .list()?
        .into_iter()
        .map(|p| PeerSummary {
            peer_id: p.peer_id,
            last_seen_at: p.last_seen_at,
        })
        .collect();
    Ok(Json(peers))
}
