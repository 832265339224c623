//! Order creation, listing, cancellation, and detail-request routes
//! (spec.md 4.6, 4.7, 6). Every mutation is applied to the local order book
//! directly and then broadcast/unicast over the gossip overlay, so a
//! single-node deployment with no peers behaves identically minus the wire
//! traffic.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    crypto::{self, aead},
    error::{CoreError, ErrorKind},
    node::Node,
    orderbook::{self, Order, OrderId, Side},
    protocol::{
        messages::{NegotiationPayload, OrderCancel, RequestDetails},
        EnvelopeKind, WireEnvelope,
    },
};

use super::{auth::AuthUser, error::ApiError};

pub fn router() -> Router<Arc<Node>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/request", post(request_details))
}

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[derive(Deserialize)]
struct CreateOrderRequest {
    side: Side,
    base_asset: String,
    base_chain: String,
    quote_asset: String,
    quote_chain: String,
    base_amount: u64,
    min_price: f64,
    max_price: f64,
    ttl_secs: u64,
}

async fn create_order(
    State(node): State<Arc<Node>>,
    AuthUser(username): AuthUser,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<Order>, ApiError> {
    // Orders are keyed by `creator_peer_id`, one value per node rather than
    // per local user, so the order-level signature has to be verifiable
    // against the same peer-directory key every other envelope from this
    // node is (spec.md 4.3, 4.6): the node's own peer identity, not the
    // account key of whichever local user happened to create it.
    let order = Order::create_local(
        username,
        node.peer_id.clone(),
        &node.peer_key_pair,
        req.side,
        req.base_asset,
        req.base_chain,
        req.quote_asset,
        req.quote_chain,
        req.base_amount,
        req.min_price,
        req.max_price,
        now(),
        req.ttl_secs,
    )?;
    node.order_book.insert_local(order.clone())?;

    let payload = serde_cbor::to_vec(&order)
        .map_err(|_| ApiError::from(CoreError::new(ErrorKind::Fatal, "failed to encode order")))?;
    let signature = crypto::sign(&node.peer_key_pair.secret, &payload);
    let envelope = WireEnvelope::broadcast(EnvelopeKind::OrderAnnounce, payload, signature);
    node.gossip.broadcast(envelope, None);

    Ok(Json(order))
}

async fn list_orders(State(node): State<Arc<Node>>) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(node.order_book.list(now())?))
}

async fn get_order(State(node): State<Arc<Node>>, Path(id): Path<String>) -> Result<Json<Order>, ApiError> {
    node.order_book
        .get(&OrderId(id))?
        .map(Json)
        .ok_or_else(|| ApiError::from(CoreError::new(ErrorKind::NotFound, "order not found")))
}

async fn cancel_order(
    State(node): State<Arc<Node>>,
    AuthUser(_username): AuthUser,
    Path(id): Path<String>,
) -> Result<axum::http::StatusCode, ApiError> {
    let order_id = OrderId(id);
    let cancelled_at = now();
    let payload_to_sign = orderbook::cancel_signing_payload(&order_id, &node.peer_id, cancelled_at);
    let signature = crypto::sign(&node.peer_key_pair.secret, &payload_to_sign);

    node.order_book
        .cancel(order_id.clone(), &node.peer_id, cancelled_at, &signature, &node.peer_key_pair.public)?;

    let cancel = OrderCancel {
        order_id: order_id.0,
        maker_peer_id: node.peer_id.clone(),
        cancelled_at,
        signature,
    };
    let payload = serde_cbor::to_vec(&cancel)
        .map_err(|_| ApiError::from(CoreError::new(ErrorKind::Fatal, "failed to encode cancellation")))?;
    let envelope_signature = crypto::sign(&node.peer_key_pair.secret, &payload);
    let envelope = WireEnvelope::broadcast(EnvelopeKind::OrderCancel, payload, envelope_signature);
    node.gossip.broadcast(envelope, None);

    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct RequestDetailsRequest {
    to_peer_id: String,
}

#[derive(Serialize)]
struct RequestAck {
    sent: bool,
}

/// Unicasts a `RequestDetails` negotiation message to `to_peer_id`
/// (spec.md 4.7): used before proposing, to pull an order's full terms
/// rather than trusting the gossiped summary alone.
async fn request_details(
    State(node): State<Arc<Node>>,
    AuthUser(_username): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<RequestDetailsRequest>,
) -> Result<Json<RequestAck>, ApiError> {
    let recipient_key = node
        .peers
        .lookup(&req.to_peer_id)?
        .ok_or_else(|| ApiError::from(CoreError::new(ErrorKind::NotFound, "unknown peer")))?;

    let request = RequestDetails {
        order_id: id,
        taker_peer_id: node.peer_id.clone(),
    };
    let plaintext = serde_cbor::to_vec(&NegotiationPayload::RequestDetails(request))
        .map_err(|_| ApiError::from(CoreError::new(ErrorKind::Fatal, "failed to encode request")))?;
    let sealed = aead::encrypt(&recipient_key, &plaintext)?;
    let ciphertext = sealed.serialize();
    let outer_signature = crypto::sign(&node.peer_key_pair.secret, &ciphertext);
    let envelope = WireEnvelope::unicast(EnvelopeKind::Request, ciphertext, outer_signature);

    node.gossip.send(&req.to_peer_id, envelope)?;
    Ok(Json(RequestAck { sent: true }))
}
