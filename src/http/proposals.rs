//! Proposal creation, listing, and the Maker's accept/reject decision
//! (spec.md 4.7, 6). A proposal is recorded locally (on whichever node
//! originates it) and mirrored to the counterparty over a unicast envelope;
//! GET routes only ever read the local copy.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::{
    crypto::{self, aead},
    error::{CoreError, ErrorKind},
    negotiation::{Proposal, ProposalId},
    node::Node,
    orderbook::OrderId,
    protocol::{
        messages::{Decision, NegotiationPayload, Propose},
        EnvelopeKind, WireEnvelope,
    },
};

use super::{auth::AuthUser, error::ApiError};

pub fn router() -> Router<Arc<Node>> {
    Router::new()
        .route("/orders/:order_id/proposals", post(propose))
        .route("/proposals", get(list_proposals))
        .route("/proposals/:id", get(get_proposal))
        .route("/proposals/:id/decide", post(decide))
        .route("/proposals/:id/cancel", post(cancel))
}

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[derive(Deserialize)]
struct ProposeRequest {
    taker_base_address: String,
    taker_quote_address: String,
    amount: u64,
    price: f64,
    nonce: u64,
}

/// A taker proposes against an order (spec.md 4.7): recorded on this node's
/// own negotiation table and unicast to the order's creator as a `Propose`
/// envelope.
async fn propose(
    State(node): State<Arc<Node>>,
    AuthUser(username): AuthUser,
    Path(order_id): Path<String>,
    Json(req): Json<ProposeRequest>,
) -> Result<Json<Proposal>, ApiError> {
    let order_id = OrderId(order_id);
    let order = node
        .order_book
        .get(&order_id)?
        .ok_or_else(|| ApiError::from(CoreError::new(ErrorKind::NotFound, "order not found")))?;

    let proposal = node.negotiation.propose(
        &order,
        node.peer_id.clone(),
        username,
        Some(req.taker_base_address.clone()),
        Some(req.taker_quote_address.clone()),
        req.amount,
        req.price,
        req.nonce,
        now(),
    )?;

    if order.creator_peer_id != node.peer_id {
        let recipient_key = node
            .peers
            .lookup(&order.creator_peer_id)?
            .ok_or_else(|| ApiError::from(CoreError::new(ErrorKind::NotFound, "order creator peer unknown")))?;
        let wire = Propose {
            order_id: order_id.0,
            taker_peer_id: node.peer_id.clone(),
            taker_username: proposal.taker_username.clone(),
            taker_base_address: req.taker_base_address,
            taker_quote_address: req.taker_quote_address,
            amount: req.amount,
            price: req.price,
            nonce: req.nonce,
            proposed_at: proposal.proposed_at,
        };
        send_unicast(&node, &recipient_key, &order.creator_peer_id, NegotiationPayload::Propose(wire))?;
    }

    Ok(Json(proposal))
}

async fn list_proposals(State(node): State<Arc<Node>>) -> Result<Json<Vec<Proposal>>, ApiError> {
    Ok(Json(node.negotiation.list_all()?))
}

async fn get_proposal(State(node): State<Arc<Node>>, Path(id): Path<String>) -> Result<Json<Proposal>, ApiError> {
    node.negotiation
        .get(&ProposalId(id))?
        .map(Json)
        .ok_or_else(|| ApiError::from(CoreError::new(ErrorKind::NotFound, "proposal not found")))
}

#[derive(Deserialize)]
struct DecideRequest {
    accept: bool,
    maker_base_address: Option<String>,
    maker_quote_address: Option<String>,
}

/// The Maker's accept/reject decision (spec.md 4.7): recorded locally and
/// unicast to the proposing taker as a `Decision` envelope.
async fn decide(
    State(node): State<Arc<Node>>,
    AuthUser(_username): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<DecideRequest>,
) -> Result<Json<Proposal>, ApiError> {
    let proposal_id = ProposalId(id);
    let decided_at = now();
    let decided = node.negotiation.decide(
        &proposal_id,
        req.accept,
        req.maker_base_address.clone(),
        req.maker_quote_address.clone(),
        decided_at,
    )?;

    if decided.taker_peer_id != node.peer_id {
        let recipient_key = node
            .peers
            .lookup(&decided.taker_peer_id)?
            .ok_or_else(|| ApiError::from(CoreError::new(ErrorKind::NotFound, "taker peer unknown")))?;
        let wire = Decision {
            order_id: decided.order_id.0.clone(),
            taker_peer_id: decided.taker_peer_id.clone(),
            accepted: req.accept,
            maker_base_address: req.maker_base_address,
            maker_quote_address: req.maker_quote_address,
            decided_at,
        };
        send_unicast(&node, &recipient_key, &decided.taker_peer_id, NegotiationPayload::Decision(wire))?;
    }

    Ok(Json(decided))
}

async fn cancel(
    State(node): State<Arc<Node>>,
    AuthUser(_username): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Proposal>, ApiError> {
    Ok(Json(node.negotiation.cancel(&ProposalId(id), now())?))
}

fn send_unicast(
    node: &Arc<Node>,
    recipient_key: &crate::crypto::PublicKey,
    recipient_peer_id: &str,
    payload: NegotiationPayload,
) -> Result<(), ApiError> {
    let kind = match payload {
        NegotiationPayload::RequestDetails(_) => EnvelopeKind::Request,
        NegotiationPayload::Propose(_) => EnvelopeKind::Proposal,
        NegotiationPayload::Decision(_) => EnvelopeKind::Decision,
    };
    let plaintext = serde_cbor::to_vec(&payload)
        .map_err(|_| ApiError::from(CoreError::new(ErrorKind::Fatal, "failed to encode negotiation payload")))?;
    let sealed = aead::encrypt(recipient_key, &plaintext)?;
    let ciphertext = sealed.serialize();
    let outer_signature = crypto::sign(&node.peer_key_pair.secret, &ciphertext);
    let envelope = WireEnvelope::unicast(kind, ciphertext, outer_signature);
    node.gossip.send(recipient_peer_id, envelope)?;
    Ok(())
}
