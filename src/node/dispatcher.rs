//! Routes one inbound [`WireEnvelope`] to the component that owns its
//! semantics (spec.md 4.4, 4.6, 4.7). Broadcast kinds are authenticated
//! against the sending peer's key from the [`crate::peer::PeerDirectory`]
//! before being handed to the Order Book; unicast kinds are sealed against
//! this node's own peer-identity key, the same key a sender would have
//! resolved through the recipient's `PeerDirectory` entry (spec.md 4.3:
//! "Lookup by peer identifier returns the current encryption key").

use std::sync::Arc;

use crate::{
    crypto::{self, aead},
    error::{CoreError, ErrorKind},
    orderbook::{Order, OrderId},
    peer::HelloClaim,
    protocol::{
        messages::{Decision, NegotiationPayload, OrderCancel, Propose, RequestDetails},
        EnvelopeBody, EnvelopeKind, WireEnvelope,
    },
};

use super::handle::Node;

/// Dispatches one envelope already read off the wire (or replayed from the
/// overlay's rebroadcast). `from_peer_id` names the peer this connection
/// authenticated as at `Hello` time; every kind but `Hello` itself requires
/// it.
pub async fn dispatch(
    node: &Arc<Node>,
    envelope: WireEnvelope,
    from_peer_id: Option<&str>,
    now: u64,
) -> Result<(), CoreError> {
    match envelope.kind {
        EnvelopeKind::Hello => handle_hello(node, envelope),
        EnvelopeKind::OrderAnnounce => handle_order_announce(node, envelope, now),
        EnvelopeKind::OrderCancel => handle_order_cancel(node, envelope),
        EnvelopeKind::GossipAck => {
            log::debug!("gossip-ack received, no-op");
            Ok(())
        }
        EnvelopeKind::Request | EnvelopeKind::Proposal | EnvelopeKind::Decision => {
            let from_peer_id = from_peer_id.ok_or_else(|| {
                CoreError::new(ErrorKind::ProtocolError, "unicast envelope carried no sender identity")
            })?;
            handle_unicast(node, envelope, from_peer_id, now)
        }
    }
}

fn handle_hello(node: &Arc<Node>, envelope: WireEnvelope) -> Result<(), CoreError> {
    let (public_key, self_signature, rotation_signature) = match envelope.body {
        EnvelopeBody::Hello {
            public_key,
            self_signature,
            rotation_signature,
        } => (public_key, self_signature, rotation_signature),
        _ => return Err(CoreError::new(ErrorKind::ProtocolError, "Hello envelope with wrong body")),
    };
    // A peer's identifier is the digest of its own public key, the same
    // derivation the local node uses for its own `peer_id` (node::handle::Node::new).
    let peer_id = hex::encode(crypto::sha256(&public_key.to_sec1_bytes()));
    let claim = HelloClaim {
        peer_id,
        public_key,
        self_signature,
        rotation_signature,
    };
    node.peers.handle_hello(&claim)?;
    Ok(())
}

fn handle_order_announce(node: &Arc<Node>, envelope: WireEnvelope, now: u64) -> Result<(), CoreError> {
    let (payload, signature) = match envelope.body {
        EnvelopeBody::Plaintext { payload, signature } => (payload, signature),
        _ => return Err(CoreError::new(ErrorKind::ProtocolError, "OrderAnnounce envelope with wrong body")),
    };
    let order: Order = serde_cbor::from_slice(&payload).map_err(|_| {
        CoreError::new(ErrorKind::ProtocolError, "malformed order-announce payload")
    })?;

    let signer_public_key = node
        .peers
        .lookup(&order.creator_peer_id)?
        .ok_or_else(|| CoreError::new(ErrorKind::NotFound, "order announced by an unknown peer"))?;
    crypto::verify(&signer_public_key, &payload, &signature)
        .map_err(|_| CoreError::new(ErrorKind::AuthFailed, "order-announce envelope signature invalid"))?;

    node.order_book.accept_remote(order, &signer_public_key, now)?;
    Ok(())
}

fn handle_order_cancel(node: &Arc<Node>, envelope: WireEnvelope) -> Result<(), CoreError> {
    let (payload, signature) = match envelope.body {
        EnvelopeBody::Plaintext { payload, signature } => (payload, signature),
        _ => return Err(CoreError::new(ErrorKind::ProtocolError, "OrderCancel envelope with wrong body")),
    };
    let cancel: OrderCancel = serde_cbor::from_slice(&payload).map_err(|_| {
        CoreError::new(ErrorKind::ProtocolError, "malformed order-cancel payload")
    })?;

    let signer_public_key = node
        .peers
        .lookup(&cancel.maker_peer_id)?
        .ok_or_else(|| CoreError::new(ErrorKind::NotFound, "cancellation from an unknown peer"))?;
    crypto::verify(&signer_public_key, &payload, &signature)
        .map_err(|_| CoreError::new(ErrorKind::AuthFailed, "order-cancel envelope signature invalid"))?;

    node.order_book.cancel(
        OrderId(cancel.order_id),
        &cancel.maker_peer_id,
        cancel.cancelled_at,
        &cancel.signature,
        &signer_public_key,
    )?;
    Ok(())
}

fn handle_unicast(node: &Arc<Node>, envelope: WireEnvelope, from_peer_id: &str, now: u64) -> Result<(), CoreError> {
    let (ciphertext, outer_signature) = match envelope.body {
        EnvelopeBody::Encrypted {
            ciphertext,
            outer_signature,
        } => (ciphertext, outer_signature),
        _ => return Err(CoreError::new(ErrorKind::ProtocolError, "unicast envelope with wrong body")),
    };

    let signer_public_key = node
        .peers
        .lookup(from_peer_id)?
        .ok_or_else(|| CoreError::new(ErrorKind::NotFound, "unicast message from an unknown peer"))?;
    crypto::verify(&signer_public_key, &ciphertext, &outer_signature)
        .map_err(|_| CoreError::new(ErrorKind::AuthFailed, "unicast envelope signature invalid"))?;

    let sealed = aead::Envelope::deserialize(&ciphertext)
        .map_err(|_| CoreError::new(ErrorKind::ProtocolError, "malformed IES envelope"))?;

    let plaintext = aead::decrypt(&node.peer_key_pair.secret, &sealed).map_err(|_| {
        log::warn!("unicast envelope from {from_peer_id} did not decrypt under this node's peer key");
        CoreError::new(ErrorKind::AuthFailed, "unicast envelope did not decrypt")
    })?;

    let payload: NegotiationPayload = serde_cbor::from_slice(&plaintext)
        .map_err(|_| CoreError::new(ErrorKind::ProtocolError, "malformed negotiation payload"))?;

    match payload {
        NegotiationPayload::RequestDetails(request) => handle_request_details(node, request, from_peer_id),
        NegotiationPayload::Propose(propose) => handle_propose(node, propose),
        NegotiationPayload::Decision(decision) => handle_decision(node, decision, now),
    }
}

/// A taker asking for an order's full terms (spec.md 4.7): reply by sending
/// the signed `Order` directly back to the requester, reusing the
/// `OrderAnnounce` wire shape as a point-to-point send rather than a flood.
fn handle_request_details(node: &Arc<Node>, request: RequestDetails, from_peer_id: &str) -> Result<(), CoreError> {
    let order = node
        .order_book
        .get(&OrderId(request.order_id))?
        .ok_or_else(|| CoreError::new(ErrorKind::NotFound, "requested order not found"))?;

    let payload = serde_cbor::to_vec(&order)
        .map_err(|_| CoreError::new(ErrorKind::Fatal, "failed to encode order for reply"))?;
    let signature = crypto::sign(&node.peer_key_pair.secret, &payload);
    let reply = WireEnvelope::broadcast(EnvelopeKind::OrderAnnounce, payload, signature);

    node.gossip.send(from_peer_id, reply)?;
    let _ = request.taker_peer_id;
    Ok(())
}

/// Records an inbound proposal against its order (spec.md 4.7). The Maker's
/// accept/reject decision is driven separately, by an operator action
/// through the HTTP layer.
fn handle_propose(node: &Arc<Node>, propose: Propose) -> Result<(), CoreError> {
    let order = node
        .order_book
        .get(&OrderId(propose.order_id))?
        .ok_or_else(|| CoreError::new(ErrorKind::NotFound, "proposal against an unknown order"))?;

    node.negotiation.propose(
        &order,
        propose.taker_peer_id,
        propose.taker_username,
        Some(propose.taker_base_address),
        Some(propose.taker_quote_address),
        propose.amount,
        propose.price,
        propose.nonce,
        propose.proposed_at,
    )?;
    Ok(())
}

/// Records the Maker's decision on the Taker's side of a negotiation. The
/// wire payload names the `(order, taker)` pair rather than a proposal id,
/// so it is resolved through `NegotiationEngine::latest_for` (spec.md 4.7).
/// Settlement self-initiation on the Taker side happens asynchronously from
/// a `settlement.request.*` bus subscription, not from here (spec.md 4.10).
fn handle_decision(node: &Arc<Node>, decision: Decision, _now: u64) -> Result<(), CoreError> {
    let order_id = OrderId(decision.order_id);
    let proposal = node
        .negotiation
        .latest_for(&order_id, &decision.taker_peer_id)?
        .ok_or_else(|| CoreError::new(ErrorKind::NotFound, "decision for an unknown proposal"))?;

    node.negotiation.decide(
        &proposal.proposal_id,
        decision.accepted,
        decision.maker_base_address,
        decision.maker_quote_address,
        decision.decided_at,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crypto::generate_keypair, node::config::NodeConfig, orderbook::Side};

    fn now() -> u64 {
        1_700_000_000
    }

    #[tokio::test]
    async fn order_announce_from_unknown_peer_is_not_found() {
        let node = Arc::new(Node::new(NodeConfig::default()));
        let kp = generate_keypair();
        let order = Order::create_local(
            "alice".into(),
            "peer-alice".into(),
            &kp,
            Side::Sell,
            "ZEC".into(),
            "zcash".into(),
            "STRK".into(),
            "starknet".into(),
            10_000,
            25.0,
            30.0,
            now(),
            3600,
        )
        .unwrap();
        let payload = serde_cbor::to_vec(&order).unwrap();
        let signature = crypto::sign(&kp.secret, &payload);
        let envelope = WireEnvelope::broadcast(EnvelopeKind::OrderAnnounce, payload, signature);

        let result = dispatch(&node, envelope, None, now()).await;
        assert!(matches!(result, Err(e) if e.kind == ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn order_announce_from_known_peer_is_admitted() {
        let node = Arc::new(Node::new(NodeConfig::default()));
        let kp = generate_keypair();

        let hello_bytes = kp.public.to_sec1_bytes();
        let hello_sig = crypto::sign(&kp.secret, &hello_bytes);
        let hello = WireEnvelope::hello(kp.public.clone(), hello_sig, None);
        dispatch(&node, hello, None, now()).await.unwrap();

        let peer_id = hex::encode(crypto::sha256(&kp.public.to_sec1_bytes()));
        let order = Order::create_local(
            "alice".into(),
            peer_id,
            &kp,
            Side::Sell,
            "ZEC".into(),
            "zcash".into(),
            "STRK".into(),
            "starknet".into(),
            10_000,
            25.0,
            30.0,
            now(),
            3600,
        )
        .unwrap();
        let payload = serde_cbor::to_vec(&order).unwrap();
        let signature = crypto::sign(&kp.secret, &payload);
        let envelope = WireEnvelope::broadcast(EnvelopeKind::OrderAnnounce, payload, signature);

        dispatch(&node, envelope, None, now()).await.unwrap();
        assert_eq!(node.order_book.list(now()).unwrap().len(), 1);
    }
}
