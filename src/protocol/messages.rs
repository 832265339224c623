//! Application payloads carried inside envelope bodies. These are the
//! plain, serde-friendly structs that get CBOR-encoded and signed (for
//! broadcast kinds) or CBOR-encoded and then IES-sealed (for unicast kinds);
//! the framing and crypto layers never need to know their shape.

use serde::{Deserialize, Serialize};

/// An order as announced to the network: the maker's offer, its identity,
/// and the validity window used to reject stale or far-future announces.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OrderAnnounce {
    pub order_id: String,
    pub maker_peer_id: String,
    pub base_amount: u64,
    pub quote_amount: u64,
    pub base_asset: String,
    pub quote_asset: String,
    pub created_at: u64,
    pub expires_at: u64,
    pub signature: crate::crypto::Signature,
}

/// Withdraws a previously announced order. Cancellation always takes
/// precedence over a concurrently seen announce for the same order id.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OrderCancel {
    pub order_id: String,
    pub maker_peer_id: String,
    pub cancelled_at: u64,
    pub signature: crate::crypto::Signature,
}

/// Acknowledges receipt of a gossiped envelope, used by the overlay to
/// shorten redundant rebroadcast fan-out; carries no application meaning.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GossipAck {
    pub envelope_id: [u8; 32],
    pub from_peer_id: String,
}

/// A taker's request for the full, non-gossiped terms of an order before
/// committing to a proposal (delivered unicast).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RequestDetails {
    pub order_id: String,
    pub taker_peer_id: String,
}

/// A taker's proposal against an order: the counterparty addresses the
/// settlement will lock funds to, and the amount/price the taker is
/// committing to (which may fall inside the order's advertised range rather
/// than matching it exactly). `nonce` makes re-sends of the same proposal
/// idempotent on the maker side (spec.md 4.7).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Propose {
    pub order_id: String,
    pub taker_peer_id: String,
    pub taker_username: String,
    pub taker_base_address: String,
    pub taker_quote_address: String,
    pub amount: u64,
    pub price: f64,
    pub nonce: u64,
    pub proposed_at: u64,
}

/// The maker's response to a proposal.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub order_id: String,
    pub taker_peer_id: String,
    pub accepted: bool,
    pub maker_base_address: Option<String>,
    pub maker_quote_address: Option<String>,
    pub decided_at: u64,
}

/// The inner payload carried by unicast negotiation envelopes (`Request`,
/// `Proposal`, `Decision` kinds each wrap exactly one matching variant).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum NegotiationPayload {
    RequestDetails(RequestDetails),
    Propose(Propose),
    Decision(Decision),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_payload_round_trips_through_cbor() {
        let payload = NegotiationPayload::Propose(Propose {
            order_id: "order-1".into(),
            taker_peer_id: "taker-1".into(),
            taker_username: "bob".into(),
            taker_base_address: "base-addr".into(),
            taker_quote_address: "quote-addr".into(),
            amount: 100,
            price: 27.5,
            nonce: 1,
            proposed_at: 1_700_000_000,
        });
        let bytes = serde_cbor::to_vec(&payload).unwrap();
        let decoded: NegotiationPayload = serde_cbor::from_slice(&bytes).unwrap();
        assert_eq!(decoded, payload);
    }
}
