use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::crypto::{self, KeyPair, Signature};

use super::OrderBookError;

/// Wraps the order identifier string so it can never be confused with a
/// proposal or settlement identifier at the type level.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// An advertised swap offer. Local orders are signed by the creator's
/// long-lived signing key at creation time; orders learned from a peer are
/// gated on signature, skew window, and cancellation state before entering
/// the cache (see `OrderBook::accept_remote`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub creator_username: String,
    pub creator_peer_id: String,
    pub side: Side,
    pub base_asset: String,
    pub base_chain: String,
    pub quote_asset: String,
    pub quote_chain: String,
    pub base_amount: u64,
    pub min_price: f64,
    pub max_price: f64,
    pub created_at: u64,
    pub expires_at: u64,
    pub signature: Signature,
}

static LOCAL_COUNTER: AtomicU64 = AtomicU64::new(0);

impl Order {
    /// Builds the canonical signing payload: fields in declared order,
    /// each preceded by a fixed-width length prefix for variable-length
    /// fields, then hashed and signed by the caller.
    fn signing_payload(
        creator_peer_id: &str,
        side: Side,
        base_asset: &str,
        base_chain: &str,
        quote_asset: &str,
        quote_chain: &str,
        base_amount: u64,
        min_price: f64,
        max_price: f64,
        created_at: u64,
        expires_at: u64,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        for field in [creator_peer_id, base_asset, base_chain, quote_asset, quote_chain] {
            buf.extend_from_slice(&(field.len() as u32).to_be_bytes());
            buf.extend_from_slice(field.as_bytes());
        }
        buf.push(match side {
            Side::Buy => 0,
            Side::Sell => 1,
        });
        buf.extend_from_slice(&base_amount.to_be_bytes());
        buf.extend_from_slice(&min_price.to_be_bytes());
        buf.extend_from_slice(&max_price.to_be_bytes());
        buf.extend_from_slice(&created_at.to_be_bytes());
        buf.extend_from_slice(&expires_at.to_be_bytes());
        buf
    }

    /// Creates and signs a new order on behalf of the local user, assigning
    /// a monotone-ish `{created_at}-{counter}` id.
    #[allow(clippy::too_many_arguments)]
    pub fn create_local(
        creator_username: String,
        creator_peer_id: String,
        key_pair: &KeyPair,
        side: Side,
        base_asset: String,
        base_chain: String,
        quote_asset: String,
        quote_chain: String,
        base_amount: u64,
        min_price: f64,
        max_price: f64,
        created_at: u64,
        ttl_secs: u64,
    ) -> Result<Self, OrderBookError> {
        if base_amount == 0 {
            return Err(OrderBookError::ConstraintViolated("amount must be > 0".into()));
        }
        if min_price > max_price {
            return Err(OrderBookError::ConstraintViolated("min_price > max_price".into()));
        }
        let expires_at = created_at + ttl_secs;
        let counter = LOCAL_COUNTER.fetch_add(1, Ordering::Relaxed);
        let order_id = OrderId(format!("{}-{}", created_at, counter));

        let payload = Self::signing_payload(
            &creator_peer_id,
            side,
            &base_asset,
            &base_chain,
            &quote_asset,
            &quote_chain,
            base_amount,
            min_price,
            max_price,
            created_at,
            expires_at,
        );
        let signature = crypto::sign(&key_pair.secret, &payload);

        Ok(Self {
            order_id,
            creator_username,
            creator_peer_id,
            side,
            base_asset,
            base_chain,
            quote_asset,
            quote_chain,
            base_amount,
            min_price,
            max_price,
            created_at,
            expires_at,
            signature,
        })
    }

    /// Verifies this order's signature against the peer's known key and
    /// checks the structural invariants (spec.md 3, 4.6): amount > 0,
    /// min <= max, expiry > creation.
    pub fn verify(&self, signer_public_key: &crypto::PublicKey) -> Result<(), OrderBookError> {
        if self.base_amount == 0 {
            return Err(OrderBookError::ConstraintViolated("amount must be > 0".into()));
        }
        if self.min_price > self.max_price {
            return Err(OrderBookError::ConstraintViolated("min_price > max_price".into()));
        }
        if self.expires_at <= self.created_at {
            return Err(OrderBookError::ConstraintViolated("expiry must be after creation".into()));
        }
        let payload = Self::signing_payload(
            &self.creator_peer_id,
            self.side,
            &self.base_asset,
            &self.base_chain,
            &self.quote_asset,
            &self.quote_chain,
            self.base_amount,
            self.min_price,
            self.max_price,
            self.created_at,
            self.expires_at,
        );
        crypto::verify(signer_public_key, &payload, &self.signature)
            .map_err(|_| OrderBookError::ConstraintViolated("bad order signature".into()))
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    pub fn price_in_range(&self, price: f64) -> bool {
        price >= self.min_price && price <= self.max_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_keypair;

    fn sample(now: u64) -> (Order, KeyPair) {
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
            now,
            3600,
        )
        .unwrap();
        (order, kp)
    }

    #[test]
    fn signed_order_verifies_under_creator_key() {
        let (order, kp) = sample(1_700_000_000);
        order.verify(&kp.public).unwrap();
    }

    #[test]
    fn tampered_order_fails_verification() {
        let (mut order, kp) = sample(1_700_000_000);
        order.base_amount += 1;
        assert!(order.verify(&kp.public).is_err());
    }

    #[test]
    fn zero_amount_is_rejected_at_construction() {
        let kp = generate_keypair();
        let result = Order::create_local(
            "alice".into(),
            "peer-alice".into(),
            &kp,
            Side::Sell,
            "ZEC".into(),
            "zcash".into(),
            "STRK".into(),
            "starknet".into(),
            0,
            25.0,
            30.0,
            1_700_000_000,
            3600,
        );
        assert!(matches!(result, Err(OrderBookError::ConstraintViolated(_))));
    }
}
