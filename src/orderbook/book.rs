use std::{
    collections::{HashMap, HashSet},
    sync::RwLock,
};

use crate::crypto::{self, PublicKey, Signature};

use super::{order::OrderId, Order, OrderBookError};

/// Inbound timestamps further than this from local wall-clock time are
/// rejected as stale or pre-dated (spec.md 4.6).
pub const SKEW_WINDOW_SECS: u64 = 5 * 60;

#[derive(Default)]
struct Inner {
    orders: HashMap<OrderId, Order>,
    // Tracked independent of `orders` so a cancel that arrives before its
    // matching announce still wins (spec.md 4.6: cancellation takes
    // precedence over create regardless of arrival order).
    cancelled: HashSet<OrderId>,
}

/// Locally authoritative for orders this node created; a read-mostly cache
/// for everything else learned over gossip. Single reader-writer lock,
/// held only for the constant-time critical section (spec.md 5).
pub struct OrderBook {
    inner: RwLock<Inner>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Inserts a locally created order (already signed by the caller's key).
    pub fn insert_local(&self, order: Order) -> Result<(), OrderBookError> {
        let mut inner = self.inner.write()?;
        inner.orders.insert(order.order_id.clone(), order);
        Ok(())
    }

    /// Admits a remote order announcement into the cache. Gated on:
    /// signature under the claimed peer's key, a +/-5 minute skew window,
    /// not already expired, and not already cancelled (spec.md 4.6).
    pub fn accept_remote(
        &self,
        order: Order,
        signer_public_key: &PublicKey,
        now: u64,
    ) -> Result<(), OrderBookError> {
        order.verify(signer_public_key)?;

        let skew = now.abs_diff(order.created_at);
        if skew > SKEW_WINDOW_SECS {
            return Err(OrderBookError::ConstraintViolated("order timestamp outside skew window".into()));
        }
        if order.is_expired(now) {
            return Err(OrderBookError::ConstraintViolated("order already expired".into()));
        }

        let mut inner = self.inner.write()?;
        if inner.cancelled.contains(&order.order_id) {
            // Cancellation always takes precedence, regardless of arrival order.
            return Ok(());
        }
        inner.orders.insert(order.order_id.clone(), order);
        Ok(())
    }

    /// Marks an order cancelled. Recorded even if the order has not yet
    /// been observed locally, so a later-arriving announce for the same id
    /// is refused (spec.md 4.6).
    pub fn cancel(
        &self,
        order_id: OrderId,
        maker_peer_id: &str,
        cancelled_at: u64,
        signature: &Signature,
        signer_public_key: &PublicKey,
    ) -> Result<(), OrderBookError> {
        let payload = cancel_signing_payload(&order_id, maker_peer_id, cancelled_at);
        crypto::verify(signer_public_key, &payload, signature)
            .map_err(|_| OrderBookError::ConstraintViolated("bad cancellation signature".into()))?;

        let mut inner = self.inner.write()?;
        inner.orders.remove(&order_id);
        inner.cancelled.insert(order_id);
        Ok(())
    }

    pub fn get(&self, order_id: &OrderId) -> Result<Option<Order>, OrderBookError> {
        Ok(self.inner.read()?.orders.get(order_id).cloned())
    }

    /// Lists unexpired, uncancelled orders ordered by creation time.
    pub fn list(&self, now: u64) -> Result<Vec<Order>, OrderBookError> {
        let inner = self.inner.read()?;
        let mut live: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| !o.is_expired(now))
            .cloned()
            .collect();
        live.sort_by_key(|o| o.created_at);
        Ok(live)
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical bytes an `OrderCancel` signature is computed over. Exposed so
/// callers that build a cancellation outside the order book (the HTTP
/// layer, signing on the local user's behalf) sign exactly what
/// `OrderBook::cancel` re-derives and checks.
pub fn cancel_signing_payload(order_id: &OrderId, maker_peer_id: &str, cancelled_at: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    let id_bytes = order_id.0.as_bytes();
    buf.extend_from_slice(&(id_bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(id_bytes);
    buf.extend_from_slice(&(maker_peer_id.len() as u32).to_be_bytes());
    buf.extend_from_slice(maker_peer_id.as_bytes());
    buf.extend_from_slice(&cancelled_at.to_be_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crypto::generate_keypair, orderbook::Side};

    fn sample_order(now: u64, kp: &crate::crypto::KeyPair) -> Order {
        Order::create_local(
            "alice".into(),
            "peer-alice".into(),
            kp,
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
        .unwrap()
    }

    #[test]
    fn remote_order_within_skew_is_accepted_and_listed() {
        let book = OrderBook::new();
        let kp = generate_keypair();
        let order = sample_order(1_700_000_000, &kp);
        book.accept_remote(order, &kp.public, 1_700_000_100).unwrap();
        assert_eq!(book.list(1_700_000_100).unwrap().len(), 1);
    }

    #[test]
    fn remote_order_outside_skew_window_is_rejected() {
        let book = OrderBook::new();
        let kp = generate_keypair();
        let order = sample_order(1_700_000_000, &kp);
        let result = book.accept_remote(order, &kp.public, 1_700_000_000 + 10_000);
        assert!(matches!(result, Err(OrderBookError::ConstraintViolated(_))));
    }

    #[test]
    fn cancellation_takes_precedence_over_later_announce() {
        let book = OrderBook::new();
        let kp = generate_keypair();
        let order = sample_order(1_700_000_000, &kp);
        book.accept_remote(order.clone(), &kp.public, 1_700_000_100).unwrap();

        let cancelled_at = 1_700_000_200;
        let payload = cancel_signing_payload(&order.order_id, "peer-alice", cancelled_at);
        let sig = crypto::sign(&kp.secret, &payload);
        book.cancel(order.order_id.clone(), "peer-alice", cancelled_at, &sig, &kp.public)
            .unwrap();

        // A duplicate announce for the same id arriving after the cancel
        // must not resurrect the order.
        book.accept_remote(order, &kp.public, 1_700_000_300).unwrap();
        assert_eq!(book.list(1_700_000_300).unwrap().len(), 0);
    }

    #[test]
    fn cancellation_received_before_announce_still_wins() {
        let book = OrderBook::new();
        let kp = generate_keypair();
        let order = sample_order(1_700_000_000, &kp);

        let cancelled_at = 1_700_000_050;
        let payload = cancel_signing_payload(&order.order_id, "peer-alice", cancelled_at);
        let sig = crypto::sign(&kp.secret, &payload);
        book.cancel(order.order_id.clone(), "peer-alice", cancelled_at, &sig, &kp.public)
            .unwrap();

        book.accept_remote(order, &kp.public, 1_700_000_100).unwrap();
        assert_eq!(book.list(1_700_000_100).unwrap().len(), 0);
    }

    #[test]
    fn listing_excludes_expired_orders() {
        let book = OrderBook::new();
        let kp = generate_keypair();
        let order = sample_order(1_700_000_000, &kp);
        book.accept_remote(order, &kp.public, 1_700_000_100).unwrap();
        assert_eq!(book.list(1_700_003_700).unwrap().len(), 0);
    }
}
