//! The mesh of currently connected peers and the two operations it exposes:
//! flood `Broadcast` with dedup, and direct `Send` with `NoRoute` on a
//! disconnected peer (spec.md 4.5). No store-and-forward: a peer that is not
//! currently connected never receives a queued retry.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, RwLock,
    },
};

use tokio::sync::mpsc;

use crate::protocol::WireEnvelope;

use super::{dedup::DedupWindow, GossipError};

/// Bound on the per-peer outbound gossip queue; a full queue drops the
/// envelope (counted) rather than blocking, to preserve overlay liveness
/// (spec.md 5).
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

pub struct GossipOverlay {
    connections: RwLock<HashMap<String, mpsc::Sender<WireEnvelope>>>,
    dedup: Mutex<DedupWindow>,
    dropped: AtomicU64,
}

impl GossipOverlay {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            dedup: Mutex::new(DedupWindow::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Registers a connected peer's outbound queue, replacing any prior one.
    pub fn register_peer(&self, peer_id: String, sender: mpsc::Sender<WireEnvelope>) {
        self.connections.write().unwrap().insert(peer_id, sender);
    }

    pub fn remove_peer(&self, peer_id: &str) {
        self.connections.write().unwrap().remove(peer_id);
    }

    pub fn is_connected(&self, peer_id: &str) -> bool {
        self.connections.read().unwrap().contains_key(peer_id)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Floods `envelope` to every connected peer except `exclude` (the peer
    /// it was received from, if any). Returns `true` if this is the first
    /// time the envelope's id has been seen, which tells the caller whether
    /// to also deliver it to local handlers.
    pub fn broadcast(&self, envelope: WireEnvelope, exclude: Option<&str>) -> bool {
        let first_seen = self.dedup.lock().unwrap().insert_if_new(envelope.id());
        if !first_seen {
            return false;
        }
        let connections = self.connections.read().unwrap();
        for (peer_id, sender) in connections.iter() {
            if Some(peer_id.as_str()) == exclude {
                continue;
            }
            if sender.try_send(clone_envelope(&envelope)).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        true
    }

    /// Sends directly to one peer; `NoRoute` if it is not currently
    /// connected (spec.md 4.5: no store-and-forward).
    pub fn send(&self, peer_id: &str, envelope: WireEnvelope) -> Result<(), GossipError> {
        let connections = self.connections.read().unwrap();
        let sender = connections.get(peer_id).ok_or(GossipError::NoRoute)?;
        if sender.try_send(envelope).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

impl Default for GossipOverlay {
    fn default() -> Self {
        Self::new()
    }
}

fn clone_envelope(envelope: &WireEnvelope) -> WireEnvelope {
    WireEnvelope::decode(&envelope.encode()).expect("re-decoding a just-encoded envelope cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::{generate_keypair, sign},
        protocol::EnvelopeKind,
    };

    fn sample_envelope() -> WireEnvelope {
        let kp = generate_keypair();
        let payload = b"hello-overlay".to_vec();
        let sig = sign(&kp.secret, &payload);
        WireEnvelope::broadcast(EnvelopeKind::OrderAnnounce, payload, sig)
    }

    #[test]
    fn send_to_unconnected_peer_fails_no_route() {
        let overlay = GossipOverlay::new();
        let result = overlay.send("ghost", sample_envelope());
        assert!(matches!(result, Err(GossipError::NoRoute)));
    }

    #[tokio::test]
    async fn broadcast_delivers_to_all_peers_except_sender_and_dedups() {
        let overlay = GossipOverlay::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        overlay.register_peer("a".into(), tx_a);
        overlay.register_peer("b".into(), tx_b);

        let envelope = sample_envelope();
        let id = envelope.id();
        let first = overlay.broadcast(clone_envelope(&envelope), Some("a"));
        assert!(first);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap().id().0, id.0);

        let second = overlay.broadcast(envelope, Some("a"));
        assert!(!second, "duplicate envelope id must not re-broadcast");
    }
}
