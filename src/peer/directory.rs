//! Peer directory storage and the Hello-handshake verification rule.

use std::{
    collections::HashMap,
    sync::RwLock,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::crypto::{self, PublicKey, Signature};

use super::PeerDirectoryError;

/// A known peer's current key material and last contact time (spec.md 3).
#[derive(Clone)]
pub struct PeerIdentity {
    pub peer_id: String,
    pub public_key: PublicKey,
    pub last_seen_at: u64,
}

/// A claim made by an inbound `Hello` envelope (spec.md 4.3, 6): the
/// advertised public key, a self-signature proving possession of it, and —
/// only when the peer is rotating keys — a signature over the new key made
/// by the previously-known key.
pub struct HelloClaim {
    pub peer_id: String,
    pub public_key: PublicKey,
    pub self_signature: Signature,
    pub rotation_signature: Option<Signature>,
}

#[derive(Default)]
pub struct PeerDirectory {
    peers: RwLock<HashMap<String, PeerIdentity>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes an inbound `Hello`. Verifies the self-signature; if the
    /// peer is already known, the new key must equal the stored key or carry
    /// a valid rotation signature from it. Otherwise the update is refused.
    pub fn handle_hello(&self, claim: &HelloClaim) -> Result<(), PeerDirectoryError> {
        let key_bytes = claim.public_key.to_sec1_bytes();
        crypto::verify(&claim.public_key, &key_bytes, &claim.self_signature)
            .map_err(|_| PeerDirectoryError::BadSignature)?;

        let mut peers = self.peers.write()?;
        if let Some(existing) = peers.get(&claim.peer_id) {
            let same_key = existing.public_key.to_sec1_bytes() == key_bytes;
            if !same_key {
                let rotation_ok = claim
                    .rotation_signature
                    .as_ref()
                    .map(|sig| crypto::verify(&existing.public_key, &key_bytes, sig).is_ok())
                    .unwrap_or(false);
                if !rotation_ok {
                    return Err(PeerDirectoryError::KeyReplacementRefused);
                }
            }
        }

        peers.insert(
            claim.peer_id.clone(),
            PeerIdentity {
                peer_id: claim.peer_id.clone(),
                public_key: claim.public_key.clone(),
                last_seen_at: now(),
            },
        );
        Ok(())
    }

    /// Looks up a peer's current encryption/verification key.
    pub fn lookup(&self, peer_id: &str) -> Result<Option<PublicKey>, PeerDirectoryError> {
        Ok(self.peers.read()?.get(peer_id).map(|p| p.public_key.clone()))
    }

    /// Every peer this node has completed a handshake with, for the `query
    /// peers` surface (SPEC_FULL.md 6).
    pub fn list(&self) -> Result<Vec<PeerIdentity>, PeerDirectoryError> {
        Ok(self.peers.read()?.values().cloned().collect())
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_keypair, sign};

    fn self_signed_claim(peer_id: &str, kp: &crate::crypto::KeyPair) -> HelloClaim {
        let key_bytes = kp.public.to_sec1_bytes();
        HelloClaim {
            peer_id: peer_id.to_string(),
            public_key: kp.public.clone(),
            self_signature: sign(&kp.secret, &key_bytes),
            rotation_signature: None,
        }
    }

    #[test]
    fn first_hello_is_accepted() {
        let dir = PeerDirectory::new();
        let kp = generate_keypair();
        dir.handle_hello(&self_signed_claim("peer-1", &kp)).unwrap();
        assert!(dir.lookup("peer-1").unwrap().is_some());
    }

    #[test]
    fn key_replacement_without_signature_chain_is_refused() {
        let dir = PeerDirectory::new();
        let kp1 = generate_keypair();
        let kp2 = generate_keypair();
        dir.handle_hello(&self_signed_claim("peer-1", &kp1)).unwrap();

        let forged = self_signed_claim("peer-1", &kp2);
        assert!(matches!(
            dir.handle_hello(&forged),
            Err(PeerDirectoryError::KeyReplacementRefused)
        ));
    }

    #[test]
    fn signed_key_rotation_is_accepted() {
        let dir = PeerDirectory::new();
        let kp1 = generate_keypair();
        let kp2 = generate_keypair();
        dir.handle_hello(&self_signed_claim("peer-1", &kp1)).unwrap();

        let new_key_bytes = kp2.public.to_sec1_bytes();
        let rotation_signature = sign(&kp1.secret, &new_key_bytes);
        let mut claim = self_signed_claim("peer-1", &kp2);
        claim.rotation_signature = Some(rotation_signature);
        dir.handle_hello(&claim).unwrap();

        let stored = dir.lookup("peer-1").unwrap().unwrap();
        assert_eq!(stored.to_sec1_bytes(), kp2.public.to_sec1_bytes());
    }
}
