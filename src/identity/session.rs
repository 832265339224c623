//! The [`Session`] entity (spec.md 3): opaque bearer token, issued-at,
//! expires-at, advisory peer address. Possession of the token is
//! authorization — there is no additional scoping.

use rand_core::{OsRng, RngCore};

pub type SessionToken = String;

#[derive(Clone, Debug)]
pub struct Session {
    pub username: String,
    pub issued_at: u64,
    pub expires_at: u64,
    pub peer_addr: Option<String>,
}

impl Session {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Generates a random 32-byte session token, hex-encoded, per spec.md 4.2.
pub fn generate_token() -> SessionToken {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
