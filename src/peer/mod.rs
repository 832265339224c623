//! Peer Directory (spec.md 4.3): maps a network peer identifier to its
//! advertised long-lived public key, learned on first handshake and updated
//! only through a signature chain (key rotation is allowed; unsigned key
//! replacement is refused).

mod directory;

pub use directory::{HelloClaim, PeerDirectory, PeerIdentity};

#[derive(Debug)]
pub enum PeerDirectoryError {
    BadSignature,
    KeyReplacementRefused,
    Poisoned,
}

impl<T> From<std::sync::PoisonError<T>> for PeerDirectoryError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

impl std::fmt::Display for PeerDirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for PeerDirectoryError {}
