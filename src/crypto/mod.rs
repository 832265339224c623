//! Cryptographic primitives used by every other component: a P-256 integrated
//! encryption scheme for authenticated messages to a recipient's long-lived
//! key (spec.md 4.1), and ECDSA-over-SHA-256 signatures for envelope
//! authorship.
//!
//! Mirrors the teacher's per-layer error-enum convention (see
//! `maker::error::MakerError`) rather than a single crate-wide error type.

mod aead;
mod keys;
mod sign;

pub use aead::{decrypt, encrypt, Envelope};
pub use keys::{generate_keypair, KeyPair, PublicKey, SecretKey};
pub use sign::{sha256, sign, verify, Signature};

/// Errors raised by the crypto layer. `AuthFailed` and `BadSignature` are
/// both non-retryable, per spec.md 4.1.
#[derive(Debug)]
pub enum CryptoError {
    /// AEAD tag mismatch on decryption.
    AuthFailed,
    /// Signature verification failed.
    BadSignature,
    /// Malformed envelope (wrong length field, truncated buffer, ...).
    Malformed(&'static str),
    /// Underlying elliptic-curve operation failed (e.g. bad scalar).
    Ec(p256::elliptic_curve::Error),
}

impl From<p256::elliptic_curve::Error> for CryptoError {
    fn from(value: p256::elliptic_curve::Error) -> Self {
        Self::Ec(value)
    }
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for CryptoError {}
