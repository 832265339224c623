//! P-256 key pair generation, the curve used for both ECDH (4.1's IES) and
//! ECDSA signatures. Grounded on the teacher's `utill::generate_keypair`,
//! generalized from secp256k1 to P-256 per spec.md 4.1.
//!
//! A single scalar serves both roles: [`p256::SecretKey`] is used directly
//! for Diffie-Hellman, and converted on demand into a
//! [`p256::ecdsa::SigningKey`] for signing, matching spec.md 3's "long-lived
//! signing+encryption key pair" per user/peer.

use rand_core::OsRng;

pub use p256::PublicKey;
pub use p256::SecretKey;

/// A long-lived or ephemeral signing/encryption key pair.
#[derive(Clone)]
pub struct KeyPair {
    pub public: PublicKey,
    pub secret: SecretKey,
}

impl KeyPair {
    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { public, secret }
    }
}

/// Generates a fresh random P-256 key pair.
pub fn generate_keypair() -> KeyPair {
    let secret = SecretKey::random(&mut OsRng);
    KeyPair::from_secret(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_distinct() {
        let a = generate_keypair();
        let b = generate_keypair();
        assert_ne!(a.secret.to_bytes(), b.secret.to_bytes());
    }
}
