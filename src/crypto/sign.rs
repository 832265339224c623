//! ECDSA-over-SHA-256 signatures (spec.md 4.1). Digest, sign with the user's
//! long-lived signing key, and serialize `(r,s)` as a fixed-length
//! big-endian concatenation. Verification recomputes the digest.

use p256::ecdsa::{
    signature::{Signer, Verifier},
    SigningKey, VerifyingKey,
};
use sha2::{Digest, Sha256};

use super::{CryptoError, PublicKey, SecretKey};

/// A serialized `(r,s)` signature: 64 bytes, fixed-width big-endian.
pub type Signature = [u8; 64];

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Signs `payload` with `secret`. The payload is hashed with SHA-256
/// internally by the ECDSA implementation before signing.
pub fn sign(secret: &SecretKey, payload: &[u8]) -> Signature {
    let signing_key = SigningKey::from_bytes(&secret.to_bytes()).expect("valid P-256 scalar");
    let sig: p256::ecdsa::Signature = signing_key.sign(payload);
    sig.to_bytes().into()
}

/// Verifies `signature` over `payload` under `public`. Fails with
/// [`CryptoError::BadSignature`] on any mismatch — non-retryable, per
/// spec.md 4.1.
pub fn verify(public: &PublicKey, payload: &[u8], signature: &Signature) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::from_sec1_bytes(&public.to_sec1_bytes())
        .map_err(|_| CryptoError::BadSignature)?;
    let sig = p256::ecdsa::Signature::from_slice(signature).map_err(|_| CryptoError::BadSignature)?;
    verifying_key
        .verify(payload, &sig)
        .map_err(|_| CryptoError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_keypair;

    #[test]
    fn sign_verify_round_trip() {
        let kp = generate_keypair();
        let msg = b"order: SELL 10000 ZEC for STRK @ 25.0-30.0";
        let sig = sign(&kp.secret, msg);
        assert!(verify(&kp.public, msg, &sig).is_ok());
    }

    #[test]
    fn forged_signature_under_wrong_key_fails() {
        let a = generate_keypair();
        let b = generate_keypair();
        let msg = b"order-announce";
        let sig = sign(&b.secret, msg);
        assert!(matches!(verify(&a.public, msg, &sig), Err(CryptoError::BadSignature)));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let kp = generate_keypair();
        let sig = sign(&kp.secret, b"amount=100");
        assert!(matches!(
            verify(&kp.public, b"amount=900", &sig),
            Err(CryptoError::BadSignature)
        ));
    }
}
