//! The [`User`] entity (spec.md 3): unique username, salted slow-KDF password
//! verifier, long-lived key pair, creation timestamp.

use pbkdf2::pbkdf2_hmac;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::crypto::KeyPair;

const SALT_LEN: usize = 16;
const KDF_OUTPUT_LEN: usize = 32;
const KDF_ITERATIONS: u32 = 600_000;

/// A registered user account. The key pair is the user's long-lived
/// signing/encryption identity (spec.md 3); the node holds it on the user's
/// behalf to sign orders/proposals and decrypt inbound negotiation messages.
pub struct User {
    pub username: String,
    pub(super) salt: [u8; SALT_LEN],
    pub(super) verifier: [u8; KDF_OUTPUT_LEN],
    pub key_pair: KeyPair,
    pub created_at: u64,
}

impl User {
    pub fn register(username: impl Into<String>, password: &str, key_pair: KeyPair, created_at: u64) -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let verifier = derive_verifier(password, &salt);
        Self {
            username: username.into(),
            salt,
            verifier,
            key_pair,
            created_at,
        }
    }

    /// Constant-time password check, per spec.md 4.2 and the "Auth
    /// round-trip" testable property in spec.md 8.
    pub fn verify_password(&self, password: &str) -> bool {
        let candidate = derive_verifier(password, &self.salt);
        candidate.ct_eq(&self.verifier).into()
    }
}

fn derive_verifier(password: &str, salt: &[u8; SALT_LEN]) -> [u8; KDF_OUTPUT_LEN] {
    let mut out = [0u8; KDF_OUTPUT_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, KDF_ITERATIONS, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_keypair;

    #[test]
    fn correct_password_verifies() {
        let user = User::register("alice", "correct horse battery staple", generate_keypair(), 0);
        assert!(user.verify_password("correct horse battery staple"));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let user = User::register("alice", "correct horse battery staple", generate_keypair(), 0);
        assert!(!user.verify_password("wrong password"));
    }
}
