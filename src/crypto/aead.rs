//! Integrated Encryption Scheme: ECDH-derived AES-GCM-256, per spec.md 4.1.
//!
//! Encrypt: generate an ephemeral P-256 key pair, ECDH with the recipient's
//! long-lived public key, HKDF-SHA-256 the X-coordinate under a fixed context
//! string into a 32-byte symmetric key, then AES-GCM-256 with a random
//! 12-byte nonce. The envelope is self-describing:
//! `{ephemeral_public_key(65B), nonce(12B), ciphertext(var), auth_tag(16B)}`,
//! serialized as a 2-byte epk length, epk, 1-byte nonce length, nonce, 4-byte
//! big-endian ciphertext length, ciphertext, then the 16-byte tag.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use p256::ecdh::diffie_hellman;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;

use super::{CryptoError, PublicKey, SecretKey};

const HKDF_CONTEXT: &[u8] = b"otcswap-ies-v1";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A decoded IES envelope, ready for transmission or storage as the inner
/// ciphertext of a unicast wire envelope (spec.md 4.4).
#[derive(Debug, Clone)]
pub struct Envelope {
    pub ephemeral_public_key: PublicKey,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl Envelope {
    pub fn serialize(&self) -> Vec<u8> {
        let epk_bytes = self.ephemeral_public_key.to_sec1_bytes();
        let mut out = Vec::with_capacity(2 + epk_bytes.len() + 1 + NONCE_LEN + 4 + self.ciphertext.len() + TAG_LEN);
        out.extend_from_slice(&(epk_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(&epk_bytes);
        out.push(NONCE_LEN as u8);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&(self.ciphertext.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, CryptoError> {
        let mut pos = 0usize;
        let read = |pos: &mut usize, n: usize, buf: &[u8]| -> Result<Vec<u8>, CryptoError> {
            if buf.len() < *pos + n {
                return Err(CryptoError::Malformed("truncated envelope"));
            }
            let slice = buf[*pos..*pos + n].to_vec();
            *pos += n;
            Ok(slice)
        };

        if buf.len() < 2 {
            return Err(CryptoError::Malformed("missing epk length"));
        }
        let epk_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        pos += 2;
        let epk_bytes = read(&mut pos, epk_len, buf)?;
        let ephemeral_public_key = PublicKey::from_sec1_bytes(&epk_bytes)?;

        if buf.len() < pos + 1 {
            return Err(CryptoError::Malformed("missing nonce length"));
        }
        let nonce_len = buf[pos] as usize;
        pos += 1;
        if nonce_len != NONCE_LEN {
            return Err(CryptoError::Malformed("unexpected nonce length"));
        }
        let nonce_bytes = read(&mut pos, NONCE_LEN, buf)?;
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&nonce_bytes);

        if buf.len() < pos + 4 {
            return Err(CryptoError::Malformed("missing ciphertext length"));
        }
        let ct_len = u32::from_be_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]) as usize;
        pos += 4;
        let ciphertext = read(&mut pos, ct_len, buf)?;

        let tag_bytes = read(&mut pos, TAG_LEN, buf)?;
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&tag_bytes);

        Ok(Self {
            ephemeral_public_key,
            nonce,
            ciphertext,
            tag,
        })
    }
}

fn derive_symmetric_key(shared_x: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, shared_x);
    let mut okm = [0u8; 32];
    hk.expand(HKDF_CONTEXT, &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    okm
}

/// Encrypts `plaintext` for `recipient_pub` (spec.md 4.1 encryption).
pub fn encrypt(recipient_pub: &PublicKey, plaintext: &[u8]) -> Result<Envelope, CryptoError> {
    let ephemeral = SecretKey::random(&mut OsRng);
    let ephemeral_public_key = ephemeral.public_key();

    let shared = diffie_hellman(ephemeral.to_nonzero_scalar(), recipient_pub.as_affine());
    let key_bytes = derive_symmetric_key(shared.raw_secret_bytes().as_slice());

    let cipher = Aes256Gcm::new_from_slice(&key_bytes).expect("32-byte key is valid for AES-256-GCM");
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut combined = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::AuthFailed)?;
    let tag_bytes = combined.split_off(combined.len() - TAG_LEN);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&tag_bytes);

    Ok(Envelope {
        ephemeral_public_key,
        nonce: nonce_bytes,
        ciphertext: combined,
        tag,
    })
}

/// Decrypts an [`Envelope`] with the recipient's long-lived secret key.
/// Fails with [`CryptoError::AuthFailed`] on tag mismatch (spec.md 4.1).
pub fn decrypt(recipient_secret: &SecretKey, envelope: &Envelope) -> Result<Vec<u8>, CryptoError> {
    let shared = diffie_hellman(
        recipient_secret.to_nonzero_scalar(),
        envelope.ephemeral_public_key.as_affine(),
    );
    let key_bytes = derive_symmetric_key(shared.raw_secret_bytes().as_slice());

    let cipher = Aes256Gcm::new_from_slice(&key_bytes).expect("32-byte key is valid for AES-256-GCM");
    let nonce = Nonce::from_slice(&envelope.nonce);

    let mut combined = Vec::with_capacity(envelope.ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(&envelope.ciphertext);
    combined.extend_from_slice(&envelope.tag);

    cipher
        .decrypt(nonce, combined.as_slice())
        .map_err(|_| CryptoError::AuthFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_keypair;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let recipient = generate_keypair();
        let plaintext = b"propose: amount=10000 price=27.5";
        let envelope = encrypt(&recipient.public, plaintext).unwrap();
        let recovered = decrypt(&recipient.secret, &envelope).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn flipping_a_ciphertext_byte_fails_auth() {
        let recipient = generate_keypair();
        let mut envelope = encrypt(&recipient.public, b"hello").unwrap();
        envelope.ciphertext[0] ^= 0xFF;
        assert!(matches!(
            decrypt(&recipient.secret, &envelope),
            Err(CryptoError::AuthFailed)
        ));
    }

    #[test]
    fn flipping_the_tag_fails_auth() {
        let recipient = generate_keypair();
        let mut envelope = encrypt(&recipient.public, b"hello").unwrap();
        envelope.tag[0] ^= 0xFF;
        assert!(matches!(
            decrypt(&recipient.secret, &envelope),
            Err(CryptoError::AuthFailed)
        ));
    }

    #[test]
    fn serialize_round_trip_preserves_envelope() {
        let recipient = generate_keypair();
        let envelope = encrypt(&recipient.public, b"round trip me").unwrap();
        let bytes = envelope.serialize();
        let decoded = Envelope::deserialize(&bytes).unwrap();
        let recovered = decrypt(&recipient.secret, &decoded).unwrap();
        assert_eq!(recovered, b"round trip me");
    }

    #[test]
    fn wrong_recipient_key_fails_auth() {
        let recipient = generate_keypair();
        let other = generate_keypair();
        let envelope = encrypt(&recipient.public, b"hello").unwrap();
        assert!(matches!(
            decrypt(&other.secret, &envelope),
            Err(CryptoError::AuthFailed)
        ));
    }
}
