//! The tagged envelope sum type. A one-byte kind discriminator plus a
//! versioned, kind-specific body (spec.md 4.4).

use crate::crypto::{self, PublicKey, Signature};

use super::ProtocolError;

pub const ENVELOPE_VERSION: u8 = 1;
const SIG_LEN: usize = 64;

/// Content-addressed identity of an envelope, used for gossip dedup
/// (spec.md 4.5: "envelope id = digest of the canonical serialization").
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EnvelopeId(pub [u8; 32]);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EnvelopeKind {
    Hello,
    OrderAnnounce,
    OrderCancel,
    GossipAck,
    Request,
    Proposal,
    Decision,
}

impl EnvelopeKind {
    fn to_byte(self) -> u8 {
        match self {
            Self::Hello => 0,
            Self::OrderAnnounce => 1,
            Self::OrderCancel => 2,
            Self::GossipAck => 3,
            Self::Request => 4,
            Self::Proposal => 5,
            Self::Decision => 6,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        Ok(match byte {
            0 => Self::Hello,
            1 => Self::OrderAnnounce,
            2 => Self::OrderCancel,
            3 => Self::GossipAck,
            4 => Self::Request,
            5 => Self::Proposal,
            6 => Self::Decision,
            other => return Err(ProtocolError::UnknownKind(other)),
        })
    }

    /// Broadcast kinds carry a plaintext payload and a detached signature;
    /// unicast kinds carry an opaque IES ciphertext (spec.md 4.4).
    pub fn is_broadcast(self) -> bool {
        matches!(self, Self::OrderAnnounce | Self::OrderCancel | Self::GossipAck)
    }
}

pub enum EnvelopeBody {
    /// Peer handshake: advertised key, proof of possession, and — only when
    /// rotating — a signature over the new key from the previous one
    /// (spec.md 4.3).
    Hello {
        public_key: PublicKey,
        self_signature: Signature,
        rotation_signature: Option<Signature>,
    },
    /// Broadcast envelope: plaintext application payload plus a detached
    /// signature over it (spec.md 4.4).
    Plaintext { payload: Vec<u8>, signature: Signature },
    /// Unicast envelope: opaque IES ciphertext bytes plus an outer signature
    /// over the ciphertext, so non-recipients can still verify authorship
    /// (spec.md 4.4).
    Encrypted {
        ciphertext: Vec<u8>,
        outer_signature: Signature,
    },
}

pub struct WireEnvelope {
    pub kind: EnvelopeKind,
    pub version: u8,
    pub body: EnvelopeBody,
}

impl WireEnvelope {
    pub fn hello(public_key: PublicKey, self_signature: Signature, rotation_signature: Option<Signature>) -> Self {
        Self {
            kind: EnvelopeKind::Hello,
            version: ENVELOPE_VERSION,
            body: EnvelopeBody::Hello {
                public_key,
                self_signature,
                rotation_signature,
            },
        }
    }

    pub fn broadcast(kind: EnvelopeKind, payload: Vec<u8>, signature: Signature) -> Self {
        debug_assert!(kind.is_broadcast());
        Self {
            kind,
            version: ENVELOPE_VERSION,
            body: EnvelopeBody::Plaintext { payload, signature },
        }
    }

    pub fn unicast(kind: EnvelopeKind, ciphertext: Vec<u8>, outer_signature: Signature) -> Self {
        debug_assert!(!kind.is_broadcast() && kind != EnvelopeKind::Hello);
        Self {
            kind,
            version: ENVELOPE_VERSION,
            body: EnvelopeBody::Encrypted {
                ciphertext,
                outer_signature,
            },
        }
    }

    /// Serializes this envelope into the bytes carried inside one frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.kind.to_byte(), self.version];
        match &self.body {
            EnvelopeBody::Hello {
                public_key,
                self_signature,
                rotation_signature,
            } => {
                let key_bytes = public_key.to_sec1_bytes();
                out.extend_from_slice(&(key_bytes.len() as u16).to_be_bytes());
                out.extend_from_slice(&key_bytes);
                out.extend_from_slice(self_signature);
                match rotation_signature {
                    Some(sig) => {
                        out.push(1);
                        out.extend_from_slice(sig);
                    }
                    None => out.push(0),
                }
            }
            EnvelopeBody::Plaintext { payload, signature } => {
                out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
                out.extend_from_slice(payload);
                out.extend_from_slice(signature);
            }
            EnvelopeBody::Encrypted {
                ciphertext,
                outer_signature,
            } => {
                out.extend_from_slice(&(ciphertext.len() as u32).to_be_bytes());
                out.extend_from_slice(ciphertext);
                out.extend_from_slice(outer_signature);
            }
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < 2 {
            return Err(ProtocolError::Truncated("missing kind/version"));
        }
        let kind = EnvelopeKind::from_byte(buf[0])?;
        let version = buf[1];
        let rest = &buf[2..];

        let body = if kind == EnvelopeKind::Hello {
            if rest.len() < 2 {
                return Err(ProtocolError::Truncated("missing pubkey length"));
            }
            let key_len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
            let mut pos = 2;
            if rest.len() < pos + key_len {
                return Err(ProtocolError::Truncated("truncated pubkey"));
            }
            let public_key = PublicKey::from_sec1_bytes(&rest[pos..pos + key_len])
                .map_err(|_| ProtocolError::Decode("bad pubkey encoding"))?;
            pos += key_len;

            if rest.len() < pos + SIG_LEN + 1 {
                return Err(ProtocolError::Truncated("truncated self signature"));
            }
            let mut self_signature = [0u8; SIG_LEN];
            self_signature.copy_from_slice(&rest[pos..pos + SIG_LEN]);
            pos += SIG_LEN;

            let has_rotation = rest[pos] == 1;
            pos += 1;
            let rotation_signature = if has_rotation {
                if rest.len() < pos + SIG_LEN {
                    return Err(ProtocolError::Truncated("truncated rotation signature"));
                }
                let mut sig = [0u8; SIG_LEN];
                sig.copy_from_slice(&rest[pos..pos + SIG_LEN]);
                Some(sig)
            } else {
                None
            };

            EnvelopeBody::Hello {
                public_key,
                self_signature,
                rotation_signature,
            }
        } else if kind.is_broadcast() {
            if rest.len() < 4 {
                return Err(ProtocolError::Truncated("missing payload length"));
            }
            let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
            let mut pos = 4;
            if rest.len() < pos + len + SIG_LEN {
                return Err(ProtocolError::Truncated("truncated broadcast body"));
            }
            let payload = rest[pos..pos + len].to_vec();
            pos += len;
            let mut signature = [0u8; SIG_LEN];
            signature.copy_from_slice(&rest[pos..pos + SIG_LEN]);
            EnvelopeBody::Plaintext { payload, signature }
        } else {
            if rest.len() < 4 {
                return Err(ProtocolError::Truncated("missing ciphertext length"));
            }
            let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
            let mut pos = 4;
            if rest.len() < pos + len + SIG_LEN {
                return Err(ProtocolError::Truncated("truncated unicast body"));
            }
            let ciphertext = rest[pos..pos + len].to_vec();
            pos += len;
            let mut outer_signature = [0u8; SIG_LEN];
            outer_signature.copy_from_slice(&rest[pos..pos + SIG_LEN]);
            EnvelopeBody::Encrypted {
                ciphertext,
                outer_signature,
            }
        };

        Ok(Self { kind, version, body })
    }

    /// The content-addressed envelope id used for gossip dedup (spec.md 4.5).
    pub fn id(&self) -> EnvelopeId {
        EnvelopeId(crypto::sha256(&self.encode()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_keypair, sign};

    #[test]
    fn hello_round_trips() {
        let kp = generate_keypair();
        let key_bytes = kp.public.to_sec1_bytes();
        let sig = sign(&kp.secret, &key_bytes);
        let envelope = WireEnvelope::hello(kp.public.clone(), sig, None);
        let bytes = envelope.encode();
        let decoded = WireEnvelope::decode(&bytes).unwrap();
        assert_eq!(decoded.kind, EnvelopeKind::Hello);
        match decoded.body {
            EnvelopeBody::Hello { public_key, .. } => {
                assert_eq!(public_key.to_sec1_bytes(), kp.public.to_sec1_bytes())
            }
            _ => panic!("wrong body"),
        }
    }

    #[test]
    fn broadcast_round_trips_and_ids_match_for_identical_content() {
        let kp = generate_keypair();
        let payload = b"order-announce-payload".to_vec();
        let sig = sign(&kp.secret, &payload);
        let e1 = WireEnvelope::broadcast(EnvelopeKind::OrderAnnounce, payload.clone(), sig);
        let e2 = WireEnvelope::broadcast(EnvelopeKind::OrderAnnounce, payload, sig);
        assert_eq!(e1.id().0, e2.id().0);

        let decoded = WireEnvelope::decode(&e1.encode()).unwrap();
        match decoded.body {
            EnvelopeBody::Plaintext { payload, .. } => assert_eq!(payload, b"order-announce-payload"),
            _ => panic!("wrong body"),
        }
    }

    #[test]
    fn unknown_kind_byte_is_rejected() {
        let bytes = vec![99, ENVELOPE_VERSION];
        assert!(matches!(
            WireEnvelope::decode(&bytes),
            Err(ProtocolError::UnknownKind(99))
        ));
    }
}
