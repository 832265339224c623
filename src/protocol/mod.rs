//! Wire Codec & Transport (spec.md 4.4): a length-prefixed frame on a stream
//! transport carrying a tagged envelope. Broadcast envelopes carry plaintext
//! payloads with a detached signature; unicast envelopes carry an opaque IES
//! ciphertext with an outer signature over it, so non-recipients can still
//! verify authorship and dedup (spec.md 4.4, 4.5).

mod codec;
mod envelope;
pub mod messages;

pub use codec::{read_frame, write_frame, MAX_FRAME_LEN};
pub use envelope::{EnvelopeBody, EnvelopeId, EnvelopeKind, WireEnvelope};

#[derive(Debug)]
pub enum ProtocolError {
    FrameTooLarge,
    Truncated(&'static str),
    UnknownKind(u8),
    Decode(&'static str),
    Io(std::io::Error),
}

impl From<std::io::Error> for ProtocolError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_cbor::Error> for ProtocolError {
    fn from(_: serde_cbor::Error) -> Self {
        Self::Decode("cbor payload decode failed")
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for ProtocolError {}
