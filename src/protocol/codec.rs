//! Length-prefixed framing over a stream transport (spec.md 4.4): a 4-byte
//! big-endian length (<= 16 MiB) followed by the encoded envelope. Oversized
//! or undecodable frames terminate the connection with `ProtocolError`,
//! mirroring the teacher's `maker::read_taker_message` / RPC framing, but
//! generalized from length-prefixed CBOR to length-prefixed tagged
//! envelopes.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{envelope::WireEnvelope, ProtocolError};

/// Maximum frame length, per spec.md 4.4.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Writes one framed envelope.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, envelope: &WireEnvelope) -> Result<(), ProtocolError> {
    let body = envelope.encode();
    if body.len() as u64 > MAX_FRAME_LEN as u64 {
        return Err(ProtocolError::FrameTooLarge);
    }
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one framed envelope. Returns `Ok(None)` on a clean EOF between
/// frames (connection closed by peer); any other malformed input or
/// above-limit length is a `ProtocolError` that should terminate the
/// connection (spec.md 4.4).
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<WireEnvelope>, ProtocolError> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge);
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    let envelope = WireEnvelope::decode(&buf)?;
    Ok(Some(envelope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::{generate_keypair, sign},
        protocol::EnvelopeKind,
    };

    #[tokio::test]
    async fn frame_round_trips_over_an_in_memory_duplex() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let kp = generate_keypair();
        let payload = b"order-announce".to_vec();
        let signature = sign(&kp.secret, &payload);
        let envelope = WireEnvelope::broadcast(EnvelopeKind::OrderAnnounce, payload, signature);

        write_frame(&mut client, &envelope).await.unwrap();
        let decoded = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(decoded.kind, EnvelopeKind::OrderAnnounce);
    }

    #[tokio::test]
    async fn clean_close_yields_none() {
        let (client, mut server) = tokio::io::duplex(4096);
        drop(client);
        let result = read_frame(&mut server).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(8);
        client.write_all(&(MAX_FRAME_LEN + 1).to_be_bytes()).await.unwrap();
        let result = read_frame(&mut server).await;
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge)));
    }
}
