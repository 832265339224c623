//! Local-network peer discovery: a periodic UDP broadcast probe on a
//! configured port, standing in for internet-scale discovery which is out
//! of scope entirely. Grounded on the periodic re-announce-on-a-timer shape,
//! generalized from a centralized directory refresh to a connectionless LAN
//! broadcast with no central server.

use std::time::Duration;

use tokio::{net::UdpSocket, time};

/// Payload broadcast on the discovery port: just enough for a listener to
/// dial the advertiser back over the regular gossip transport.
#[derive(Clone, Debug)]
pub struct DiscoveryProbe {
    pub peer_id: String,
    pub listen_port: u16,
}

impl DiscoveryProbe {
    fn encode(&self) -> Vec<u8> {
        format!("otcswap-discover:{}:{}", self.peer_id, self.listen_port).into_bytes()
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(bytes).ok()?;
        let mut parts = text.strip_prefix("otcswap-discover:")?.splitn(2, ':');
        let peer_id = parts.next()?.to_string();
        let listen_port: u16 = parts.next()?.parse().ok()?;
        Some(Self { peer_id, listen_port })
    }
}

/// Periodically broadcasts this node's presence on `discovery_port` until
/// cancelled. Intended to run as a background task alongside the accept loop.
pub async fn announce_loop(
    probe: DiscoveryProbe,
    discovery_port: u16,
    interval: Duration,
    cancel: tokio::sync::watch::Receiver<bool>,
) -> std::io::Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    socket.set_broadcast(true)?;
    let mut cancel = cancel;
    let mut ticker = time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let bytes = probe.encode();
                let _ = socket.send_to(&bytes, ("255.255.255.255", discovery_port)).await;
            }
            _ = cancel.changed() => {
                if *cancel.borrow() {
                    return Ok(());
                }
            }
        }
    }
}

/// Listens on `discovery_port` for probes from other local peers, invoking
/// `on_peer` for each distinct advertiser heard.
pub async fn listen_loop(
    discovery_port: u16,
    self_peer_id: String,
    on_peer: impl Fn(DiscoveryProbe),
) -> std::io::Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", discovery_port)).await?;
    let mut buf = [0u8; 512];
    loop {
        let (len, _) = socket.recv_from(&mut buf).await?;
        if let Some(probe) = DiscoveryProbe::decode(&buf[..len]) {
            if probe.peer_id != self_peer_id {
                on_peer(probe);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_round_trips_through_wire_encoding() {
        let probe = DiscoveryProbe {
            peer_id: "peer-7".into(),
            listen_port: 9000,
        };
        let decoded = DiscoveryProbe::decode(&probe.encode()).unwrap();
        assert_eq!(decoded.peer_id, "peer-7");
        assert_eq!(decoded.listen_port, 9000);
    }

    #[test]
    fn malformed_probe_is_rejected() {
        assert!(DiscoveryProbe::decode(b"not-a-probe").is_none());
    }
}
