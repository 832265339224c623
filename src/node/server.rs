//! The node's network surface: the gossip accept loop, outbound dial-out,
//! LAN discovery wiring, the dispatch loop, Taker-side settlement
//! self-initiation, and HTTP gateway startup — everything spawned from
//! `run` to bring one node process to life (spec.md 4.3, 4.5, 4.10, 6, 9).

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf},
    net::{TcpListener, TcpStream},
    sync::{mpsc, watch},
};

use crate::{
    crypto,
    error::CoreError,
    gossip::discovery::{self, DiscoveryProbe},
    protocol::{read_frame, write_frame, EnvelopeKind, WireEnvelope},
};

use super::{dispatcher, handle::Node};

/// Brings up every background task for one node process and blocks until
/// the HTTP server exits (normally never, outside of a shutdown signal).
pub async fn run(node: Arc<Node>) -> std::io::Result<()> {
    let (dispatch_tx, dispatch_rx) = mpsc::channel::<(WireEnvelope, Option<String>)>(1024);

    tokio::spawn(dispatch_loop(node.clone(), dispatch_rx));
    tokio::spawn(settlement_self_initiate_loop(node.clone()));

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let discovery_probe = DiscoveryProbe {
        peer_id: node.peer_id.clone(),
        listen_port: node.config.port,
    };
    let discovery_port = node.config.discovery_port;
    tokio::spawn(discovery::announce_loop(discovery_probe, discovery_port, Duration::from_secs(30), cancel_rx));

    {
        let node = node.clone();
        let dispatch_tx = dispatch_tx.clone();
        tokio::spawn(async move {
            let on_peer = |probe: DiscoveryProbe| {
                let node = node.clone();
                let dispatch_tx = dispatch_tx.clone();
                tokio::spawn(async move {
                    if node.gossip.is_connected(&probe.peer_id) {
                        return;
                    }
                    let addr = format!("127.0.0.1:{}", probe.listen_port);
                    if let Err(e) = connect_peer(node, addr, dispatch_tx).await {
                        log::warn!("discovery dial to {} failed: {e}", probe.listen_port);
                    }
                });
            };
            if let Err(e) = discovery::listen_loop(discovery_port, node.peer_id.clone(), on_peer).await {
                log::warn!("discovery listener exited: {e}");
            }
        });
    }

    if let Some(bootstrap) = node.config.bootstrap_peer.clone() {
        let node = node.clone();
        let dispatch_tx = dispatch_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = connect_peer(node, bootstrap.clone(), dispatch_tx).await {
                log::warn!("bootstrap dial to {bootstrap} failed: {e}");
            }
        });
    }

    let listener = TcpListener::bind(("0.0.0.0", node.config.port)).await?;
    log::info!("gossip listener bound on port {}", node.config.port);
    {
        let node = node.clone();
        let dispatch_tx = dispatch_tx.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        let node = node.clone();
                        let dispatch_tx = dispatch_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(node, stream, dispatch_tx).await {
                                log::debug!("connection from {peer_addr} ended: {e}");
                            }
                        });
                    }
                    Err(e) => log::warn!("accept failed: {e}"),
                }
            }
        });
    }

    let http_addr: SocketAddr = ([0, 0, 0, 0], node.config.http_port).into();
    crate::http::serve(node, http_addr).await
}

/// Dials a peer and hands the resulting stream to the same connection
/// machinery the accept loop uses, so an outbound dial and an inbound
/// connection are indistinguishable once established.
async fn connect_peer(
    node: Arc<Node>,
    addr: String,
    dispatch_tx: mpsc::Sender<(WireEnvelope, Option<String>)>,
) -> std::io::Result<()> {
    let stream = TcpStream::connect(&addr).await?;
    handle_connection(node, stream, dispatch_tx).await
}

/// Owns one peer connection for its lifetime: sends our own `Hello` first,
/// registers an outbound queue with the gossip overlay, then alternates
/// between forwarding inbound frames to the dispatch loop and draining the
/// outbound queue to the socket.
async fn handle_connection(
    node: Arc<Node>,
    stream: TcpStream,
    dispatch_tx: mpsc::Sender<(WireEnvelope, Option<String>)>,
) -> std::io::Result<()> {
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = read_half;
    let mut writer = write_half;

    let hello = local_hello(&node);
    write_frame(&mut writer, &hello)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<WireEnvelope>(crate::gossip::OUTBOUND_QUEUE_CAPACITY);
    let mut registered_peer_id: Option<String> = None;

    let writer_task = tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            if write_frame(&mut writer, &envelope).await.is_err() {
                break;
            }
        }
    });

    let result = read_connection(&node, &mut reader, &outbound_tx, &dispatch_tx, &mut registered_peer_id).await;

    if let Some(peer_id) = registered_peer_id {
        node.gossip.remove_peer(&peer_id);
    }
    drop(outbound_tx);
    let _ = writer_task.await;
    result
}

async fn read_connection(
    node: &Arc<Node>,
    reader: &mut ReadHalf<TcpStream>,
    outbound_tx: &mpsc::Sender<WireEnvelope>,
    dispatch_tx: &mpsc::Sender<(WireEnvelope, Option<String>)>,
    registered_peer_id: &mut Option<String>,
) -> std::io::Result<()> {
    loop {
        let envelope = match read_frame(reader).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return Ok(()),
            Err(e) => return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        };

        if envelope.kind == EnvelopeKind::Hello {
            if let crate::protocol::EnvelopeBody::Hello { ref public_key, .. } = envelope.body {
                let peer_id = hex::encode(crypto::sha256(&public_key.to_sec1_bytes()));
                node.gossip.register_peer(peer_id.clone(), outbound_tx.clone());
                *registered_peer_id = peer_id.clone().into();
                let _ = dispatch_tx.send((envelope, None)).await;
                continue;
            }
        }

        if envelope.kind.is_broadcast() {
            // `broadcast` consumes its argument; re-decode a fresh copy so the
            // original can still reach the dispatch loop for local handling.
            let relay = WireEnvelope::decode(&envelope.encode())
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
            node.gossip.broadcast(relay, registered_peer_id.as_deref());
        }

        let _ = dispatch_tx.send((envelope, registered_peer_id.clone())).await;
    }
}

fn local_hello(node: &Node) -> WireEnvelope {
    let key_bytes = node.peer_key_pair.public.to_sec1_bytes();
    let self_signature = crypto::sign(&node.peer_key_pair.secret, &key_bytes);
    WireEnvelope::hello(node.peer_key_pair.public.clone(), self_signature, None)
}

/// Single consumer of every dispatched envelope, whether it arrived fresh
/// off the wire or was replayed by the overlay's rebroadcast (spec.md 4.4).
async fn dispatch_loop(node: Arc<Node>, mut rx: mpsc::Receiver<(WireEnvelope, Option<String>)>) {
    while let Some((envelope, from_peer_id)) = rx.recv().await {
        let now = now();
        if let Err(e) = dispatcher::dispatch(&node, envelope, from_peer_id.as_deref(), now).await {
            log_dispatch_error(&e);
        }
    }
}

fn log_dispatch_error(e: &CoreError) {
    log::debug!("dispatch error: {e}");
}

/// A Taker-side node self-initiates its half of a settlement as soon as a
/// Maker publishes its locked terms on `settlement.request.*` (spec.md
/// 4.10). One subscription per node process, for the lifetime of the node.
async fn settlement_self_initiate_loop(node: Arc<Node>) {
    use crate::bus::BusAdapter;
    let mut rx = node.bus.subscribe("settlement.request.*").await;
    while let Ok(message) = rx.recv().await {
        let request: crate::settlement::SettlementRequest = match serde_json::from_value(message.payload) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("malformed settlement.request payload: {e}");
                continue;
            }
        };
        let proposal_id = request.proposal_id.clone();
        match node.settlements.get(&proposal_id) {
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(e) => {
                log::warn!("settlement store error while checking self-initiation: {e}");
                continue;
            }
        }
        match node.coordinator.initiate_as_taker(request, now()) {
            Ok(_) => {
                let coordinator = node.coordinator.clone();
                tokio::spawn(async move {
                    if let Err(e) = coordinator.run(&proposal_id).await {
                        log::warn!("settlement {proposal_id}: taker-side coordinator loop ended: {e}");
                    }
                });
            }
            Err(e) => log::warn!("failed to self-initiate settlement {proposal_id} as taker: {e}"),
        }
    }
}

fn now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[allow(dead_code)]
fn assert_stream_traits<S: AsyncRead + AsyncWrite>() {}
