//! The [`Node`]: every component wired together by explicit construction at
//! startup (spec.md 9 "Global mutable state — there is none at module
//! scope. The node is an explicit object constructed at startup; all
//! components receive it (or its sub-handles) via dependency injection.").

use std::sync::Arc;

use crate::{
    bus::InProcessBus,
    connectors::{mock::MockConnector, ChainConnector, HashAlgorithm},
    crypto::{self, generate_keypair, KeyPair},
    gossip::GossipOverlay,
    identity::IdentityStore,
    negotiation::NegotiationEngine,
    orderbook::OrderBook,
    peer::PeerDirectory,
    settlement::{SettlementConfig, SettlementCoordinator, SettlementStore},
};

use super::config::NodeConfig;

/// Every long-lived, shared component of one node process. Constructed
/// once at startup and handed out by `Arc` to the accept loop, the
/// dispatcher, the HTTP layer, and every settlement worker — there is no
/// module-scope global state anywhere in this crate (spec.md 9).
pub struct Node {
    pub config: NodeConfig,
    /// This node's own network identity, distinct from any local user's
    /// account key pair; used only to sign the `Hello` handshake
    /// (spec.md 4.3).
    pub peer_id: String,
    pub peer_key_pair: KeyPair,
    pub identity: Arc<IdentityStore>,
    pub peers: Arc<PeerDirectory>,
    pub order_book: Arc<OrderBook>,
    pub negotiation: Arc<NegotiationEngine>,
    pub settlements: Arc<SettlementStore>,
    pub coordinator: Arc<SettlementCoordinator<InProcessBus>>,
    pub gossip: Arc<GossipOverlay>,
    pub bus: Arc<InProcessBus>,
    maker_chain_connector: Arc<dyn ChainConnector>,
    taker_chain_connector: Arc<dyn ChainConnector>,
}

impl Node {
    /// Builds a node with the reference in-memory connectors on both
    /// chains (spec.md 4.9 "supplemented"), suitable for local development
    /// and the integration test harness. Production deployments would
    /// inject real connectors via [`Node::with_connectors`].
    pub fn new(config: NodeConfig) -> Self {
        Self::with_connectors(
            config,
            Arc::new(MockConnector::new(HashAlgorithm::Sha256)),
            Arc::new(MockConnector::new(HashAlgorithm::Sha256)),
        )
    }

    pub fn with_connectors(
        config: NodeConfig,
        maker_chain_connector: Arc<dyn ChainConnector>,
        taker_chain_connector: Arc<dyn ChainConnector>,
    ) -> Self {
        Self::with_connectors_and_bus(
            config,
            maker_chain_connector,
            taker_chain_connector,
            Arc::new(InProcessBus::new()),
        )
    }

    /// Same as [`Node::with_connectors`] but joins an existing bus instead of
    /// creating a private one. Two `Node`s sharing a bus behave like two
    /// separate processes both pointed at the same production message
    /// broker, which is what the integration tests use to simulate a Maker
    /// and a Taker observing each other's settlement events without a real
    /// network between them.
    pub fn with_connectors_and_bus(
        config: NodeConfig,
        maker_chain_connector: Arc<dyn ChainConnector>,
        taker_chain_connector: Arc<dyn ChainConnector>,
        bus: Arc<InProcessBus>,
    ) -> Self {
        let peer_key_pair = generate_keypair();
        let peer_id = hex::encode(crypto::sha256(&peer_key_pair.public.to_sec1_bytes()));

        let identity = Arc::new(IdentityStore::new(config.session_ttl_secs));
        let peers = Arc::new(PeerDirectory::new());
        let order_book = Arc::new(OrderBook::new());
        let negotiation = Arc::new(NegotiationEngine::new());
        let settlements = Arc::new(SettlementStore::new());
        let settlement_config = SettlementConfig {
            maker_ttl_secs: config.maker_ttl_secs,
            taker_ttl_secs: config.taker_ttl_secs,
            safety_gap_secs: config.safety_gap_secs,
            ..SettlementConfig::default()
        };
        let coordinator = Arc::new(SettlementCoordinator::new(
            settlements.clone(),
            maker_chain_connector.clone(),
            taker_chain_connector.clone(),
            bus.clone(),
            settlement_config,
        ));
        let gossip = Arc::new(GossipOverlay::new());

        Self {
            config,
            peer_id,
            peer_key_pair,
            identity,
            peers,
            order_book,
            negotiation,
            settlements,
            coordinator,
            gossip,
            bus,
            maker_chain_connector,
            taker_chain_connector,
        }
    }

    /// Resolves a request's `chain` name to the connector this node uses
    /// for that side of a settlement (SPEC_FULL.md 6, wallet/lock routes).
    pub fn connector_for_chain(&self, chain: &str) -> Option<Arc<dyn ChainConnector>> {
        if chain.eq_ignore_ascii_case(&self.config.maker_chain) {
            Some(self.maker_chain_connector.clone())
        } else if chain.eq_ignore_ascii_case(&self.config.taker_chain) {
            Some(self.taker_chain_connector.clone())
        } else {
            None
        }
    }
}
