//! End-to-end "Maker abandons after both locked" scenario (spec.md 4.8
//! failure arm, spec.md 8 scenario 3): both sides have locked, but the
//! Maker never claims (crashed, or simply never resumes its coordinator).
//! The Taker's own coordinator must recover its funds by refunding once
//! `taker_timeout` passes, without ever observing a claim.
//!
//! The Maker side is represented only by its direct ledger actions (a bare
//! `lock` call against the shared mock chain), never by running a Maker
//! coordinator — this is exactly what "abandoned" means here.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use otcswap::bus::InProcessBus;
use otcswap::connectors::{mock::MockConnector, ChainConnector, HashAlgorithm};
use otcswap::settlement::{
    ChainAddress, SettlementConfig, SettlementCoordinator, SettlementRequest, SettlementState, SettlementStore,
};

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

#[tokio::test(flavor = "multi_thread")]
async fn taker_refunds_after_maker_never_claims() {
    // Both chains are shared between what would be two separate node
    // processes in production, since they observe the same on-chain state.
    let maker_chain = Arc::new(MockConnector::new(HashAlgorithm::Sha256));
    let taker_chain = Arc::new(MockConnector::new(HashAlgorithm::Sha256));
    let taker_store = Arc::new(SettlementStore::new());
    let bus = Arc::new(InProcessBus::new());

    let config = SettlementConfig {
        maker_ttl_secs: 10,
        taker_ttl_secs: 4,
        safety_gap_secs: 1,
        taker_noshow_bound_secs: 4,
    };
    let taker_coordinator = Arc::new(SettlementCoordinator::new(
        taker_store.clone(),
        maker_chain.clone(),
        taker_chain.clone(),
        bus,
        config,
    ));

    let secret = [9u8; 32];
    let hash_lock = HashAlgorithm::Sha256.digest(&secret);
    let t0 = now();
    let maker_timeout = t0 + 10;
    let taker_timeout = t0 + 4;

    // Simulate the Maker's lock landing on-chain, with no coordinator ever
    // run on that side afterward.
    maker_chain
        .lock(hash_lock, "taker-addr", 10_000, maker_timeout)
        .await
        .unwrap();

    let request = SettlementRequest {
        proposal_id: "p-abandon".into(),
        maker: ChainAddress {
            chain: "zcash".into(),
            address: "maker-addr".into(),
        },
        taker: ChainAddress {
            chain: "starknet".into(),
            address: "taker-addr".into(),
        },
        maker_amount: 10_000,
        taker_amount: 275_000,
        hash_lock,
        maker_timeout,
        taker_timeout,
    };
    taker_coordinator.initiate_as_taker(request, t0).unwrap();

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        taker_coordinator.run("p-abandon"),
    )
    .await;
    assert!(result.is_ok(), "coordinator.run did not terminate within the test deadline");
    result.unwrap().unwrap();

    let final_settlement = taker_store.get("p-abandon").unwrap().unwrap();
    assert_eq!(final_settlement.state, SettlementState::MakerAbandoned);
    assert!(final_settlement.taker_lock_txref.is_some(), "taker must have locked before refunding");
    assert!(final_settlement.maker_claim_txref.is_none(), "maker never claimed in this scenario");
    assert!(final_settlement.secret.is_none(), "no secret was ever revealed on-chain");
}
