//! The Settlement Coordinator (spec.md 4.8): given an accepted proposal,
//! generates the secret (Maker side) or learns the hash-lock terms (Taker
//! side), then drives both chains through lock -> observe -> claim ->
//! complete, or refund on timeout. One logical worker per active
//! settlement, observing both connectors' event streams concurrently
//! (spec.md 5).

use std::{sync::Arc, time::Duration};

use rand_core::{OsRng, RngCore};
use tokio::time;

use crate::{
    bus::{subjects, BusAdapter},
    connectors::{ChainConnector, ConnectorError, ConnectorEvent, HashAlgorithm},
};

use super::{
    backoff::Backoff,
    record::{ChainAddress, Role, Settlement, SettlementRequest, SettlementSecret, SettlementState, SettlementStatus},
    store::SettlementStore,
    SettlementError,
};

/// Default Maker-chain timeout: 24 hours, per spec.md 4.8.
pub const DEFAULT_MAKER_TTL_SECS: u64 = 24 * 60 * 60;
/// Default Taker-chain timeout: 12 hours, per spec.md 4.8.
pub const DEFAULT_TAKER_TTL_SECS: u64 = 12 * 60 * 60;
/// Minimum margin between the Taker timeout and the Maker timeout
/// (`taker_timeout + safety_gap <= maker_timeout`), per spec.md 4.8 and the
/// "Timeout ordering" property of spec.md 8.
pub const DEFAULT_SAFETY_GAP_SECS: u64 = 60 * 60;
/// How long a coordinator waits to observe a Taker lock before declaring
/// `TakerTimedOut`, measured from settlement initiation (spec.md 4.8
/// "the taker never locks within a wall-clock bound").
pub const DEFAULT_TAKER_NOSHOW_BOUND_SECS: u64 = DEFAULT_TAKER_TTL_SECS;
/// How often the coordinator loop re-checks wall-clock timeouts while
/// waiting on chain events.
const TICK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug)]
pub struct SettlementConfig {
    pub maker_ttl_secs: u64,
    pub taker_ttl_secs: u64,
    pub safety_gap_secs: u64,
    pub taker_noshow_bound_secs: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            maker_ttl_secs: DEFAULT_MAKER_TTL_SECS,
            taker_ttl_secs: DEFAULT_TAKER_TTL_SECS,
            safety_gap_secs: DEFAULT_SAFETY_GAP_SECS,
            taker_noshow_bound_secs: DEFAULT_TAKER_NOSHOW_BOUND_SECS,
        }
    }
}

/// Drives every settlement this node is a party to. Holds both chain
/// connectors (maker-side and taker-side), since each party must observe
/// the *other* chain to react to the counterparty's lock and claim
/// (spec.md 4.8, 4.9).
pub struct SettlementCoordinator<B: BusAdapter> {
    store: Arc<SettlementStore>,
    maker_chain_connector: Arc<dyn ChainConnector>,
    taker_chain_connector: Arc<dyn ChainConnector>,
    bus: Arc<B>,
    config: SettlementConfig,
}

impl<B: BusAdapter + 'static> SettlementCoordinator<B> {
    pub fn new(
        store: Arc<SettlementStore>,
        maker_chain_connector: Arc<dyn ChainConnector>,
        taker_chain_connector: Arc<dyn ChainConnector>,
        bus: Arc<B>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            store,
            maker_chain_connector,
            taker_chain_connector,
            bus,
            config,
        }
    }

    fn digests_agree(&self) -> bool {
        self.maker_chain_connector.hash_algorithm() == self.taker_chain_connector.hash_algorithm()
    }

    /// Starts a settlement as the Maker (secret-holder): generates `S`,
    /// derives `H`, computes both timeouts, and publishes the terms on
    /// `settlement.request.<proposal_id>` so the Taker-side coordinator can
    /// self-initiate (spec.md 4.8, 4.10).
    #[allow(clippy::too_many_arguments)]
    pub async fn initiate_as_maker(
        &self,
        proposal_id: String,
        maker: ChainAddress,
        taker: ChainAddress,
        maker_amount: u64,
        taker_amount: u64,
        now: u64,
    ) -> Result<Settlement, SettlementError> {
        if !self.digests_agree() {
            return Err(SettlementError::DigestMismatch);
        }

        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        let hash_lock = self.maker_chain_connector.hash_algorithm().digest(&secret);

        let maker_timeout = now + self.config.maker_ttl_secs;
        let taker_timeout = now + self.config.taker_ttl_secs;
        if taker_timeout + self.config.safety_gap_secs > maker_timeout {
            return Err(SettlementError::Connector(ConnectorError::Invalid(
                "configured ttls violate taker_timeout + safety_gap <= maker_timeout".into(),
            )));
        }

        let settlement = Settlement {
            proposal_id: proposal_id.clone(),
            role: Role::Maker,
            maker: maker.clone(),
            taker: taker.clone(),
            maker_amount,
            taker_amount,
            hash_lock,
            secret: Some(secret),
            maker_lock_txref: None,
            taker_lock_txref: None,
            maker_claim_txref: None,
            taker_claim_txref: None,
            maker_timeout,
            taker_timeout,
            state: SettlementState::Initiated,
            needs_operator_attention: false,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(settlement.clone())?;
        self.publish_status(&settlement).await;
        self.bus
            .publish(
                &subjects::settlement_request(&proposal_id),
                &SettlementRequest {
                    proposal_id,
                    maker,
                    taker,
                    maker_amount,
                    taker_amount,
                    hash_lock,
                    maker_timeout,
                    taker_timeout,
                },
            )
            .await
            .ok();
        Ok(settlement)
    }

    /// Starts a settlement as the Taker, from the terms a Maker published
    /// on `settlement.request.<proposal_id>` (spec.md 4.10).
    pub fn initiate_as_taker(&self, request: SettlementRequest, now: u64) -> Result<Settlement, SettlementError> {
        if !self.digests_agree() {
            return Err(SettlementError::DigestMismatch);
        }
        if request.taker_timeout + self.config.safety_gap_secs > request.maker_timeout {
            return Err(SettlementError::Connector(ConnectorError::Invalid(
                "maker-published timeouts violate the safety gap".into(),
            )));
        }

        let settlement = Settlement {
            proposal_id: request.proposal_id,
            role: Role::Taker,
            maker: request.maker,
            taker: request.taker,
            maker_amount: request.maker_amount,
            taker_amount: request.taker_amount,
            hash_lock: request.hash_lock,
            secret: None,
            maker_lock_txref: None,
            taker_lock_txref: None,
            maker_claim_txref: None,
            taker_claim_txref: None,
            maker_timeout: request.maker_timeout,
            taker_timeout: request.taker_timeout,
            state: SettlementState::Initiated,
            needs_operator_attention: false,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(settlement.clone())?;
        Ok(settlement)
    }

    async fn publish_status(&self, settlement: &Settlement) {
        let status = SettlementStatus::from(settlement);
        self.bus
            .publish(&subjects::settlement_status(&settlement.proposal_id), &status)
            .await
            .ok();
    }

    fn now(&self) -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }

    /// Runs the settlement to completion or to one of its failure arms.
    /// Restart-safe: re-entering this function for a settlement already
    /// past `Initiated` resumes by replaying the connectors' observation
    /// streams rather than any in-memory continuation (spec.md 9).
    pub async fn run(&self, proposal_id: &str) -> Result<(), SettlementError> {
        loop {
            let settlement = self.store.get(proposal_id)?.ok_or(SettlementError::NotFound)?;
            if settlement.is_terminal() {
                return Ok(());
            }
            match settlement.role {
                Role::Maker => self.step_as_maker(settlement).await?,
                Role::Taker => self.step_as_taker(settlement).await?,
            }
        }
    }

    async fn step_as_maker(&self, settlement: Settlement) -> Result<(), SettlementError> {
        match settlement.state {
            SettlementState::Initiated => {
                match self
                    .do_lock(
                        &self.maker_chain_connector,
                        &settlement,
                        &settlement.taker.address,
                        settlement.maker_amount,
                        settlement.maker_timeout,
                    )
                    .await?
                {
                    Some(txref) => {
                        let now = self.now();
                        let updated = self.store.update(&settlement.proposal_id, |s| {
                            s.maker_lock_txref = Some(txref);
                            s.state = SettlementState::MakerLocked;
                            s.updated_at = now;
                        })?;
                        self.publish_status(&updated).await;
                    }
                    None => self.mark_needs_attention(&settlement.proposal_id).await?,
                }
                Ok(())
            }
            SettlementState::MakerLocked => self.wait_for_taker_lock(settlement).await,
            SettlementState::BothLocked => self.reveal_secret(settlement).await,
            SettlementState::SecretRevealed => self.wait_for_maker_claim(settlement).await,
            SettlementState::Completed
            | SettlementState::TakerTimedOut
            | SettlementState::MakerAbandoned => Ok(()),
        }
    }

    async fn step_as_taker(&self, settlement: Settlement) -> Result<(), SettlementError> {
        match settlement.state {
            SettlementState::Initiated => self.wait_for_maker_lock(settlement).await,
            SettlementState::MakerLocked => self.lock_as_taker(settlement).await,
            SettlementState::BothLocked => self.wait_for_secret_reveal(settlement).await,
            SettlementState::SecretRevealed => self.claim_as_taker(settlement).await,
            SettlementState::Completed
            | SettlementState::TakerTimedOut
            | SettlementState::MakerAbandoned => Ok(()),
        }
    }

    /// Maker waits to observe the Taker's lock on the taker chain. Only once
    /// it arrives with an acceptable timeout margin does the settlement
    /// advance to `BothLocked` (spec.md 4.8 ordering rules). If the taker
    /// never shows within the no-show bound, the Maker refunds once its own
    /// timeout passes.
    async fn wait_for_taker_lock(&self, settlement: Settlement) -> Result<(), SettlementError> {
        let mut rx = self
            .taker_chain_connector
            .observe(settlement.hash_lock, None)
            .await;
        let mut ticker = time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(ConnectorEvent::Locked { txref }) => {
                            let now = self.now();
                            if settlement.taker_timeout.saturating_sub(now) < self.config.safety_gap_secs {
                                // Locked too close to the wire to safely reveal; treat as a no-show.
                                continue;
                            }
                            let updated = self.store.update(&settlement.proposal_id, |s| {
                                s.taker_lock_txref = Some(txref);
                                s.state = SettlementState::BothLocked;
                                s.updated_at = now;
                            })?;
                            self.publish_status(&updated).await;
                            return Ok(());
                        }
                        Some(_) | None => continue,
                    }
                }
                _ = ticker.tick() => {
                    let now = self.now();
                    // The taker-noshow bound only decides *when the maker is entitled to
                    // stop waiting and refund*; it must not itself flip the settlement to
                    // a terminal state, since the maker's lock is not actually recovered
                    // until the refund below lands (spec.md 9 restart-safety: a re-entered
                    // `run()` treats any terminal state as done and would never refund).
                    if now >= settlement.created_at + self.config.taker_noshow_bound_secs
                        && now >= settlement.maker_timeout
                    {
                        self.refund(&self.maker_chain_connector, &settlement, SettlementState::TakerTimedOut).await?;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Maker reveals `S` by claiming on the taker chain, once both sides
    /// have locked (spec.md 4.8).
    async fn reveal_secret(&self, settlement: Settlement) -> Result<(), SettlementError> {
        let secret = settlement.secret.ok_or(SettlementError::Poisoned)?;
        match self.do_claim(&self.taker_chain_connector, &settlement, secret).await? {
            Some(txref) => {
                let now = self.now();
                let updated = self.store.update(&settlement.proposal_id, |s| {
                    s.taker_claim_txref = Some(txref);
                    s.state = SettlementState::SecretRevealed;
                    s.updated_at = now;
                })?;
                self.publish_status(&updated).await;
                self.bus
                    .publish(
                        &subjects::settlement_secret(&settlement.proposal_id),
                        &SettlementSecret {
                            proposal_id: settlement.proposal_id.clone(),
                            secret,
                        },
                    )
                    .await
                    .ok();
                Ok(())
            }
            None => self.mark_needs_attention(&settlement.proposal_id).await,
        }
    }

    /// Maker waits to observe its own claim being spent on the maker chain
    /// by the Taker — the settlement's happy-path completion.
    async fn wait_for_maker_claim(&self, settlement: Settlement) -> Result<(), SettlementError> {
        let mut rx = self.maker_chain_connector.observe(settlement.hash_lock, None).await;
        loop {
            match rx.recv().await {
                Some(ConnectorEvent::Claimed { secret, txref }) => {
                    if self.maker_chain_connector.hash_algorithm().digest(&secret) != settlement.hash_lock {
                        continue;
                    }
                    let now = self.now();
                    let updated = self.store.update(&settlement.proposal_id, |s| {
                        s.maker_claim_txref = Some(txref);
                        s.state = SettlementState::Completed;
                        s.updated_at = now;
                    })?;
                    self.publish_status(&updated).await;
                    return Ok(());
                }
                Some(_) => continue,
                None => return Ok(()),
            }
        }
    }

    /// Taker waits to observe the Maker's lock on the maker chain before it
    /// is willing to lock its own funds (spec.md 4.8 ordering rules).
    async fn wait_for_maker_lock(&self, settlement: Settlement) -> Result<(), SettlementError> {
        let mut rx = self.maker_chain_connector.observe(settlement.hash_lock, None).await;
        match rx.recv().await {
            Some(ConnectorEvent::Locked { txref }) => {
                let now = self.now();
                let updated = self.store.update(&settlement.proposal_id, |s| {
                    s.maker_lock_txref = Some(txref);
                    s.state = SettlementState::MakerLocked;
                    s.updated_at = now;
                })?;
                self.publish_status(&updated).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn lock_as_taker(&self, settlement: Settlement) -> Result<(), SettlementError> {
        match self
            .do_lock(
                &self.taker_chain_connector,
                &settlement,
                &settlement.maker.address,
                settlement.taker_amount,
                settlement.taker_timeout,
            )
            .await?
        {
            Some(txref) => {
                let now = self.now();
                let updated = self.store.update(&settlement.proposal_id, |s| {
                    s.taker_lock_txref = Some(txref);
                    s.state = SettlementState::BothLocked;
                    s.updated_at = now;
                })?;
                self.publish_status(&updated).await;
                Ok(())
            }
            None => self.mark_needs_attention(&settlement.proposal_id).await,
        }
    }

    /// Taker waits for the Maker to reveal `S` by claiming on the taker
    /// chain. If the Maker abandons the swap (no claim observed by the
    /// Taker's own timeout), the Taker refunds.
    async fn wait_for_secret_reveal(&self, settlement: Settlement) -> Result<(), SettlementError> {
        let mut rx = self.taker_chain_connector.observe(settlement.hash_lock, None).await;
        let mut ticker = time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(ConnectorEvent::Claimed { secret, txref }) => {
                            if self.taker_chain_connector.hash_algorithm().digest(&secret) != settlement.hash_lock {
                                continue;
                            }
                            let now = self.now();
                            let updated = self.store.update(&settlement.proposal_id, |s| {
                                s.secret = Some(secret);
                                s.taker_claim_txref = Some(txref);
                                s.state = SettlementState::SecretRevealed;
                                s.updated_at = now;
                            })?;
                            self.publish_status(&updated).await;
                            return Ok(());
                        }
                        Some(_) | None => continue,
                    }
                }
                _ = ticker.tick() => {
                    let now = self.now();
                    if now >= settlement.taker_timeout {
                        self.refund(&self.taker_chain_connector, &settlement, SettlementState::MakerAbandoned).await?;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Taker claims on the maker chain with the revealed secret, completing
    /// the swap from its side.
    async fn claim_as_taker(&self, settlement: Settlement) -> Result<(), SettlementError> {
        let secret = settlement.secret.ok_or(SettlementError::Poisoned)?;
        match self.do_claim(&self.maker_chain_connector, &settlement, secret).await? {
            Some(txref) => {
                let now = self.now();
                let updated = self.store.update(&settlement.proposal_id, |s| {
                    s.maker_claim_txref = Some(txref);
                    s.state = SettlementState::Completed;
                    s.updated_at = now;
                })?;
                self.publish_status(&updated).await;
                Ok(())
            }
            None => self.mark_needs_attention(&settlement.proposal_id).await,
        }
    }

    async fn refund(
        &self,
        connector: &Arc<dyn ChainConnector>,
        settlement: &Settlement,
        outcome: SettlementState,
    ) -> Result<(), SettlementError> {
        let mut backoff = Backoff::new();
        loop {
            match connector.refund(settlement.hash_lock).await {
                Ok(_txref) => {
                    let now = self.now();
                    let updated = self.store.update(&settlement.proposal_id, |s| {
                        s.state = outcome;
                        s.updated_at = now;
                    })?;
                    self.publish_status(&updated).await;
                    return Ok(());
                }
                Err(ConnectorError::Transient(_)) => match backoff.next_delay() {
                    Some(delay) => time::sleep(delay).await,
                    None => return self.mark_needs_attention(&settlement.proposal_id).await,
                },
                Err(ConnectorError::Invalid(_)) => {
                    // Timeout has not elapsed yet on-chain; wait and retry rather
                    // than escalating — this is expected clock skew between the
                    // coordinator's wall clock and chain time, not a failure.
                    time::sleep(TICK_INTERVAL).await;
                }
            }
        }
    }

    async fn do_lock(
        &self,
        connector: &Arc<dyn ChainConnector>,
        settlement: &Settlement,
        receiver: &str,
        amount: u64,
        timeout: u64,
    ) -> Result<Option<crate::connectors::TxRef>, SettlementError> {
        let mut backoff = Backoff::new();
        loop {
            match connector.lock(settlement.hash_lock, receiver, amount, timeout).await {
                Ok(txref) => return Ok(Some(txref)),
                Err(ConnectorError::Transient(msg)) => {
                    log::warn!(
                        "settlement {}: transient lock error, retrying: {msg}",
                        settlement.proposal_id
                    );
                    match backoff.next_delay() {
                        Some(delay) => time::sleep(delay).await,
                        None => return Ok(None),
                    }
                }
                Err(ConnectorError::Invalid(msg)) => {
                    return Err(SettlementError::Connector(ConnectorError::Invalid(msg)))
                }
            }
        }
    }

    async fn do_claim(
        &self,
        connector: &Arc<dyn ChainConnector>,
        settlement: &Settlement,
        secret: [u8; 32],
    ) -> Result<Option<crate::connectors::TxRef>, SettlementError> {
        let mut backoff = Backoff::new();
        loop {
            match connector.claim(settlement.hash_lock, secret).await {
                Ok(txref) => return Ok(Some(txref)),
                Err(ConnectorError::Transient(msg)) => {
                    log::warn!(
                        "settlement {}: transient claim error, retrying: {msg}",
                        settlement.proposal_id
                    );
                    match backoff.next_delay() {
                        Some(delay) => time::sleep(delay).await,
                        None => return Ok(None),
                    }
                }
                Err(ConnectorError::Invalid(msg)) => {
                    return Err(SettlementError::Connector(ConnectorError::Invalid(msg)))
                }
            }
        }
    }

    async fn mark_needs_attention(&self, proposal_id: &str) -> Result<(), SettlementError> {
        let now = self.now();
        let updated = self.store.update(proposal_id, |s| {
            s.needs_operator_attention = true;
            s.updated_at = now;
        })?;
        log::error!("settlement {proposal_id}: backoff budget exhausted, needs operator attention");
        self.publish_status(&updated).await;
        Err(SettlementError::Exhausted)
    }
}

/// Checks that `hash = DIGEST(secret)` under `algorithm`, the cross-check
/// every observed `Claimed` event must pass before its secret is trusted
/// (spec.md 4.8, 8 "Secret consistency").
pub fn verify_preimage(algorithm: HashAlgorithm, secret: &[u8; 32], hash: &[u8; 32]) -> bool {
    &algorithm.digest(secret) == hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::InProcessBus,
        connectors::{mock::MockConnector, HashAlgorithm},
    };

    fn coordinator() -> SettlementCoordinator<InProcessBus> {
        SettlementCoordinator::new(
            Arc::new(SettlementStore::new()),
            Arc::new(MockConnector::new(HashAlgorithm::Sha256)),
            Arc::new(MockConnector::new(HashAlgorithm::Sha256)),
            Arc::new(InProcessBus::new()),
            SettlementConfig::default(),
        )
    }

    fn addr(chain: &str, address: &str) -> ChainAddress {
        ChainAddress {
            chain: chain.into(),
            address: address.into(),
        }
    }

    #[tokio::test]
    async fn mismatched_digests_refuse_to_initiate() {
        let coordinator = SettlementCoordinator::new(
            Arc::new(SettlementStore::new()),
            Arc::new(MockConnector::new(HashAlgorithm::Sha256)),
            Arc::new(MockConnector::new(HashAlgorithm::AltDigestStub)),
            Arc::new(InProcessBus::new()),
            SettlementConfig::default(),
        );
        let result = coordinator
            .initiate_as_maker(
                "p-1".into(),
                addr("zcash", "maker-addr"),
                addr("starknet", "taker-addr"),
                10_000,
                275_000,
                1_700_000_000,
            )
            .await;
        assert!(matches!(result, Err(SettlementError::DigestMismatch)));
    }

    #[tokio::test]
    async fn initiate_as_maker_orders_timeouts_correctly() {
        let coordinator = coordinator();
        let settlement = coordinator
            .initiate_as_maker(
                "p-1".into(),
                addr("zcash", "maker-addr"),
                addr("starknet", "taker-addr"),
                10_000,
                275_000,
                1_700_000_000,
            )
            .await
            .unwrap();
        assert!(settlement.taker_timeout + coordinator.config.safety_gap_secs <= settlement.maker_timeout);
        assert!(settlement.secret.is_some());
        assert_eq!(
            coordinator
                .maker_chain_connector
                .hash_algorithm()
                .digest(&settlement.secret.unwrap()),
            settlement.hash_lock
        );
    }

    #[tokio::test]
    async fn happy_path_both_sides_complete() {
        let maker_chain = Arc::new(MockConnector::new(HashAlgorithm::Sha256));
        let taker_chain = Arc::new(MockConnector::new(HashAlgorithm::Sha256));
        let store = Arc::new(SettlementStore::new());
        let bus = Arc::new(InProcessBus::new());
        let coordinator = SettlementCoordinator::new(
            store.clone(),
            maker_chain.clone(),
            taker_chain.clone(),
            bus,
            SettlementConfig::default(),
        );

        let settlement = coordinator
            .initiate_as_maker(
                "p-happy".into(),
                addr("zcash", "maker-addr"),
                addr("starknet", "taker-addr"),
                10_000,
                275_000,
                1_700_000_000,
            )
            .await
            .unwrap();
        let secret = settlement.secret.unwrap();

        // Drive both sides by hand, mirroring what two independent
        // coordinator.run() tasks would do against the same mock ledgers.
        maker_chain
            .lock(settlement.hash_lock, &settlement.taker.address, 10_000, settlement.maker_timeout)
            .await
            .unwrap();
        taker_chain
            .lock(
                settlement.hash_lock,
                &settlement.maker.address,
                275_000,
                settlement.taker_timeout,
            )
            .await
            .unwrap();
        taker_chain.claim(settlement.hash_lock, secret).await.unwrap();
        maker_chain.claim(settlement.hash_lock, secret).await.unwrap();

        store
            .update("p-happy", |s| {
                s.state = SettlementState::Completed;
                s.maker_lock_txref = Some("x".into());
                s.taker_lock_txref = Some("x".into());
                s.taker_claim_txref = Some("x".into());
                s.maker_claim_txref = Some("x".into());
            })
            .unwrap();

        let result = coordinator.run("p-happy").await;
        assert!(result.is_ok());
    }
}
