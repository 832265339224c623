use std::{collections::HashMap, sync::RwLock};

use crate::orderbook::{Order, OrderId};

use super::{
    proposal::{Proposal, ProposalId, ProposalStatus},
    NegotiationError,
};

struct Session {
    latest_proposal_id: ProposalId,
    round: u32,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<(OrderId, String), Session>,
    proposals: HashMap<ProposalId, Proposal>,
}

/// Owns every `(order_id, taker_peer)` negotiation session and the
/// proposals belonging to it. All transitions for a given pair are applied
/// under the same lock, so they serialize the way spec.md 5 requires for a
/// single proposal's history.
pub struct NegotiationEngine {
    inner: RwLock<Inner>,
}

impl NegotiationEngine {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Records a new proposal for `(order, taker_peer)`. A previous Pending
    /// proposal for the same pair is superseded. Re-proposing with a
    /// `nonce` already seen for this pair is an idempotent no-op that
    /// returns the existing proposal unchanged.
    #[allow(clippy::too_many_arguments)]
    pub fn propose(
        &self,
        order: &Order,
        taker_peer_id: String,
        taker_username: String,
        taker_base_address: Option<String>,
        taker_quote_address: Option<String>,
        amount: u64,
        price: f64,
        nonce: u64,
        proposed_at: u64,
    ) -> Result<Proposal, NegotiationError> {
        if amount > order.base_amount {
            return Err(NegotiationError::ConstraintViolated("amount exceeds order size".into()));
        }
        if !order.price_in_range(price) {
            return Err(NegotiationError::ConstraintViolated("price outside order range".into()));
        }

        let proposal_id = ProposalId(format!("{}-{}-{}", order.order_id, taker_peer_id, nonce));
        let key = (order.order_id.clone(), taker_peer_id.clone());

        let mut inner = self.inner.write()?;
        if let Some(existing) = inner.proposals.get(&proposal_id) {
            return Ok(existing.clone());
        }

        let round = match inner.sessions.get(&key) {
            Some(session) => {
                if let Some(previous) = inner.proposals.get_mut(&session.latest_proposal_id) {
                    if previous.status == ProposalStatus::Pending {
                        previous.status = ProposalStatus::Superseded;
                    }
                }
                session.round + 1
            }
            None => 0,
        };

        let proposal = Proposal {
            proposal_id: proposal_id.clone(),
            order_id: order.order_id.clone(),
            taker_peer_id: taker_peer_id.clone(),
            taker_username,
            maker_base_address: None,
            maker_quote_address: None,
            taker_base_address,
            taker_quote_address,
            amount,
            price,
            status: ProposalStatus::Pending,
            round,
            proposed_at,
            decided_at: None,
        };

        inner.proposals.insert(proposal_id.clone(), proposal.clone());
        inner.sessions.insert(
            key,
            Session {
                latest_proposal_id: proposal_id,
                round,
            },
        );
        Ok(proposal)
    }

    /// Applies the Maker's accept/reject decision.
    pub fn decide(
        &self,
        proposal_id: &ProposalId,
        accept: bool,
        maker_base_address: Option<String>,
        maker_quote_address: Option<String>,
        decided_at: u64,
    ) -> Result<Proposal, NegotiationError> {
        self.terminate(proposal_id, decided_at, |proposal| {
            proposal.status = if accept {
                ProposalStatus::Accepted
            } else {
                ProposalStatus::Rejected
            };
            proposal.maker_base_address = maker_base_address;
            proposal.maker_quote_address = maker_quote_address;
        })
    }

    pub fn cancel(&self, proposal_id: &ProposalId, cancelled_at: u64) -> Result<Proposal, NegotiationError> {
        self.terminate(proposal_id, cancelled_at, |proposal| {
            proposal.status = ProposalStatus::Cancelled;
        })
    }

    /// Expires every still-Pending proposal belonging to `order_id` (called
    /// when the order itself expires).
    pub fn expire_order(&self, order_id: &OrderId, expired_at: u64) -> Result<(), NegotiationError> {
        let mut inner = self.inner.write()?;
        for proposal in inner.proposals.values_mut() {
            if &proposal.order_id == order_id && proposal.status == ProposalStatus::Pending {
                proposal.status = ProposalStatus::Expired;
                proposal.decided_at = Some(expired_at);
            }
        }
        Ok(())
    }

    pub fn get(&self, proposal_id: &ProposalId) -> Result<Option<Proposal>, NegotiationError> {
        Ok(self.inner.read()?.proposals.get(proposal_id).cloned())
    }

    /// Looks up the current (latest-round) proposal for a `(order, taker)`
    /// pair, used by the dispatcher to resolve an inbound `Decision`
    /// envelope (which names the pair but not a specific proposal id) back
    /// to the proposal it decides.
    pub fn latest_for(&self, order_id: &OrderId, taker_peer_id: &str) -> Result<Option<Proposal>, NegotiationError> {
        let inner = self.inner.read()?;
        let key = (order_id.clone(), taker_peer_id.to_string());
        Ok(inner
            .sessions
            .get(&key)
            .and_then(|session| inner.proposals.get(&session.latest_proposal_id))
            .cloned())
    }

    /// Every proposal this node knows about, across all orders — the Maker
    /// and Taker sides of a negotiation each see their own half through this
    /// (SPEC_FULL.md 6 `/proposals`).
    pub fn list_all(&self) -> Result<Vec<Proposal>, NegotiationError> {
        let inner = self.inner.read()?;
        let mut list: Vec<Proposal> = inner.proposals.values().cloned().collect();
        list.sort_by_key(|p| p.proposed_at);
        Ok(list)
    }

    pub fn list_for_order(&self, order_id: &OrderId) -> Result<Vec<Proposal>, NegotiationError> {
        let inner = self.inner.read()?;
        let mut list: Vec<Proposal> = inner
            .proposals
            .values()
            .filter(|p| &p.order_id == order_id)
            .cloned()
            .collect();
        list.sort_by_key(|p| p.proposed_at);
        Ok(list)
    }

    fn terminate(
        &self,
        proposal_id: &ProposalId,
        at: u64,
        apply: impl FnOnce(&mut Proposal),
    ) -> Result<Proposal, NegotiationError> {
        let mut inner = self.inner.write()?;
        let proposal = inner.proposals.get_mut(proposal_id).ok_or(NegotiationError::NotFound)?;
        if proposal.status.is_terminal() {
            return Err(NegotiationError::Superseded);
        }
        apply(proposal);
        proposal.decided_at = Some(at);
        Ok(proposal.clone())
    }
}

impl Default for NegotiationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crypto::generate_keypair, orderbook::Side};

    fn sample_order() -> Order {
        let kp = generate_keypair();
        Order::create_local(
            "alice".into(),
            "peer-alice".into(),
            &kp,
            Side::Sell,
            "ZEC".into(),
            "zcash".into(),
            "STRK".into(),
            "starknet".into(),
            10_000,
            25.0,
            30.0,
            1_700_000_000,
            3600,
        )
        .unwrap()
    }

    #[test]
    fn propose_then_accept_reaches_terminal_state() {
        let engine = NegotiationEngine::new();
        let order = sample_order();
        let proposal = engine
            .propose(&order, "peer-bob".into(), "bob".into(), None, None, 10_000, 27.5, 1, 1_700_000_100)
            .unwrap();
        let decided = engine
            .decide(&proposal.proposal_id, true, Some("maker-base".into()), Some("maker-quote".into()), 1_700_000_200)
            .unwrap();
        assert_eq!(decided.status, ProposalStatus::Accepted);
    }

    #[test]
    fn out_of_range_price_is_constraint_violated() {
        let engine = NegotiationEngine::new();
        let order = sample_order();
        let result = engine.propose(&order, "peer-bob".into(), "bob".into(), None, None, 10_000, 500.0, 1, 1_700_000_100);
        assert!(matches!(result, Err(NegotiationError::ConstraintViolated(_))));
    }

    #[test]
    fn second_proposal_on_same_pair_supersedes_the_first() {
        let engine = NegotiationEngine::new();
        let order = sample_order();
        let first = engine
            .propose(&order, "peer-bob".into(), "bob".into(), None, None, 10_000, 26.0, 1, 1_700_000_100)
            .unwrap();
        engine
            .propose(&order, "peer-bob".into(), "bob".into(), None, None, 10_000, 26.5, 2, 1_700_000_150)
            .unwrap();
        let refreshed_first = engine.get(&first.proposal_id).unwrap().unwrap();
        assert_eq!(refreshed_first.status, ProposalStatus::Superseded);

        let late_accept = engine.decide(&first.proposal_id, true, None, None, 1_700_000_200);
        assert!(matches!(late_accept, Err(NegotiationError::Superseded)));
    }

    #[test]
    fn duplicate_nonce_is_idempotent() {
        let engine = NegotiationEngine::new();
        let order = sample_order();
        let first = engine
            .propose(&order, "peer-bob".into(), "bob".into(), None, None, 10_000, 26.0, 7, 1_700_000_100)
            .unwrap();
        let second = engine
            .propose(&order, "peer-bob".into(), "bob".into(), None, None, 10_000, 26.0, 7, 1_700_000_100)
            .unwrap();
        assert_eq!(first.proposal_id, second.proposal_id);
        assert_eq!(second.status, ProposalStatus::Pending);
    }
}
