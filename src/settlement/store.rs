//! The Settlement table: one reader-writer lock over every settlement this
//! node knows about, held only for the constant-time critical section
//! (spec.md 5). All state transitions for a given proposal are serialized
//! through this store, never interleaved with another transition on the
//! same proposal.

use std::{collections::HashMap, sync::RwLock};

use super::{Settlement, SettlementError};

#[derive(Default)]
pub struct SettlementStore {
    inner: RwLock<HashMap<String, Settlement>>,
}

impl SettlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, settlement: Settlement) -> Result<(), SettlementError> {
        self.inner.write()?.insert(settlement.proposal_id.clone(), settlement);
        Ok(())
    }

    pub fn get(&self, proposal_id: &str) -> Result<Option<Settlement>, SettlementError> {
        Ok(self.inner.read()?.get(proposal_id).cloned())
    }

    pub fn list(&self) -> Result<Vec<Settlement>, SettlementError> {
        let mut list: Vec<Settlement> = self.inner.read()?.values().cloned().collect();
        list.sort_by_key(|s| s.created_at);
        Ok(list)
    }

    /// Applies `apply` to the settlement under the write lock and returns the
    /// updated record, so a caller can both mutate and observe the result
    /// without a second lock acquisition racing another transition.
    pub fn update(
        &self,
        proposal_id: &str,
        apply: impl FnOnce(&mut Settlement),
    ) -> Result<Settlement, SettlementError> {
        let mut inner = self.inner.write()?;
        let settlement = inner.get_mut(proposal_id).ok_or(SettlementError::NotFound)?;
        apply(settlement);
        Ok(settlement.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::{ChainAddress, Role, SettlementState};

    fn sample() -> Settlement {
        Settlement {
            proposal_id: "p-1".into(),
            role: Role::Maker,
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
            hash_lock: [1u8; 32],
            secret: Some([2u8; 32]),
            maker_lock_txref: None,
            taker_lock_txref: None,
            maker_claim_txref: None,
            taker_claim_txref: None,
            maker_timeout: 2_000,
            taker_timeout: 1_000,
            state: SettlementState::Initiated,
            needs_operator_attention: false,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        }
    }

    #[test]
    fn insert_and_get_round_trip() {
        let store = SettlementStore::new();
        store.insert(sample()).unwrap();
        let fetched = store.get("p-1").unwrap().unwrap();
        assert_eq!(fetched.maker_amount, 10_000);
    }

    #[test]
    fn update_on_unknown_proposal_is_not_found() {
        let store = SettlementStore::new();
        let result = store.update("ghost", |s| s.state = SettlementState::Completed);
        assert!(matches!(result, Err(SettlementError::NotFound)));
    }

    #[test]
    fn update_mutates_and_returns_the_new_state() {
        let store = SettlementStore::new();
        store.insert(sample()).unwrap();
        let updated = store
            .update("p-1", |s| s.state = SettlementState::MakerLocked)
            .unwrap();
        assert_eq!(updated.state, SettlementState::MakerLocked);
    }
}
