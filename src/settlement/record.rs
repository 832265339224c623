//! The [`Settlement`] entity (spec.md 3): the authoritative local record of
//! one two-chain HTLC swap, keyed by proposal id.

use serde::{Deserialize, Serialize};

use crate::connectors::TxRef;

/// Which side of the swap this node's user occupies for a given settlement.
/// The Maker is always the secret-holder (spec.md 4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Maker,
    Taker,
}

/// The settlement state machine (spec.md 4.8). `NeedsOperatorAttention` is
/// not itself a terminal outcome — it is a flag surfaced alongside whatever
/// state the settlement was in when its backoff budget ran out (spec.md 7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementState {
    Initiated,
    MakerLocked,
    BothLocked,
    SecretRevealed,
    Completed,
    TakerTimedOut,
    MakerAbandoned,
}

/// A chain+address pair naming where a party's funds for this settlement
/// live.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainAddress {
    pub chain: String,
    pub address: String,
}

/// The authoritative local record of one settlement, keyed by proposal id
/// (spec.md 3). Owned locally; kept in sync with the counterparty's node
/// only through Bus transitions (spec.md 4.8, 4.10), never by direct
/// reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settlement {
    pub proposal_id: String,
    pub role: Role,
    pub maker: ChainAddress,
    pub taker: ChainAddress,
    pub maker_amount: u64,
    pub taker_amount: u64,
    pub hash_lock: [u8; 32],
    /// Present only on the secret-holder (the Maker), and only until the
    /// claim on the taker chain has been submitted (spec.md 3, 9).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<[u8; 32]>,
    pub maker_lock_txref: Option<TxRef>,
    pub taker_lock_txref: Option<TxRef>,
    pub maker_claim_txref: Option<TxRef>,
    pub taker_claim_txref: Option<TxRef>,
    pub maker_timeout: u64,
    pub taker_timeout: u64,
    pub state: SettlementState,
    pub needs_operator_attention: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Settlement {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            SettlementState::Completed | SettlementState::TakerTimedOut | SettlementState::MakerAbandoned
        )
    }
}

/// The wire shape published on `settlement.status.<proposal_id>` and
/// `settlement.request.<proposal_id>` (spec.md 4.8, 4.10): `{proposal_id,
/// state, txrefs, timestamp}`, plus the terms a Taker-side coordinator needs
/// to self-initiate once it learns a Maker has locked.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementStatus {
    pub proposal_id: String,
    pub state: SettlementState,
    pub maker_lock_txref: Option<TxRef>,
    pub taker_lock_txref: Option<TxRef>,
    pub maker_claim_txref: Option<TxRef>,
    pub taker_claim_txref: Option<TxRef>,
    pub needs_operator_attention: bool,
    pub timestamp: u64,
}

impl From<&Settlement> for SettlementStatus {
    fn from(s: &Settlement) -> Self {
        Self {
            proposal_id: s.proposal_id.clone(),
            state: s.state,
            maker_lock_txref: s.maker_lock_txref.clone(),
            taker_lock_txref: s.taker_lock_txref.clone(),
            maker_claim_txref: s.maker_claim_txref.clone(),
            taker_claim_txref: s.taker_claim_txref.clone(),
            needs_operator_attention: s.needs_operator_attention,
            timestamp: s.updated_at,
        }
    }
}

/// Published on `settlement.request.<proposal_id>` by the Maker once it has
/// locked, so the Taker-side coordinator (a separate process) can
/// self-initiate its half of the settlement (spec.md 4.10: "coordinator ->
/// external settlement worker, when externalized").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub proposal_id: String,
    pub maker: ChainAddress,
    pub taker: ChainAddress,
    pub maker_amount: u64,
    pub taker_amount: u64,
    pub hash_lock: [u8; 32],
    pub maker_timeout: u64,
    pub taker_timeout: u64,
}

/// Published on `settlement.secret.<proposal_id>` the moment a secret is
/// observed on-chain, so the counterparty's coordinator can claim without
/// waiting on its own chain observer to notice (spec.md 4.10).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementSecret {
    pub proposal_id: String,
    pub secret: [u8; 32],
}
