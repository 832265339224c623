use serde::{Deserialize, Serialize};

use crate::orderbook::OrderId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub String);

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    Superseded,
    Expired,
}

impl ProposalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProposalStatus::Pending)
    }
}

/// A taker's offer against one order: amount and price inside the order's
/// advertised range, plus the proposal's current position in the state
/// machine of spec.md 4.7.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proposal {
    pub proposal_id: ProposalId,
    pub order_id: OrderId,
    pub taker_peer_id: String,
    pub taker_username: String,
    pub maker_base_address: Option<String>,
    pub maker_quote_address: Option<String>,
    pub taker_base_address: Option<String>,
    pub taker_quote_address: Option<String>,
    pub amount: u64,
    pub price: f64,
    pub status: ProposalStatus,
    pub round: u32,
    pub proposed_at: u64,
    pub decided_at: Option<u64>,
}
