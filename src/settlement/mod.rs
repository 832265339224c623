//! Settlement Coordinator (spec.md 4.8): drives an accepted proposal through
//! the two-phase cross-chain lock/claim/refund state machine, bound by a
//! shared HTLC secret, and keeps both sides' Settlement records in sync via
//! the [`crate::bus`].

mod backoff;
mod coordinator;
mod record;
mod store;

pub use coordinator::{
    verify_preimage, SettlementConfig, SettlementCoordinator, DEFAULT_MAKER_TTL_SECS, DEFAULT_SAFETY_GAP_SECS,
    DEFAULT_TAKER_NOSHOW_BOUND_SECS, DEFAULT_TAKER_TTL_SECS,
};
pub use record::{ChainAddress, Role, Settlement, SettlementRequest, SettlementSecret, SettlementState, SettlementStatus};
pub use store::SettlementStore;

use crate::connectors::ConnectorError;

#[derive(Debug)]
pub enum SettlementError {
    NotFound,
    DigestMismatch,
    Connector(ConnectorError),
    Exhausted,
    Poisoned,
}

impl<T> From<std::sync::PoisonError<T>> for SettlementError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

impl From<ConnectorError> for SettlementError {
    fn from(value: ConnectorError) -> Self {
        Self::Connector(value)
    }
}

impl std::fmt::Display for SettlementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for SettlementError {}
