//! Negotiation Engine: the per-`(order_id, taker_peer)` proposal state
//! machine (propose/accept/reject/cancel/expire), with supersession when a
//! later proposal on the same pair is accepted while an earlier one is
//! still pending.

mod engine;
mod proposal;

pub use engine::NegotiationEngine;
pub use proposal::{Proposal, ProposalId, ProposalStatus};

#[derive(Debug)]
pub enum NegotiationError {
    NotFound,
    ConstraintViolated(String),
    Superseded,
    Poisoned,
}

impl<T> From<std::sync::PoisonError<T>> for NegotiationError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

impl std::fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for NegotiationError {}
