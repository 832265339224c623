//! Bus Adapter: subject-based pub/sub for cross-process settlement status
//! propagation. Publish is fire-and-forget; subscribe is at-least-once. A
//! production NATS-backed implementation is out of scope (spec.md 1) and
//! would implement the same [`BusAdapter`] trait.

mod adapter;
pub mod subjects;

pub use adapter::{BusAdapter, InProcessBus};

#[derive(Debug)]
pub enum BusError {
    Closed,
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for BusError {}
