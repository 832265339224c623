//! Chain Connectors: a uniform capability set behind which any concrete
//! chain integration is plugged in. The coordinator only ever talks to this
//! trait object, selected once per chain at node start (spec.md 9: "dynamic
//! dispatch across connectors").

mod connector;
pub mod mock;

pub use connector::{ChainConnector, ConnectorEvent, HashAlgorithm, TxRef};

#[derive(Debug, Clone)]
pub enum ConnectorError {
    Transient(String),
    Invalid(String),
}

impl std::fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for ConnectorError {}
