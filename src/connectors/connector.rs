use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::crypto;

use super::ConnectorError;

pub type TxRef = String;

/// The digest function a connector's chain uses to verify a hash-lock.
/// The coordinator refuses to start a settlement whose two connectors
/// disagree (spec.md 4.9, 9 — "the design mandates one algorithm per
/// settlement and refuses mixed pairs").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    /// A second, distinct digest kept only to exercise the mismatch guard
    /// end to end (spec.md 8, scenario 6); no production connector in this
    /// repo actually verifies hash-locks with it.
    AltDigestStub,
}

impl HashAlgorithm {
    pub fn digest(self, preimage: &[u8; 32]) -> [u8; 32] {
        match self {
            HashAlgorithm::Sha256 => crypto::sha256(preimage),
            HashAlgorithm::AltDigestStub => crypto::sha256(&[preimage.as_slice(), b"alt"].concat()),
        }
    }
}

#[derive(Clone, Debug)]
pub enum ConnectorEvent {
    Locked { txref: TxRef },
    Claimed { secret: [u8; 32], txref: TxRef },
    Refunded { txref: TxRef },
}

/// A chain-specific capability behind a uniform interface. `lock`/`claim`/
/// `refund` are idempotent per hash: a second call observes the already-
/// submitted transaction rather than submitting a new one.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    fn hash_algorithm(&self) -> HashAlgorithm;

    async fn lock(
        &self,
        hash: [u8; 32],
        receiver: &str,
        amount: u64,
        timeout_unix: u64,
    ) -> Result<TxRef, ConnectorError>;

    async fn claim(&self, hash: [u8; 32], secret: [u8; 32]) -> Result<TxRef, ConnectorError>;

    async fn refund(&self, hash: [u8; 32]) -> Result<TxRef, ConnectorError>;

    /// Subscribes to events for one hash-lock, restartable from a
    /// checkpoint (an opaque, connector-defined cursor).
    async fn observe(&self, hash: [u8; 32], checkpoint: Option<u64>) -> mpsc::Receiver<ConnectorEvent>;

    async fn balance(&self, address: &str) -> Result<u64, ConnectorError>;

    async fn address_for(&self, username: &str) -> Result<String, ConnectorError>;

    /// Credits `address` out of band, e.g. a testnet faucet. Production
    /// connectors have no such capability; the default rejects it so a
    /// real chain can't silently mint funds through this interface.
    async fn fund(&self, _address: &str, _amount: u64) -> Result<(), ConnectorError> {
        Err(ConnectorError::Invalid("this connector has no faucet".into()))
    }
}
