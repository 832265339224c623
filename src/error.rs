//! Top-level error taxonomy for the coordinator.
//!
//! Every component in this crate (crypto, identity, gossip, order book,
//! negotiation, settlement) defines its own local error enum, the same way
//! the teacher codebase gives each of `maker`, `taker` and `market::directory`
//! their own error type. Those local errors convert into [`CoreError`] at the
//! boundary the HTTP layer and CLI actually observe, collapsing onto the kind
//! taxonomy from the design's error-handling section.

use std::fmt;

use crate::{
    bus::BusError, connectors::ConnectorError, crypto::CryptoError, gossip::GossipError,
    identity::IdentityError, negotiation::NegotiationError, orderbook::OrderBookError,
    peer::PeerDirectoryError, protocol::ProtocolError as WireProtocolError,
    settlement::SettlementError,
};

/// The error kind taxonomy named in the design's error-handling section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ProtocolError,
    AuthFailed,
    Unauthorized,
    NotFound,
    ConstraintViolated,
    NoRoute,
    Transient,
    Exhausted,
    Conflict,
    Fatal,
}

/// Unified error type seen by the HTTP layer and the CLI.
#[derive(Debug)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Maps the error kind onto the HTTP status codes named in spec.md 7.
    pub fn http_status(&self) -> u16 {
        match self.kind {
            ErrorKind::ProtocolError => 400,
            ErrorKind::ConstraintViolated => 400,
            ErrorKind::AuthFailed => 401,
            ErrorKind::Unauthorized => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::NoRoute => 503,
            ErrorKind::Transient => 503,
            ErrorKind::Exhausted => 503,
            ErrorKind::Fatal => 500,
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CoreError {}

impl From<CryptoError> for CoreError {
    fn from(value: CryptoError) -> Self {
        match value {
            CryptoError::AuthFailed => Self::new(ErrorKind::AuthFailed, "decryption failed"),
            CryptoError::BadSignature => Self::new(ErrorKind::AuthFailed, "signature invalid"),
            other => Self::new(ErrorKind::Fatal, format!("{:?}", other)),
        }
    }
}

impl From<IdentityError> for CoreError {
    fn from(value: IdentityError) -> Self {
        match value {
            IdentityError::UsernameTaken => {
                Self::new(ErrorKind::Conflict, "username already registered")
            }
            IdentityError::BadCredentials => {
                Self::new(ErrorKind::AuthFailed, "bad username or password")
            }
            IdentityError::Unauthorized => {
                Self::new(ErrorKind::Unauthorized, "missing or expired session")
            }
            IdentityError::Poisoned => Self::new(ErrorKind::Fatal, "identity store poisoned"),
        }
    }
}

impl From<PeerDirectoryError> for CoreError {
    fn from(value: PeerDirectoryError) -> Self {
        match value {
            PeerDirectoryError::BadSignature => {
                Self::new(ErrorKind::AuthFailed, "hello signature invalid")
            }
            PeerDirectoryError::KeyReplacementRefused => {
                Self::new(ErrorKind::AuthFailed, "key rotation not signed by previous key")
            }
            PeerDirectoryError::Poisoned => Self::new(ErrorKind::Fatal, "peer directory poisoned"),
        }
    }
}

impl From<WireProtocolError> for CoreError {
    fn from(value: WireProtocolError) -> Self {
        Self::new(ErrorKind::ProtocolError, format!("{:?}", value))
    }
}

impl From<GossipError> for CoreError {
    fn from(value: GossipError) -> Self {
        match value {
            GossipError::NoRoute => Self::new(ErrorKind::NoRoute, "peer not connected"),
            GossipError::Io(e) => Self::new(ErrorKind::ProtocolError, e.to_string()),
        }
    }
}

impl From<OrderBookError> for CoreError {
    fn from(value: OrderBookError) -> Self {
        match value {
            OrderBookError::NotFound => Self::new(ErrorKind::NotFound, "order not found"),
            OrderBookError::ConstraintViolated(msg) => {
                Self::new(ErrorKind::ConstraintViolated, msg)
            }
            OrderBookError::Poisoned => Self::new(ErrorKind::Fatal, "order book poisoned"),
        }
    }
}

impl From<NegotiationError> for CoreError {
    fn from(value: NegotiationError) -> Self {
        match value {
            NegotiationError::NotFound => Self::new(ErrorKind::NotFound, "proposal not found"),
            NegotiationError::ConstraintViolated(msg) => {
                Self::new(ErrorKind::ConstraintViolated, msg)
            }
            NegotiationError::Superseded => {
                Self::new(ErrorKind::Conflict, "proposal already terminal")
            }
            NegotiationError::Poisoned => Self::new(ErrorKind::Fatal, "negotiation table poisoned"),
        }
    }
}

impl From<SettlementError> for CoreError {
    fn from(value: SettlementError) -> Self {
        match value {
            SettlementError::NotFound => Self::new(ErrorKind::NotFound, "settlement not found"),
            SettlementError::DigestMismatch => Self::new(
                ErrorKind::ConstraintViolated,
                "connectors disagree on hash-lock digest algorithm",
            ),
            SettlementError::Connector(ConnectorError::Transient(msg)) => {
                Self::new(ErrorKind::Transient, msg)
            }
            SettlementError::Connector(ConnectorError::Invalid(msg)) => {
                Self::new(ErrorKind::ConstraintViolated, msg)
            }
            SettlementError::Exhausted => {
                Self::new(ErrorKind::Exhausted, "backoff budget exhausted")
            }
            SettlementError::Poisoned => Self::new(ErrorKind::Fatal, "settlement table poisoned"),
        }
    }
}

impl From<BusError> for CoreError {
    fn from(value: BusError) -> Self {
        Self::new(ErrorKind::Transient, format!("{:?}", value))
    }
}

impl From<ConnectorError> for CoreError {
    fn from(value: ConnectorError) -> Self {
        match value {
            ConnectorError::Transient(msg) => Self::new(ErrorKind::Transient, msg),
            ConnectorError::Invalid(msg) => Self::new(ErrorKind::ConstraintViolated, msg),
        }
    }
}
