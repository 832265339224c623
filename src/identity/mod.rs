//! Identity & Session Store (spec.md 4.2): user accounts with a salted
//! slow-KDF password verifier and a long-lived signing/encryption key pair,
//! plus ephemeral bearer sessions. All operations are guarded by a single
//! reader-writer lock over the whole store, the same discipline the teacher
//! applies to its wallet and maker connection-state tables (spec.md 5).

mod session;
mod store;
mod user;

pub use session::{Session, SessionToken};
pub use store::{IdentityStore, DEFAULT_SESSION_TTL_SECS};
pub use user::User;

/// Errors raised by identity operations.
#[derive(Debug)]
pub enum IdentityError {
    UsernameTaken,
    BadCredentials,
    Unauthorized,
    Poisoned,
}

impl<T> From<std::sync::PoisonError<T>> for IdentityError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for IdentityError {}
