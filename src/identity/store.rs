//! Single reader-writer-locked store for users and sessions (spec.md 4.2, 5).

use std::{
    collections::HashMap,
    sync::RwLock,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::crypto::{generate_keypair, KeyPair};

use super::{
    session::{generate_token, Session, SessionToken},
    user::User,
    IdentityError,
};

/// Default session TTL, per spec.md 4.2.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

struct Inner {
    users: HashMap<String, User>,
    sessions: HashMap<SessionToken, Session>,
}

/// Identity & Session Store. One combined reader-writer lock, held only for
/// the constant-time critical section, matching spec.md 5's shared-state
/// discipline.
pub struct IdentityStore {
    inner: RwLock<Inner>,
    session_ttl_secs: u64,
}

impl Default for IdentityStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL_SECS)
    }
}

impl IdentityStore {
    pub fn new(session_ttl_secs: u64) -> Self {
        Self {
            inner: RwLock::new(Inner {
                users: HashMap::new(),
                sessions: HashMap::new(),
            }),
            session_ttl_secs,
        }
    }

    /// Registers a new user. Rejects with `UsernameTaken` if the username
    /// already exists (spec.md 4.2).
    pub fn register(&self, username: &str, password: &str) -> Result<(), IdentityError> {
        let mut inner = self.inner.write()?;
        if inner.users.contains_key(username) {
            return Err(IdentityError::UsernameTaken);
        }
        let user = User::register(username, password, generate_keypair(), now());
        inner.users.insert(username.to_string(), user);
        Ok(())
    }

    /// Logs in, issuing a bearer session token on success (spec.md 4.2).
    pub fn login(
        &self,
        username: &str,
        password: &str,
        peer_addr: Option<String>,
    ) -> Result<(SessionToken, u64), IdentityError> {
        let mut inner = self.inner.write()?;
        let verified = inner
            .users
            .get(username)
            .map(|u| u.verify_password(password))
            .unwrap_or(false);
        if !verified {
            return Err(IdentityError::BadCredentials);
        }
        let token = generate_token();
        let issued_at = now();
        let expires_at = issued_at + self.session_ttl_secs;
        inner.sessions.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                issued_at,
                expires_at,
                peer_addr,
            },
        );
        Ok((token, expires_at))
    }

    /// Resolves a bearer token to its owning username. Fails `Unauthorized`
    /// if expired or unknown (spec.md 4.2).
    pub fn whoami(&self, token: &str) -> Result<String, IdentityError> {
        let inner = self.inner.read()?;
        let session = inner.sessions.get(token).ok_or(IdentityError::Unauthorized)?;
        if session.is_expired(now()) {
            return Err(IdentityError::Unauthorized);
        }
        Ok(session.username.clone())
    }

    /// Deletes the token. Idempotent: logging out an unknown token is not an
    /// error.
    pub fn logout(&self, token: &str) -> Result<(), IdentityError> {
        let mut inner = self.inner.write()?;
        inner.sessions.remove(token);
        Ok(())
    }

    /// Returns the key pair belonging to `username`, used by the node to
    /// sign on the user's behalf and decrypt inbound negotiation messages.
    pub fn key_pair_for(&self, username: &str) -> Result<KeyPair, IdentityError> {
        let inner = self.inner.read()?;
        inner
            .users
            .get(username)
            .map(|u| u.key_pair.clone())
            .ok_or(IdentityError::Unauthorized)
    }

    /// Every locally registered user's key pair, keyed by username. The
    /// dispatcher uses this to find the right recipient for an inbound
    /// unicast envelope: since the wire ciphertext carries no plaintext
    /// recipient hint (spec.md 4.4), it tries each local user's key in turn
    /// until one decrypts.
    pub fn all_key_pairs(&self) -> Result<Vec<(String, KeyPair)>, IdentityError> {
        let inner = self.inner.read()?;
        Ok(inner
            .users
            .iter()
            .map(|(username, user)| (username.clone(), user.key_pair.clone()))
            .collect())
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_round_trip() {
        let store = IdentityStore::default();
        store.register("alice", "hunter2").unwrap();
        let (token, _) = store.login("alice", "hunter2", None).unwrap();
        assert_eq!(store.whoami(&token).unwrap(), "alice");
    }

    #[test]
    fn wrong_password_never_yields_session() {
        let store = IdentityStore::default();
        store.register("alice", "hunter2").unwrap();
        assert!(matches!(
            store.login("alice", "wrong", None),
            Err(IdentityError::BadCredentials)
        ));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let store = IdentityStore::default();
        store.register("alice", "hunter2").unwrap();
        assert!(matches!(
            store.register("alice", "other"),
            Err(IdentityError::UsernameTaken)
        ));
    }

    #[test]
    fn logout_invalidates_token() {
        let store = IdentityStore::default();
        store.register("alice", "hunter2").unwrap();
        let (token, _) = store.login("alice", "hunter2", None).unwrap();
        store.logout(&token).unwrap();
        assert!(matches!(store.whoami(&token), Err(IdentityError::Unauthorized)));
    }

    #[test]
    fn expired_session_is_unauthorized() {
        let store = IdentityStore::new(0);
        store.register("alice", "hunter2").unwrap();
        let (token, _) = store.login("alice", "hunter2", None).unwrap();
        std::thread::sleep(std::time::Duration::from_secs(1));
        assert!(matches!(store.whoami(&token), Err(IdentityError::Unauthorized)));
    }
}
