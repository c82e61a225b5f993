//! Authenticated identity as a process-wide observable handle.
//!
//! The identity is effectively global mutable state: one signed-in user per
//! process, read fresh on every transport call and never cached inside the
//! core. `AuthHandle` wraps it in a watch channel so the conversation store
//! can react to sign-in and sign-out without polling.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// The authenticated identity as seen by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer credential attached to every backend call.
    pub access_token: String,
    /// Email of the signed-in user, when the auth service reports it.
    pub email: Option<String>,
}

impl AuthSession {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            email: None,
        }
    }
}

/// Source of the bearer credential for outgoing requests.
///
/// Implementations must read the current credential at call time; the
/// transport never caches tokens across requests.
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Shared, observable handle to the current authenticated identity.
#[derive(Clone)]
pub struct AuthHandle {
    tx: Arc<watch::Sender<Option<AuthSession>>>,
}

impl AuthHandle {
    /// Creates a handle in the signed-out state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Installs a new identity, notifying all subscribers.
    pub fn sign_in(&self, session: AuthSession) {
        let _ = self.tx.send(Some(session));
    }

    /// Clears the identity, notifying all subscribers.
    pub fn sign_out(&self) {
        let _ = self.tx.send(None);
    }

    /// Returns the current identity, if any.
    pub fn current(&self) -> Option<AuthSession> {
        self.tx.borrow().clone()
    }

    /// Subscribes to identity changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthSession>> {
        self.tx.subscribe()
    }
}

impl Default for AuthHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenProvider for AuthHandle {
    fn access_token(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|s| s.access_token.clone())
    }
}
