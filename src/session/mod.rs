//! Operator session: the credential slot every backend call consults.
//!
//! A single [`SessionContext`] is created at start-up and handed by `Arc`
//! to every collaborator that talks to the backend. Collaborators ask it
//! for the current [`Credential`] immediately before each call and skip
//! the call when none is present.

pub mod inactivity;

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::persistence::PersistentStore;

/// Storage key holding the persisted credential.
pub const AUTH_SESSION_KEY: &str = "auth.session";

/// Operator role reported by the authentication provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Clinic administrator.
    Admin,
    /// Front-desk staff.
    Staff,
    /// Clinician.
    Doctor,
}

/// Bearer credential plus the identity it belongs to.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Credential {
    /// Bearer token sent on every backend call.
    pub token: String,
    /// Operator identifier.
    pub user_id: String,
    /// Operator role.
    pub role: Role,
}

impl Credential {
    /// Construct a credential.
    #[must_use]
    pub fn new(token: impl Into<String>, user_id: impl Into<String>, role: Role) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
            role,
        }
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .finish()
    }
}

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// Operator logged out.
    UserRequested,
    /// Inactivity timeout expired.
    Inactivity,
    /// No session has been established yet.
    NotSignedIn,
}

/// Authentication state published to every surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// A credential is present.
    Authenticated {
        /// Operator identifier.
        user_id: String,
        /// Operator role.
        role: Role,
    },
    /// No credential; surfaces must show the sign-in state.
    Unauthenticated {
        /// Why the session is absent.
        reason: LogoutReason,
    },
}

/// Process-wide credential slot, injected into collaborators.
pub struct SessionContext {
    credential: RwLock<Option<Credential>>,
    store: Arc<PersistentStore>,
    auth_tx: watch::Sender<AuthState>,
}

impl SessionContext {
    /// Create an empty, unauthenticated session.
    #[must_use]
    pub fn new(store: Arc<PersistentStore>) -> Self {
        let (auth_tx, _) = watch::channel(AuthState::Unauthenticated {
            reason: LogoutReason::NotSignedIn,
        });
        Self {
            credential: RwLock::new(None),
            store,
            auth_tx,
        }
    }

    /// Reload a previously persisted credential. Returns whether one was found.
    pub async fn restore(&self) -> bool {
        let persisted: Option<Credential> = self.store.load(AUTH_SESSION_KEY, None).await;
        match persisted {
            Some(credential) => {
                info!(user_id = %credential.user_id, "restored persisted session");
                self.install(credential);
                true
            }
            None => false,
        }
    }

    /// Store a credential after successful authentication.
    pub fn login(&self, credential: Credential) {
        info!(user_id = %credential.user_id, role = ?credential.role, "session established");
        self.store.put(AUTH_SESSION_KEY, &credential);
        self.install(credential);
    }

    /// Current credential, if signed in.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a credential is present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Subscribe to authentication state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.auth_tx.subscribe()
    }

    /// Current authentication state.
    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        self.auth_tx.borrow().clone()
    }

    /// Clear the credential and its persisted copy.
    ///
    /// Idempotent: returns `false` when there was nothing to clear.
    pub async fn logout(&self, reason: LogoutReason) -> bool {
        let previous = self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(previous) = previous else {
            debug!(?reason, "logout requested with no active session");
            return false;
        };

        self.store.remove(AUTH_SESSION_KEY).await;
        self.auth_tx
            .send_replace(AuthState::Unauthenticated { reason });
        info!(user_id = %previous.user_id, ?reason, "session ended");
        true
    }

    fn install(&self, credential: Credential) {
        let state = AuthState::Authenticated {
            user_id: credential.user_id.clone(),
            role: credential.role,
        };
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(credential);
        self.auth_tx.send_replace(state);
    }
}
