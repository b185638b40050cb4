//! Boundary to the credential store. The controller only asks whether someone
//! is signed in; the sign-in protocol lives elsewhere.

use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
}

pub trait IdentityProvider: Send + Sync {
    fn active_identity(&self) -> Option<Identity>;
    fn sign_out(&self);
}

/// Provider for deployments without sign-in.
pub struct AnonymousIdentity;

impl IdentityProvider for AnonymousIdentity {
    fn active_identity(&self) -> Option<Identity> {
        None
    }

    fn sign_out(&self) {}
}

/// Holds an identity obtained out of band until it is signed out.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    current: RwLock<Option<Identity>>,
}

impl StaticIdentity {
    pub fn new(identity: Identity) -> Self {
        Self {
            current: RwLock::new(Some(identity)),
        }
    }

    pub fn sign_in(&self, identity: Identity) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(identity);
    }
}

impl IdentityProvider for StaticIdentity {
    fn active_identity(&self) -> Option<Identity> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn sign_out(&self) {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
