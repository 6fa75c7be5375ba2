//! Persistence of pending authentications.
//!
//! A pending authentication is saved under a cookie named after its state,
//! path-scoped to the auth endpoints and short-lived. Expiry is left to the
//! store.

use crate::record::{PendingAuthentication, SessionRecord};
use token_handler_core::{Result, StateId};
use token_handler_session::{SessionOptions, SessionStore, StoreError};
use tracing::warn;

/// Default lifetime of a pending authentication.
pub const DEFAULT_PENDING_TTL: time::Duration = time::Duration::seconds(300);

/// Saves and loads [`PendingAuthentication`]s.
#[derive(Debug, Clone)]
pub struct PendingAuthStore {
    path: String,
    ttl: time::Duration,
    secure: bool,
}

impl PendingAuthStore {
    /// Creates an adapter scoping pending cookies to `path`.
    #[must_use]
    pub fn new(path: impl Into<String>, ttl: time::Duration, secure: bool) -> Self {
        Self {
            path: path.into(),
            ttl,
            secure,
        }
    }

    /// Returns the options pending authentications are saved with.
    #[must_use]
    pub fn options(&self) -> SessionOptions {
        SessionOptions::new(self.path.clone(), self.ttl).with_secure(self.secure)
    }

    /// Saves `pending` under its state.
    pub async fn save<S>(
        &self,
        store: &mut S,
        pending: &PendingAuthentication,
    ) -> Result<(), StoreError>
    where
        S: SessionStore + ?Sized,
    {
        let value = serde_json::to_value(SessionRecord::Pending(pending.clone())).map_err(|e| {
            StoreError::Serialization {
                details: e.to_string(),
            }
        })?;
        store
            .save(pending.state().as_str(), value, &self.options())
            .await
    }

    /// Loads the pending authentication for `state`.
    ///
    /// Returns `None` if there is none, it has expired, or the stored value
    /// is not a pending authentication for this state.
    pub async fn load<S>(
        &self,
        store: &S,
        state: &StateId,
    ) -> Result<Option<PendingAuthentication>, StoreError>
    where
        S: SessionStore + ?Sized,
    {
        let Some(value) = store.get(state.as_str()).await? else {
            return Ok(None);
        };
        Ok(Self::decode(value, state))
    }

    /// Removes the pending authentication for `state` and returns it.
    ///
    /// Of concurrent takes for one state, at most one gets the pending
    /// authentication.
    pub async fn take<S>(
        &self,
        store: &mut S,
        state: &StateId,
    ) -> Result<Option<PendingAuthentication>, StoreError>
    where
        S: SessionStore + ?Sized,
    {
        let expired = SessionOptions::expired(self.path.clone());
        let Some(value) = store.take(state.as_str(), &expired).await? else {
            return Ok(None);
        };
        Ok(Self::decode(value, state))
    }

    fn decode(value: serde_json::Value, state: &StateId) -> Option<PendingAuthentication> {
        match serde_json::from_value(value) {
            Ok(SessionRecord::Pending(pending)) if pending.state() == state => Some(pending),
            Ok(_) => {
                warn!("stored value is not a pending authentication for this state");
                None
            }
            Err(e) => {
                warn!(error = %e, "discarding malformed pending authentication");
                None
            }
        }
    }
}
