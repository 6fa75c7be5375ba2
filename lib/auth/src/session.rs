//! Persistence of the authenticated session.
//!
//! There is one authenticated session per client, saved under a fixed
//! cookie name scoped to the whole site. Saving a new session overwrites the
//! previous one.

use crate::record::{AuthenticatedSession, SessionRecord};
use token_handler_core::Result;
use token_handler_session::{SessionOptions, SessionStore, StoreError};
use tracing::warn;

/// Name of the cookie the authenticated session is saved under.
pub const SESSION_COOKIE: &str = "token";

/// Default lifetime of an authenticated session.
pub const DEFAULT_SESSION_TTL: time::Duration = time::Duration::days(30);

/// Saves and loads the [`AuthenticatedSession`].
#[derive(Debug, Clone)]
pub struct AuthSessionStore {
    ttl: time::Duration,
    secure: bool,
}

impl AuthSessionStore {
    /// Creates an adapter for sessions living `ttl`.
    #[must_use]
    pub fn new(ttl: time::Duration, secure: bool) -> Self {
        Self { ttl, secure }
    }

    /// Returns the options the session is saved with.
    #[must_use]
    pub fn options(&self) -> SessionOptions {
        SessionOptions::new("/", self.ttl).with_secure(self.secure)
    }

    /// Saves `session`, replacing any existing one.
    pub async fn save<S>(
        &self,
        store: &mut S,
        session: &AuthenticatedSession,
    ) -> Result<(), StoreError>
    where
        S: SessionStore + ?Sized,
    {
        let value = serde_json::to_value(SessionRecord::Authenticated(session.clone())).map_err(
            |e| StoreError::Serialization {
                details: e.to_string(),
            },
        )?;
        store.save(SESSION_COOKIE, value, &self.options()).await
    }

    /// Loads the session, or `None` if there is none or it is malformed.
    pub async fn load<S>(&self, store: &S) -> Result<Option<AuthenticatedSession>, StoreError>
    where
        S: SessionStore + ?Sized,
    {
        let Some(value) = store.get(SESSION_COOKIE).await? else {
            return Ok(None);
        };

        match serde_json::from_value(value) {
            Ok(SessionRecord::Authenticated(session)) => Ok(Some(session)),
            Ok(SessionRecord::Pending(_)) => {
                warn!("session cookie holds a pending authentication");
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "discarding malformed session");
                Ok(None)
            }
        }
    }

    /// Invalidates the session.
    pub async fn invalidate<S>(&self, store: &mut S) -> Result<(), StoreError>
    where
        S: SessionStore + ?Sized,
    {
        store
            .invalidate(SESSION_COOKIE, &SessionOptions::expired("/"))
            .await
    }
}
