//! Token injection for proxied requests.
//!
//! The injector loads the client's authenticated session, makes sure its
//! access token is current and writes it into the outbound request's
//! `Authorization` header. Nothing else about the request is touched.

use crate::error::AuthError;
use crate::provider::ProviderRegistry;
use crate::record::AuthenticatedSession;
use crate::session::AuthSessionStore;
use crate::token::ProviderToken;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use token_handler_session::SessionStore;
use tracing::{debug, instrument, warn};

/// Attaches provider-issued access tokens to outbound requests.
#[derive(Debug, Clone)]
pub struct TokenInjector {
    providers: ProviderRegistry,
    sessions: AuthSessionStore,
}

impl TokenInjector {
    #[must_use]
    pub fn new(providers: ProviderRegistry, sessions: AuthSessionStore) -> Self {
        Self {
            providers,
            sessions,
        }
    }

    /// Returns a usable access token for `session`.
    ///
    /// An unexpired token is returned as is. An expired token is refreshed
    /// once and the refreshed token is persisted; the previous refresh token
    /// is kept when the provider omits one.
    #[instrument(skip_all, fields(idp = %session.idp()))]
    pub async fn ensure_fresh_token<S>(
        &self,
        store: &mut S,
        session: &mut AuthenticatedSession,
    ) -> Result<ProviderToken, AuthError>
    where
        S: SessionStore + ?Sized,
    {
        let idp = session.idp().to_string();
        let provider = self
            .providers
            .lookup(&idp)
            .ok_or_else(|| AuthError::ProviderMisconfigured { idp: idp.clone() })?;

        if !session.token().is_expired() {
            return Ok(session.token().clone());
        }

        let Some(refresh_token) = session.token().refresh_token() else {
            debug!("access token expired without refresh token");
            return Err(AuthError::Unauthenticated);
        };

        let refreshed = provider.refresh(refresh_token).await.map_err(|cause| {
            warn!(error = %cause, "token refresh failed");
            AuthError::TokenRefreshFailed {
                idp: idp.clone(),
                cause,
            }
        })?;
        let refreshed = refreshed.inherit_refresh_token(session.token());

        session.set_token(refreshed.clone());
        self.sessions
            .save(store, session)
            .await
            .map_err(AuthError::store)?;
        debug!(refreshed = true, token_type = refreshed.token_type(), "access token refreshed");

        Ok(refreshed)
    }

    /// Sets the `Authorization` header in `headers` from the client's
    /// session.
    ///
    /// Fails with [`AuthError::Unauthenticated`] when the client has no
    /// session.
    #[instrument(skip_all)]
    pub async fn authorize<S>(&self, store: &mut S, headers: &mut HeaderMap) -> Result<(), AuthError>
    where
        S: SessionStore + ?Sized,
    {
        let mut session = self
            .sessions
            .load(&*store)
            .await
            .map_err(AuthError::store)?
            .ok_or(AuthError::Unauthenticated)?;

        let token = self.ensure_fresh_token(store, &mut session).await?;

        let mut value = HeaderValue::from_str(&token.authorization_value()).map_err(|_| {
            warn!(idp = session.idp(), "access token is not a valid header value");
            AuthError::Unauthenticated
        })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}
