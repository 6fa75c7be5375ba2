//! Typed session records.
//!
//! Everything the flow keeps in the session store is a [`SessionRecord`],
//! serialized as JSON tagged by `kind`. A value that does not decode into the
//! expected variant is treated as absent.

use crate::pkce::CodeVerifier;
use crate::token::ProviderToken;
use serde::{Deserialize, Serialize};
use token_handler_core::StateId;

/// A started authorization request awaiting its callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthentication {
    state: StateId,
    idp: String,
    verifier: CodeVerifier,
    #[serde(default)]
    return_path: String,
}

impl PendingAuthentication {
    /// Creates a pending authentication.
    #[must_use]
    pub fn new(
        state: StateId,
        idp: impl Into<String>,
        verifier: CodeVerifier,
        return_path: impl Into<String>,
    ) -> Self {
        Self {
            state,
            idp: idp.into(),
            verifier,
            return_path: return_path.into(),
        }
    }

    /// Returns the one-time state.
    #[must_use]
    pub fn state(&self) -> &StateId {
        &self.state
    }

    /// Returns the identity provider name.
    #[must_use]
    pub fn idp(&self) -> &str {
        &self.idp
    }

    /// Returns the PKCE verifier.
    #[must_use]
    pub fn verifier(&self) -> &CodeVerifier {
        &self.verifier
    }

    /// Returns the path to send the browser to after completion.
    #[must_use]
    pub fn return_path(&self) -> &str {
        &self.return_path
    }
}

/// A session bound to a provider-issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedSession {
    session_id: StateId,
    idp: String,
    token: ProviderToken,
}

impl AuthenticatedSession {
    /// Creates a session. `session_id` is the state that produced it.
    #[must_use]
    pub fn new(session_id: StateId, idp: impl Into<String>, token: ProviderToken) -> Self {
        Self {
            session_id,
            idp: idp.into(),
            token,
        }
    }

    /// Returns the session id reported to the client.
    #[must_use]
    pub fn session_id(&self) -> &StateId {
        &self.session_id
    }

    /// Returns the identity provider name.
    #[must_use]
    pub fn idp(&self) -> &str {
        &self.idp
    }

    /// Returns the current token.
    #[must_use]
    pub fn token(&self) -> &ProviderToken {
        &self.token
    }

    /// Replaces the token after a refresh.
    pub fn set_token(&mut self, token: ProviderToken) {
        self.token = token;
    }
}

/// The tagged form records take in the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionRecord {
    Pending(PendingAuthentication),
    Authenticated(AuthenticatedSession),
}
