//! Error types for the auth crate.
//!
//! - `ProviderError`: failures talking to an identity provider
//! - `AuthError`: failures of the authentication flow and token injection,
//!   one variant per outcome the HTTP layer maps to a status code
//!
//! Neither type ever carries a token, verifier or client secret.

use rootcause::prelude::Report;
use std::fmt;
use token_handler_session::StoreError;

/// Errors from identity provider operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider configuration is invalid (bad endpoint URL, etc.)
    Configuration { reason: String },
    /// The provider answered with an OAuth error response.
    Rejected { reason: String },
    /// The provider could not be reached.
    Transport { reason: String },
    /// The provider answered with something that is not a token response.
    InvalidResponse { reason: String },
}

impl ProviderError {
    /// Returns true if the provider itself refused the request, as opposed
    /// to the request never getting a usable answer.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { reason } => write!(f, "provider configuration error: {reason}"),
            Self::Rejected { reason } => write!(f, "provider rejected the request: {reason}"),
            Self::Transport { reason } => write!(f, "provider unreachable: {reason}"),
            Self::InvalidResponse { reason } => {
                write!(f, "invalid provider response: {reason}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors from the authentication flow and token injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The requested identity provider is not configured.
    UnknownProvider { idp: String },
    /// A stored session references a provider that is no longer configured.
    ProviderMisconfigured { idp: String },
    /// The client-supplied return path is not a local path.
    InvalidReturnPath { path: String },
    /// The state is unknown, expired or already used.
    InvalidState,
    /// The authorization code could not be exchanged for a token.
    ExchangeFailed { idp: String, cause: ProviderError },
    /// No usable session is present.
    Unauthenticated,
    /// The access token expired and could not be refreshed.
    TokenRefreshFailed { idp: String, cause: ProviderError },
    /// The referenced session does not exist or does not match.
    NotFound,
    /// The session store failed.
    StoreUnavailable { details: String },
}

impl AuthError {
    pub(crate) fn store(report: Report<StoreError>) -> Self {
        Self::StoreUnavailable {
            details: report.to_string(),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProvider { idp } => write!(f, "unknown identity provider '{idp}'"),
            Self::ProviderMisconfigured { idp } => {
                write!(f, "session references unconfigured identity provider '{idp}'")
            }
            Self::InvalidReturnPath { path } => write!(f, "invalid return path '{path}'"),
            Self::InvalidState => write!(f, "unknown, expired or already used state"),
            Self::ExchangeFailed { idp, cause } => {
                write!(f, "code exchange with '{idp}' failed: {cause}")
            }
            Self::Unauthenticated => write!(f, "not authenticated"),
            Self::TokenRefreshFailed { idp, cause } => {
                write!(f, "token refresh with '{idp}' failed: {cause}")
            }
            Self::NotFound => write!(f, "session not found"),
            Self::StoreUnavailable { details } => write!(f, "session store unavailable: {details}"),
        }
    }
}

impl std::error::Error for AuthError {}
