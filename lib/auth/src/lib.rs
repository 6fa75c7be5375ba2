//! OAuth 2.0 authorization code flow with PKCE for token-handler.
//!
//! The browser never holds provider tokens. [`AuthFlow`] drives the
//! authorization code flow and keeps the resulting token in the client's
//! session; [`TokenInjector`] attaches it to proxied API requests.
//!
//! All state lives in a [`token_handler_session::SessionStore`] passed into
//! each operation.

pub mod error;
pub mod flow;
pub mod inject;
pub mod pending;
pub mod pkce;
pub mod provider;
pub mod record;
pub mod session;
pub mod token;

pub use error::{AuthError, ProviderError};
pub use flow::{
    AuthFlow, CompletedAuthentication, DEFAULT_AUTH_PATH, FlowSettings, SessionListing,
    SessionSummary, StartedAuthentication, validate_return_path,
};
pub use inject::TokenInjector;
pub use pending::{DEFAULT_PENDING_TTL, PendingAuthStore};
pub use pkce::{ChallengeMethod, CodeVerifier};
pub use provider::{Provider, ProviderConfig, ProviderRegistry, build_http_client};
pub use record::{AuthenticatedSession, PendingAuthentication, SessionRecord};
pub use session::{AuthSessionStore, DEFAULT_SESSION_TTL, SESSION_COOKIE};
pub use token::ProviderToken;
