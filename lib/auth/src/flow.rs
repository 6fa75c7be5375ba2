//! The authentication flow controller.
//!
//! A flow moves through `Pending -> Authenticated` on success. A pending
//! authentication disappears when it is completed (whatever the outcome) or
//! expires; an authenticated session disappears on logout or expiry. No
//! state ever returns to pending.
//!
//! Every operation takes the client's [`SessionStore`] explicitly.

use crate::error::AuthError;
use crate::inject::TokenInjector;
use crate::pending::{DEFAULT_PENDING_TTL, PendingAuthStore};
use crate::pkce::CodeVerifier;
use crate::provider::ProviderRegistry;
use crate::record::{AuthenticatedSession, PendingAuthentication};
use crate::session::{AuthSessionStore, DEFAULT_SESSION_TTL};
use token_handler_core::StateId;
use token_handler_session::SessionStore;
use tracing::{debug, info, instrument, warn};

/// Path the auth endpoints are mounted at.
pub const DEFAULT_AUTH_PATH: &str = "/auths";

/// Cookie scoping and lifetimes used by the flow.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// Path pending-authentication cookies are scoped to.
    pub auth_path: String,
    /// Lifetime of a pending authentication.
    pub pending_ttl: time::Duration,
    /// Lifetime of an authenticated session.
    pub session_ttl: time::Duration,
    /// Whether cookies carry the `Secure` attribute.
    pub secure_cookies: bool,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            auth_path: DEFAULT_AUTH_PATH.to_string(),
            pending_ttl: DEFAULT_PENDING_TTL,
            session_ttl: DEFAULT_SESSION_TTL,
            secure_cookies: true,
        }
    }
}

/// Result of starting an authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedAuthentication {
    pub state: StateId,
    pub authorization_url: String,
}

/// Result of completing an authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedAuthentication {
    pub idp: String,
    pub return_path: String,
}

/// An authenticated session as reported to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: StateId,
    pub idp: String,
}

/// The sessions of a client. There is at most one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionListing {
    pub sessions: Vec<SessionSummary>,
}

impl SessionListing {
    /// Returns the number of sessions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Returns the session ids.
    pub fn ids(&self) -> impl Iterator<Item = &StateId> {
        self.sessions.iter().map(|s| &s.id)
    }
}

/// Orchestrates start, complete, list and terminate.
#[derive(Debug, Clone)]
pub struct AuthFlow {
    providers: ProviderRegistry,
    pending: PendingAuthStore,
    sessions: AuthSessionStore,
}

impl AuthFlow {
    /// Creates a flow over the given providers.
    #[must_use]
    pub fn new(providers: ProviderRegistry, settings: &FlowSettings) -> Self {
        Self {
            providers,
            pending: PendingAuthStore::new(
                settings.auth_path.clone(),
                settings.pending_ttl,
                settings.secure_cookies,
            ),
            sessions: AuthSessionStore::new(settings.session_ttl, settings.secure_cookies),
        }
    }

    /// Returns the provider registry.
    #[must_use]
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Returns a token injector sharing this flow's providers and session
    /// settings.
    #[must_use]
    pub fn token_injector(&self) -> TokenInjector {
        TokenInjector::new(self.providers.clone(), self.sessions.clone())
    }

    /// Starts an authentication with `idp`.
    ///
    /// Persists a pending authentication and returns the URL to send the
    /// browser to.
    #[instrument(skip(self, store, return_path))]
    pub async fn start<S>(
        &self,
        store: &mut S,
        idp: &str,
        return_path: &str,
    ) -> Result<StartedAuthentication, AuthError>
    where
        S: SessionStore + ?Sized,
    {
        validate_return_path(return_path)?;
        let provider = self
            .providers
            .lookup(idp)
            .ok_or_else(|| AuthError::UnknownProvider {
                idp: idp.to_string(),
            })?;

        let verifier = CodeVerifier::generate();
        let state = StateId::generate();
        let authorization_url = provider.authorization_url(&state, &verifier);

        let pending = PendingAuthentication::new(state.clone(), idp, verifier, return_path);
        self.pending
            .save(store, &pending)
            .await
            .map_err(AuthError::store)?;
        debug!("pending authentication created");

        Ok(StartedAuthentication {
            state,
            authorization_url,
        })
    }

    /// Completes the authentication started with `state` using the
    /// authorization `code` returned by the provider.
    ///
    /// The pending authentication is consumed whatever the outcome; a failed
    /// exchange never leaves a session behind.
    #[instrument(skip_all)]
    pub async fn complete<S>(
        &self,
        store: &mut S,
        state: &StateId,
        code: &str,
    ) -> Result<CompletedAuthentication, AuthError>
    where
        S: SessionStore + ?Sized,
    {
        let pending = self
            .pending
            .take(store, state)
            .await
            .map_err(AuthError::store)?
            .ok_or(AuthError::InvalidState)?;

        let idp = pending.idp();
        let provider = self
            .providers
            .lookup(idp)
            .ok_or_else(|| AuthError::UnknownProvider {
                idp: idp.to_string(),
            })?;

        let token = provider
            .exchange_code(code, pending.verifier())
            .await
            .map_err(|cause| {
                warn!(idp, error = %cause, "authorization code exchange failed");
                AuthError::ExchangeFailed {
                    idp: idp.to_string(),
                    cause,
                }
            })?;
        debug!(idp, token_type = token.token_type(), "received token from idp");

        let session = AuthenticatedSession::new(state.clone(), idp, token);
        self.sessions
            .save(store, &session)
            .await
            .map_err(AuthError::store)?;
        info!(idp, "authentication completed");

        Ok(CompletedAuthentication {
            idp: idp.to_string(),
            return_path: pending.return_path().to_string(),
        })
    }

    /// Lists the client's authenticated session.
    ///
    /// A missing or unreadable session is an empty listing, not an error.
    #[instrument(skip_all)]
    pub async fn list<S>(&self, store: &S) -> Result<SessionListing, AuthError>
    where
        S: SessionStore + ?Sized,
    {
        let session = self.sessions.load(store).await.map_err(AuthError::store)?;
        let sessions = session
            .filter(|s| !s.idp().is_empty())
            .map(|s| SessionSummary {
                id: s.session_id().clone(),
                idp: s.idp().to_string(),
            })
            .into_iter()
            .collect();
        Ok(SessionListing { sessions })
    }

    /// Logs out of the session identified by `state`.
    ///
    /// Fails with [`AuthError::NotFound`] if there is no session or it has a
    /// different id; the session is left untouched in that case.
    #[instrument(skip_all)]
    pub async fn terminate<S>(&self, store: &mut S, state: &StateId) -> Result<(), AuthError>
    where
        S: SessionStore + ?Sized,
    {
        let session = self
            .sessions
            .load(&*store)
            .await
            .map_err(AuthError::store)?
            .ok_or(AuthError::NotFound)?;

        if session.session_id() != state {
            debug!("logout requested for a different session");
            return Err(AuthError::NotFound);
        }

        self.sessions
            .invalidate(store)
            .await
            .map_err(AuthError::store)?;
        info!(idp = session.idp(), "session terminated");
        Ok(())
    }
}

/// Accepts empty paths and local absolute paths only.
///
/// Anything the browser could resolve to another origin (absolute URLs,
/// protocol-relative `//host` paths, backslash tricks) is rejected.
pub fn validate_return_path(path: &str) -> Result<(), AuthError> {
    if path.is_empty() {
        return Ok(());
    }

    let local = path.starts_with('/')
        && !path.starts_with("//")
        && !path.starts_with("/\\")
        && !path.chars().any(char::is_control);

    if local {
        Ok(())
    } else {
        Err(AuthError::InvalidReturnPath {
            path: path.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderConfig;
    use crate::session::SESSION_COOKIE;
    use std::collections::HashMap;
    use axum_extra::extract::PrivateCookieJar;
    use axum_extra::extract::cookie::Key;
    use std::sync::Arc;
    use token_handler_session::{
        CookieSessionStore, FileBackend, InMemorySessionStore, MemoryBackend, SessionBackend,
    };
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn flow(token_endpoint: &str) -> AuthFlow {
        let config = ProviderConfig {
            authorization_endpoint: "http://localhost/authorize".to_string(),
            token_endpoint: token_endpoint.to_string(),
            client_id: "client-id".to_string(),
            client_secret: Some("client-secret".to_string()),
            redirect_url: None,
            scopes: Vec::new(),
        };
        let providers = ProviderRegistry::new(
            [("myidp".to_string(), config)],
            reqwest::Client::new(),
        )
        .expect("registry");
        AuthFlow::new(providers, &FlowSettings::default())
    }

    async fn token_server(body: &'static str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
            .mount(&server)
            .await;
        server
    }

    fn query(url: &str) -> HashMap<String, String> {
        reqwest::Url::parse(url)
            .expect("url")
            .query_pairs()
            .into_owned()
            .collect()
    }

    #[tokio::test]
    async fn start_persists_pending_and_builds_url() {
        let flow = flow("http://localhost/token");
        let mut store = InMemorySessionStore::new();

        let started = flow.start(&mut store, "myidp", "/app").await.expect("start");

        let params = query(&started.authorization_url);
        assert_eq!(params["client_id"], "client-id");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["state"], started.state.as_str());

        let pending = flow
            .pending
            .load(&store, &started.state)
            .await
            .expect("load")
            .expect("pending");
        assert_eq!(pending.idp(), "myidp");
        assert_eq!(pending.return_path(), "/app");
        assert_eq!(params["code_challenge"], pending.verifier().challenge());

        let options = store.options(started.state.as_str()).expect("options");
        assert_eq!(options.path(), "/auths");
        assert_eq!(options.max_age(), time::Duration::seconds(300));
    }

    #[tokio::test]
    async fn start_generates_unique_states() {
        let flow = flow("http://localhost/token");
        let mut store = InMemorySessionStore::new();

        let a = flow.start(&mut store, "myidp", "").await.expect("start");
        let b = flow.start(&mut store, "myidp", "").await.expect("start");
        assert_ne!(a.state, b.state);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn start_with_unknown_provider_fails_without_side_effects() {
        let flow = flow("http://localhost/token");
        let mut store = InMemorySessionStore::new();

        let err = flow.start(&mut store, "nope", "/app").await.expect_err("unknown");
        assert_eq!(
            err,
            AuthError::UnknownProvider {
                idp: "nope".to_string()
            }
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn start_rejects_foreign_return_path() {
        let flow = flow("http://localhost/token");
        let mut store = InMemorySessionStore::new();

        let err = flow
            .start(&mut store, "myidp", "https://evil.example.com/")
            .await
            .expect_err("foreign");
        assert!(matches!(err, AuthError::InvalidReturnPath { .. }));
    }

    #[tokio::test]
    async fn complete_with_unknown_state_is_invalid() {
        let flow = flow("http://localhost/token");
        let mut store = InMemorySessionStore::new();

        let err = flow
            .complete(&mut store, &StateId::generate(), "auth-code")
            .await
            .expect_err("invalid");
        assert_eq!(err, AuthError::InvalidState);
    }

    #[tokio::test]
    async fn complete_establishes_session_and_consumes_state() {
        let server = token_server(r#"{"access_token":"xyz","token_type":"Bearer"}"#).await;
        let flow = flow(&format!("{}/token", server.uri()));
        let mut store = InMemorySessionStore::new();

        let started = flow.start(&mut store, "myidp", "/app").await.expect("start");
        let completed = flow
            .complete(&mut store, &started.state, "auth-code")
            .await
            .expect("complete");

        assert_eq!(
            completed,
            CompletedAuthentication {
                idp: "myidp".to_string(),
                return_path: "/app".to_string(),
            }
        );
        assert!(!store.contains(started.state.as_str()));
        assert!(store.contains(SESSION_COOKIE));

        let err = flow
            .complete(&mut store, &started.state, "auth-code")
            .await
            .expect_err("replay");
        assert_eq!(err, AuthError::InvalidState);
    }

    async fn concurrent_completes_exchange_once(backend: Arc<dyn SessionBackend>) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"access_token":"xyz","token_type":"Bearer"}"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;
        let flow = flow(&format!("{}/token", server.uri()));
        let jar = PrivateCookieJar::new(Key::from(&[3u8; 64][..]));

        let mut login = CookieSessionStore::new(backend.clone(), jar);
        let started = flow.start(&mut login, "myidp", "/app").await.expect("start");
        let jar = login.into_jar();

        let mut a = CookieSessionStore::new(backend.clone(), jar.clone());
        let mut b = CookieSessionStore::new(backend, jar);
        let (first, second) = tokio::join!(
            flow.complete(&mut a, &started.state, "auth-code"),
            flow.complete(&mut b, &started.state, "auth-code"),
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .any(|r| r.as_ref().err() == Some(&AuthError::InvalidState))
        );
    }

    #[tokio::test]
    async fn concurrent_completes_over_memory_backend_exchange_once() {
        concurrent_completes_exchange_once(Arc::new(MemoryBackend::new())).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_completes_over_file_backend_exchange_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileBackend::open(dir.path()).await.expect("open");
        concurrent_completes_exchange_once(Arc::new(backend)).await;
    }

    #[tokio::test]
    async fn failed_exchange_creates_no_session_and_consumes_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_raw(r#"{"error":"invalid_grant"}"#, "application/json"),
            )
            .mount(&server)
            .await;
        let flow = flow(&format!("{}/token", server.uri()));
        let mut store = InMemorySessionStore::new();

        let started = flow.start(&mut store, "myidp", "/app").await.expect("start");
        let err = flow
            .complete(&mut store, &started.state, "bad-code")
            .await
            .expect_err("rejected");

        assert!(matches!(err, AuthError::ExchangeFailed { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn list_and_terminate() {
        let server = token_server(r#"{"access_token":"xyz","token_type":"Bearer"}"#).await;
        let flow = flow(&format!("{}/token", server.uri()));
        let mut store = InMemorySessionStore::new();

        assert_eq!(flow.list(&store).await.expect("list").count(), 0);

        let started = flow.start(&mut store, "myidp", "/app").await.expect("start");
        flow.complete(&mut store, &started.state, "auth-code")
            .await
            .expect("complete");

        let listing = flow.list(&store).await.expect("list");
        assert_eq!(listing.count(), 1);
        assert_eq!(listing.sessions[0].idp, "myidp");
        assert_eq!(listing.ids().collect::<Vec<_>>(), vec![&started.state]);

        let err = flow
            .terminate(&mut store, &StateId::from("someone-else"))
            .await
            .expect_err("mismatch");
        assert_eq!(err, AuthError::NotFound);
        assert_eq!(flow.list(&store).await.expect("list").count(), 1);

        flow.terminate(&mut store, &started.state)
            .await
            .expect("terminate");
        assert_eq!(flow.list(&store).await.expect("list").count(), 0);

        let err = flow
            .terminate(&mut store, &started.state)
            .await
            .expect_err("already gone");
        assert_eq!(err, AuthError::NotFound);
    }

    #[test]
    fn return_path_validation() {
        assert!(validate_return_path("").is_ok());
        assert!(validate_return_path("/app").is_ok());
        assert!(validate_return_path("/app?x=1#y").is_ok());
        assert!(validate_return_path("//evil.example.com").is_err());
        assert!(validate_return_path("/\\evil.example.com").is_err());
        assert!(validate_return_path("https://evil.example.com").is_err());
        assert!(validate_return_path("app").is_err());
        assert!(validate_return_path("/a\nb").is_err());
    }
}
