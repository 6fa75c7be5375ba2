//! Shared application state.

use axum::extract::FromRef;
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::Key;
use std::sync::Arc;
use token_handler_auth::{AuthFlow, TokenInjector};
use token_handler_session::{CookieSessionStore, SessionBackend};

/// State shared by all handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    flow: AuthFlow,
    injector: TokenInjector,
    backend: Arc<dyn SessionBackend>,
    key: Key,
    http: reqwest::Client,
}

impl AppState {
    /// Creates the application state.
    ///
    /// `http` is used to forward proxied requests.
    #[must_use]
    pub fn new(
        flow: AuthFlow,
        backend: Arc<dyn SessionBackend>,
        key: Key,
        http: reqwest::Client,
    ) -> Self {
        let injector = flow.token_injector();
        Self {
            flow,
            injector,
            backend,
            key,
            http,
        }
    }

    #[must_use]
    pub fn flow(&self) -> &AuthFlow {
        &self.flow
    }

    #[must_use]
    pub fn injector(&self) -> &TokenInjector {
        &self.injector
    }

    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Returns a session store over the request's cookies.
    #[must_use]
    pub fn cookie_store(&self, jar: PrivateCookieJar) -> CookieSessionStore {
        CookieSessionStore::new(Arc::clone(&self.backend), jar)
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}
