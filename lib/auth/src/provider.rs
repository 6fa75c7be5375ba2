//! Identity providers and the registry they are looked up in.
//!
//! A [`Provider`] wraps the resolved OAuth 2.0 client configuration of one
//! identity provider and performs the token endpoint calls for it. The
//! [`ProviderRegistry`] maps provider names to providers and is read-only
//! once built.

use crate::error::ProviderError;
use crate::pkce::CodeVerifier;
use crate::token::ProviderToken;
use oauth2::basic::{BasicClient, BasicErrorResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use token_handler_core::StateId;
use tracing::{debug, instrument};

type OAuthClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Resolved OAuth 2.0 client configuration of an identity provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// The provider's authorization endpoint.
    pub authorization_endpoint: String,
    /// The provider's token endpoint.
    pub token_endpoint: String,
    /// The OAuth2 client ID registered with the provider.
    pub client_id: String,
    /// The OAuth2 client secret.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// The redirect URL registered with the provider.
    #[serde(default)]
    pub redirect_url: Option<String>,
    /// Scopes to request.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[redacted]"))
            .field("redirect_url", &self.redirect_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Builds the HTTP client used for token endpoint calls.
///
/// Redirects are not followed; a token endpoint that redirects is treated
/// as a failure.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Configuration {
            reason: format!("failed to create HTTP client: {e}"),
        })
}

/// An identity provider ready for authorization requests and token calls.
#[derive(Clone)]
pub struct Provider {
    name: String,
    client_id: ClientId,
    client_secret: Option<ClientSecret>,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    redirect_url: Option<RedirectUrl>,
    scopes: Vec<Scope>,
    http: reqwest::Client,
}

impl Provider {
    /// Creates a provider, validating its endpoint URLs.
    pub fn new(
        name: impl Into<String>,
        config: ProviderConfig,
        http: reqwest::Client,
    ) -> Result<Self, ProviderError> {
        let auth_url = AuthUrl::new(config.authorization_endpoint).map_err(|e| {
            ProviderError::Configuration {
                reason: format!("invalid authorization endpoint: {e}"),
            }
        })?;
        let token_url =
            TokenUrl::new(config.token_endpoint).map_err(|e| ProviderError::Configuration {
                reason: format!("invalid token endpoint: {e}"),
            })?;
        let redirect_url = config
            .redirect_url
            .filter(|url| !url.is_empty())
            .map(RedirectUrl::new)
            .transpose()
            .map_err(|e| ProviderError::Configuration {
                reason: format!("invalid redirect URL: {e}"),
            })?;

        Ok(Self {
            name: name.into(),
            client_id: ClientId::new(config.client_id),
            client_secret: config
                .client_secret
                .filter(|secret| !secret.is_empty())
                .map(ClientSecret::new),
            auth_url,
            token_url,
            redirect_url,
            scopes: config.scopes.into_iter().map(Scope::new).collect(),
            http,
        })
    }

    /// Returns the provider's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn client(&self) -> OAuthClient {
        let mut client = BasicClient::new(self.client_id.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_token_uri(self.token_url.clone());
        if let Some(secret) = &self.client_secret {
            client = client.set_client_secret(secret.clone());
        }
        if let Some(redirect_url) = &self.redirect_url {
            client = client.set_redirect_uri(redirect_url.clone());
        }
        client
    }

    /// Builds the URL the browser is sent to for authorization.
    ///
    /// The URL carries the client id, redirect URL, `state` and the PKCE
    /// challenge of `verifier`.
    #[must_use]
    pub fn authorization_url(&self, state: &StateId, verifier: &CodeVerifier) -> String {
        let client = self.client();
        let mut request = client
            .authorize_url(|| CsrfToken::new(state.as_str().to_string()))
            .add_scopes(self.scopes.iter().cloned());
        for (name, value) in verifier.challenge_params() {
            request = request.add_extra_param(name, value);
        }
        let (url, _) = request.url();
        url.to_string()
    }

    /// Exchanges an authorization code for a token.
    #[instrument(skip_all, fields(idp = %self.name))]
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &CodeVerifier,
    ) -> Result<ProviderToken, ProviderError> {
        let client = self.client();
        let mut request = client.exchange_code(AuthorizationCode::new(code.to_string()));
        for (name, value) in verifier.verifier_params() {
            request = request.add_extra_param(name, value);
        }

        let response = request
            .request_async(&self.http)
            .await
            .map_err(classify_token_error)?;
        debug!("authorization code exchanged");
        Ok(ProviderToken::from_response(&response))
    }

    /// Exchanges a refresh token for a new access token.
    #[instrument(skip_all, fields(idp = %self.name))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<ProviderToken, ProviderError> {
        let client = self.client();
        let refresh_token = RefreshToken::new(refresh_token.to_string());
        let response = client
            .exchange_refresh_token(&refresh_token)
            .request_async(&self.http)
            .await
            .map_err(classify_token_error)?;
        debug!("access token refreshed");
        Ok(ProviderToken::from_response(&response))
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .finish_non_exhaustive()
    }
}

fn classify_token_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> ProviderError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => ProviderError::Rejected {
            reason: response.error().as_ref().to_string(),
        },
        RequestTokenError::Request(e) => ProviderError::Transport {
            reason: e.to_string(),
        },
        RequestTokenError::Parse(e, _) => ProviderError::InvalidResponse {
            reason: e.to_string(),
        },
        RequestTokenError::Other(reason) => ProviderError::InvalidResponse { reason },
    }
}

/// Static mapping from provider name to provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<HashMap<String, Provider>>,
}

impl ProviderRegistry {
    /// Builds a registry from resolved configurations sharing one HTTP client.
    pub fn new(
        configs: impl IntoIterator<Item = (String, ProviderConfig)>,
        http: reqwest::Client,
    ) -> Result<Self, ProviderError> {
        let providers = configs
            .into_iter()
            .map(|(name, config)| {
                let provider = Provider::new(name.clone(), config, http.clone())?;
                Ok((name, provider))
            })
            .collect::<Result<HashMap<_, _>, ProviderError>>()?;
        Ok(Self {
            providers: Arc::new(providers),
        })
    }

    /// Looks up a provider by name.
    #[must_use]
    pub fn lookup(&self, idp: &str) -> Option<&Provider> {
        self.providers.get(idp)
    }

    /// Returns the number of configured providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns true if no provider is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkce::ChallengeMethod;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(token_endpoint: &str) -> ProviderConfig {
        ProviderConfig {
            authorization_endpoint: "http://localhost/authorize".to_string(),
            token_endpoint: token_endpoint.to_string(),
            client_id: "client-id".to_string(),
            client_secret: Some("client-secret".to_string()),
            redirect_url: None,
            scopes: Vec::new(),
        }
    }

    fn provider(token_endpoint: &str) -> Provider {
        Provider::new("myidp", config(token_endpoint), reqwest::Client::new()).expect("provider")
    }

    fn query(url: &str) -> HashMap<String, String> {
        reqwest::Url::parse(url)
            .expect("url")
            .query_pairs()
            .into_owned()
            .collect()
    }

    #[test]
    fn authorization_url_carries_client_state_and_challenge() {
        let provider = provider("http://localhost/token");
        let state = StateId::from("state-123");
        let verifier = CodeVerifier::new("verifier", ChallengeMethod::S256);

        let url = provider.authorization_url(&state, &verifier);
        assert!(url.starts_with("http://localhost/authorize?"));

        let params = query(&url);
        assert_eq!(params["client_id"], "client-id");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["state"], "state-123");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["code_challenge"], verifier.challenge());
        assert!(!params.contains_key("client_secret"));
    }

    #[test]
    fn authorization_url_includes_redirect_and_scopes() {
        let mut cfg = config("http://localhost/token");
        cfg.redirect_url = Some("https://app.example.com/callback".to_string());
        cfg.scopes = vec!["openid".to_string(), "email".to_string()];
        let provider = Provider::new("myidp", cfg, reqwest::Client::new()).expect("provider");

        let params = query(&provider.authorization_url(
            &StateId::generate(),
            &CodeVerifier::generate(),
        ));
        assert_eq!(params["redirect_uri"], "https://app.example.com/callback");
        assert_eq!(params["scope"], "openid email");
    }

    #[test]
    fn invalid_endpoint_is_a_configuration_error() {
        let mut cfg = config("http://localhost/token");
        cfg.authorization_endpoint = "not a url".to_string();
        let err = Provider::new("myidp", cfg, reqwest::Client::new()).expect_err("invalid");
        assert!(matches!(err, ProviderError::Configuration { .. }));
    }

    #[test]
    fn registry_lookup() {
        let registry = ProviderRegistry::new(
            [("myidp".to_string(), config("http://localhost/token"))],
            reqwest::Client::new(),
        )
        .expect("registry");

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("myidp").map(Provider::name), Some("myidp"));
        assert!(registry.lookup("other").is_none());
    }

    #[tokio::test]
    async fn exchange_code_posts_code_and_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code"))
            .and(body_string_contains("code_verifier=the-verifier"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"{"access_token":"xyz","token_type":"Bearer"}"#, "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&format!("{}/token", server.uri()));
        let verifier = CodeVerifier::new("the-verifier", ChallengeMethod::S256);
        let token = provider
            .exchange_code("auth-code", &verifier)
            .await
            .expect("exchange");

        assert_eq!(token.access_token(), "xyz");
        assert_eq!(token.authorization_value(), "Bearer xyz");
    }

    #[tokio::test]
    async fn exchange_code_rejection_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_raw(r#"{"error":"invalid_grant"}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let provider = provider(&format!("{}/token", server.uri()));
        let err = provider
            .exchange_code("bad-code", &CodeVerifier::generate())
            .await
            .expect_err("rejected");

        assert_eq!(
            err,
            ProviderError::Rejected {
                reason: "invalid_grant".to_string()
            }
        );
    }

    #[tokio::test]
    async fn unreachable_provider_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let uri = format!("http://{addr}/token");

        let err = provider(&uri)
            .exchange_code("auth-code", &CodeVerifier::generate())
            .await
            .expect_err("unreachable");
        assert!(matches!(err, ProviderError::Transport { .. }));
    }

    #[tokio::test]
    async fn refresh_posts_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r1"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"access_token":"fresh","token_type":"bearer","expires_in":3600}"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let token = provider(&format!("{}/token", server.uri()))
            .refresh("r1")
            .await
            .expect("refresh");

        assert_eq!(token.access_token(), "fresh");
        assert!(!token.is_expired());
        assert!(token.refresh_token().is_none());
    }
}
