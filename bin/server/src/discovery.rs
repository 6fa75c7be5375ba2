//! OpenID Connect discovery of provider endpoints.

use crate::config::ProviderSettings;
use openidconnect::IssuerUrl;
use openidconnect::core::CoreProviderMetadata;
use std::collections::HashMap;
use std::fmt;
use token_handler_auth::ProviderConfig;
use tracing::{info, instrument};

/// Errors resolving a provider at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The configured issuer is not a valid URL.
    InvalidIssuer { idp: String, reason: String },
    /// The discovery document could not be fetched or parsed.
    Discovery { idp: String, reason: String },
    /// The provider does not advertise a token endpoint.
    MissingTokenEndpoint { idp: String },
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIssuer { idp, reason } => {
                write!(f, "invalid issuer URL for provider '{idp}': {reason}")
            }
            Self::Discovery { idp, reason } => {
                write!(f, "failed to discover provider '{idp}': {reason}")
            }
            Self::MissingTokenEndpoint { idp } => {
                write!(f, "provider '{idp}' does not advertise a token endpoint")
            }
        }
    }
}

impl std::error::Error for DiscoveryError {}

/// Resolves the endpoints of one provider from its discovery document.
#[instrument(skip(settings, redirect_url, http), fields(issuer = %settings.issuer))]
pub async fn discover(
    idp: &str,
    settings: &ProviderSettings,
    redirect_url: Option<&str>,
    http: &reqwest::Client,
) -> Result<ProviderConfig, DiscoveryError> {
    let issuer_url =
        IssuerUrl::new(settings.issuer.clone()).map_err(|e| DiscoveryError::InvalidIssuer {
            idp: idp.to_string(),
            reason: e.to_string(),
        })?;

    let metadata = CoreProviderMetadata::discover_async(issuer_url, http)
        .await
        .map_err(|e| DiscoveryError::Discovery {
            idp: idp.to_string(),
            reason: e.to_string(),
        })?;

    let token_endpoint = metadata
        .token_endpoint()
        .ok_or_else(|| DiscoveryError::MissingTokenEndpoint {
            idp: idp.to_string(),
        })?
        .url()
        .to_string();

    info!("discovered provider");
    Ok(ProviderConfig {
        authorization_endpoint: metadata.authorization_endpoint().url().to_string(),
        token_endpoint,
        client_id: settings.client_id.clone(),
        client_secret: settings.client_secret.clone().filter(|s| !s.is_empty()),
        redirect_url: redirect_url.map(str::to_string),
        scopes: settings.scopes.clone(),
    })
}

/// Resolves every configured provider. The first failure aborts.
pub async fn discover_all(
    providers: &HashMap<String, ProviderSettings>,
    redirect_url: Option<&str>,
    http: &reqwest::Client,
) -> Result<Vec<(String, ProviderConfig)>, DiscoveryError> {
    let mut resolved = Vec::with_capacity(providers.len());
    for (idp, settings) in providers {
        let config = discover(idp, settings, redirect_url, http).await?;
        resolved.push((idp.clone(), config));
    }
    Ok(resolved)
}
