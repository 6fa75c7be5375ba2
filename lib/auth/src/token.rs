//! Provider-issued tokens as held in an authenticated session.

use chrono::{DateTime, Duration, Utc};
use oauth2::TokenResponse;
use oauth2::basic::{BasicTokenResponse, BasicTokenType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tokens are treated as expired this long before their actual expiry, so a
/// token never runs out while a proxied request is in flight.
fn expiry_leeway() -> Duration {
    Duration::seconds(10)
}

/// An access token with its optional refresh token and expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderToken {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl ProviderToken {
    /// Creates a token without refresh token or expiry.
    #[must_use]
    pub fn new(access_token: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: token_type.into(),
            expires_at: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the absolute expiry.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Converts a token endpoint response.
    #[must_use]
    pub fn from_response(response: &BasicTokenResponse) -> Self {
        let token_type = match response.token_type() {
            BasicTokenType::Bearer => "Bearer".to_string(),
            BasicTokenType::Mac => "MAC".to_string(),
            BasicTokenType::Extension(other) => other.clone(),
        };
        let expires_at = response
            .expires_in()
            .and_then(|d| Duration::from_std(d).ok())
            .map(|d| Utc::now() + d);

        Self {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            token_type,
            expires_at,
        }
    }

    /// Returns the access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the refresh token, if present.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Returns the token type as issued by the provider.
    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Returns the expiry, if the provider reported one.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns true if the token has expired or is about to.
    ///
    /// Tokens without an expiry never expire.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at - expiry_leeway() <= Utc::now())
    }

    /// Returns the value for the `Authorization` header.
    ///
    /// The scheme is canonicalized the way providers commonly spell token
    /// types in lowercase; an empty type means bearer.
    #[must_use]
    pub fn authorization_value(&self) -> String {
        let scheme = match self.token_type.to_ascii_lowercase().as_str() {
            "" | "bearer" => "Bearer",
            "mac" => "MAC",
            "basic" => "Basic",
            _ => self.token_type.as_str(),
        };
        format!("{scheme} {}", self.access_token)
    }

    /// Keeps `previous`'s refresh token when a refresh response omitted one.
    #[must_use]
    pub fn inherit_refresh_token(mut self, previous: &ProviderToken) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.refresh_token.clone();
        }
        self
    }
}

impl fmt::Debug for ProviderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderToken")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_without_expiry_never_expires() {
        let token = ProviderToken::new("xyz", "Bearer");
        assert!(!token.is_expired());
    }

    #[test]
    fn token_expiring_within_leeway_is_expired() {
        let token =
            ProviderToken::new("xyz", "Bearer").with_expires_at(Utc::now() + Duration::seconds(5));
        assert!(token.is_expired());
    }

    #[test]
    fn token_with_future_expiry_is_live() {
        let token =
            ProviderToken::new("xyz", "Bearer").with_expires_at(Utc::now() + Duration::hours(1));
        assert!(!token.is_expired());
    }

    #[test]
    fn authorization_value_canonicalizes_bearer() {
        assert_eq!(
            ProviderToken::new("xyz", "bearer").authorization_value(),
            "Bearer xyz"
        );
        assert_eq!(
            ProviderToken::new("xyz", "").authorization_value(),
            "Bearer xyz"
        );
        assert_eq!(
            ProviderToken::new("xyz", "Bearer").authorization_value(),
            "Bearer xyz"
        );
    }

    #[test]
    fn refreshed_token_inherits_refresh_token() {
        let previous = ProviderToken::new("old", "Bearer").with_refresh_token("r1");
        let refreshed = ProviderToken::new("new", "Bearer").inherit_refresh_token(&previous);
        assert_eq!(refreshed.refresh_token(), Some("r1"));

        let rotated = ProviderToken::new("new", "Bearer")
            .with_refresh_token("r2")
            .inherit_refresh_token(&previous);
        assert_eq!(rotated.refresh_token(), Some("r2"));
    }

    #[test]
    fn from_response_reads_standard_fields() {
        let response: BasicTokenResponse = serde_json::from_str(
            r#"{"access_token":"xyz","token_type":"Bearer","refresh_token":"r","expires_in":3600}"#,
        )
        .expect("parse");

        let token = ProviderToken::from_response(&response);
        assert_eq!(token.access_token(), "xyz");
        assert_eq!(token.refresh_token(), Some("r"));
        assert_eq!(token.token_type(), "Bearer");
        assert!(token.expires_at().is_some_and(|at| at > Utc::now()));
    }

    #[test]
    fn debug_redacts_secrets() {
        let token = ProviderToken::new("access-secret", "Bearer").with_refresh_token("refresh-secret");
        let debug = format!("{token:?}");
        assert!(!debug.contains("access-secret"));
        assert!(!debug.contains("refresh-secret"));
    }
}
