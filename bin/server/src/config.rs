//! Centralized server configuration.
//!
//! Configuration is loaded via the `config` crate from an optional file and
//! environment variables, the latter taking precedence. Nested keys use `__`
//! as separator in the environment, e.g. `PROVIDERS__MYIDP__ISSUER`.

use axum_extra::extract::cookie::Key;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use token_handler_auth::FlowSettings;

/// Environment variable naming the configuration file.
pub const CONFIG_FILE_ENV: &str = "TOKEN_HANDLER_CONFIG";

/// Longest accepted pending or session lifetime: ten years.
pub const MAX_TTL_SECONDS: i64 = 315_360_000;

/// Server configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Base64 secret used to authenticate cookies.
    pub hash_key: String,

    /// Base64 secret used to encrypt cookies.
    pub block_key: String,

    /// Origins allowed to call the token handler with credentials.
    #[serde(default = "default_origins")]
    pub origins: Vec<String>,

    /// OAuth 2.0 redirect URL, shared by all providers.
    #[serde(default)]
    pub redirect_url: Option<String>,

    /// Directory for session records. Empty keeps sessions in memory.
    #[serde(default)]
    pub session_path: String,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,

    /// Lifetime of a pending authentication, in seconds.
    #[serde(default = "default_pending_ttl_seconds")]
    pub pending_ttl_seconds: i64,

    /// Lifetime of an authenticated session, in seconds.
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: i64,

    /// Interval between sweeps of expired session records, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Timeout for calls to identity providers, in seconds.
    #[serde(default = "default_provider_timeout_seconds")]
    pub provider_timeout_seconds: u64,

    /// Identity providers by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,

    /// Upstream base URLs by path prefix.
    #[serde(default)]
    pub upstreams: HashMap<String, String>,
}

/// Configuration of one identity provider.
///
/// Values may reference environment variables as `${VAR}`.
#[derive(Clone, Deserialize)]
pub struct ProviderSettings {
    /// OpenID Connect issuer URL used for discovery.
    pub issuer: String,
    /// OAuth 2.0 client id.
    pub client_id: String,
    /// OAuth 2.0 client secret.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Scopes to request.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[redacted]"))
            .field("scopes", &self.scopes)
            .finish()
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_secure_cookies() -> bool {
    true
}

fn default_pending_ttl_seconds() -> i64 {
    300
}

fn default_session_ttl_seconds() -> i64 {
    2_592_000
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_provider_timeout_seconds() -> u64 {
    30
}

impl ServerConfig {
    /// Loads configuration from the file named by [`CONFIG_FILE_ENV`] (or an
    /// optional `config.*` in the working directory) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let file = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) => config::File::with_name(&path).required(true),
            Err(_) => config::File::with_name("config").required(false),
        };

        Self::load(
            config::Config::builder().add_source(file).add_source(
                config::Environment::default()
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("origins")
                    .try_parsing(true),
            ),
        )
    }

    /// Builds configuration from the given sources and expands environment
    /// references in provider settings.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn load(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        let mut config: Self = builder.build()?.try_deserialize()?;
        check_ttl("pending_ttl_seconds", config.pending_ttl_seconds)?;
        check_ttl("session_ttl_seconds", config.session_ttl_seconds)?;
        if config.cleanup_interval_seconds == 0 {
            return Err(config::ConfigError::Message(
                "cleanup_interval_seconds must be positive".to_string(),
            ));
        }
        for settings in config.providers.values_mut() {
            settings.expand_env(|name| std::env::var(name).ok());
        }
        Ok(config)
    }

    /// Derives the cookie key from the hash and block keys.
    ///
    /// # Errors
    ///
    /// Returns an error if either key is not valid base64 or they are too
    /// short together.
    pub fn cookie_key(&self) -> Result<Key, config::ConfigError> {
        let mut material = decode_key("hash_key", &self.hash_key)?;
        material.extend(decode_key("block_key", &self.block_key)?);
        Key::try_from(material.as_slice()).map_err(|e| {
            config::ConfigError::Message(format!(
                "hash_key and block_key must decode to at least 64 bytes together: {e}"
            ))
        })
    }

    /// Returns the flow settings.
    #[must_use]
    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            pending_ttl: time::Duration::seconds(self.pending_ttl_seconds),
            session_ttl: time::Duration::seconds(self.session_ttl_seconds),
            secure_cookies: self.secure_cookies,
            ..FlowSettings::default()
        }
    }

    /// Returns the interval between sweeps of expired session records.
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }

    /// Returns the timeout for identity provider calls.
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_seconds)
    }

    /// Returns upstreams keyed by their absolute route prefix.
    #[must_use]
    pub fn upstream_routes(&self) -> Vec<(String, String)> {
        let mut routes: Vec<_> = self
            .upstreams
            .iter()
            .map(|(prefix, url)| {
                let prefix = prefix.trim_matches('/');
                (format!("/{prefix}"), url.clone())
            })
            .collect();
        routes.sort();
        routes
    }
}

impl ProviderSettings {
    /// Replaces `${VAR}` references using `lookup`. Unknown variables expand
    /// to nothing.
    pub fn expand_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.issuer = expand(&self.issuer, &lookup);
        self.client_id = expand(&self.client_id, &lookup);
        if let Some(secret) = &self.client_secret {
            self.client_secret = Some(expand(secret, &lookup));
        }
    }
}

fn check_ttl(name: &str, seconds: i64) -> Result<(), config::ConfigError> {
    if (1..=MAX_TTL_SECONDS).contains(&seconds) {
        Ok(())
    } else {
        Err(config::ConfigError::Message(format!(
            "{name} must be between 1 and {MAX_TTL_SECONDS}, got {seconds}"
        )))
    }
}

fn decode_key(name: &str, value: &str) -> Result<Vec<u8>, config::ConfigError> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| config::ConfigError::Message(format!("{name} is not valid base64: {e}")))
}

fn expand(value: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                out.push_str(&lookup(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
