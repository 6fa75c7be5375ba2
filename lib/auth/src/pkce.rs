//! Proof Key for Code Exchange (RFC 7636).
//!
//! A [`CodeVerifier`] is generated when an authorization request starts. Its
//! challenge goes to the authorization endpoint; the verifier itself is kept
//! server-side and sent with the token exchange.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub const PARAM_CODE_VERIFIER: &str = "code_verifier";
pub const PARAM_CODE_CHALLENGE: &str = "code_challenge";
pub const PARAM_CODE_CHALLENGE_METHOD: &str = "code_challenge_method";

/// Number of random bytes in a generated verifier.
const VERIFIER_BYTES: usize = 32;

/// How the challenge is derived from the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeMethod {
    /// The challenge is the verifier itself.
    #[serde(rename = "plain")]
    Plain,
    /// The challenge is base64url(SHA-256(verifier)) without padding.
    #[serde(rename = "S256")]
    S256,
}

impl ChallengeMethod {
    /// Returns the value sent as `code_challenge_method`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }
}

impl fmt::Display for ChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A PKCE code verifier together with its challenge method.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeVerifier {
    verifier: String,
    method: ChallengeMethod,
}

impl CodeVerifier {
    /// Generates a verifier from 256 bits of randomness, hex-encoded, using
    /// the S256 method.
    ///
    /// Panics only if the operating system's entropy source fails.
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; VERIFIER_BYTES] = rand::rng().random();
        Self {
            verifier: hex::encode(bytes),
            method: ChallengeMethod::S256,
        }
    }

    /// Creates a verifier from an existing value.
    #[must_use]
    pub fn new(verifier: impl Into<String>, method: ChallengeMethod) -> Self {
        Self {
            verifier: verifier.into(),
            method,
        }
    }

    /// Returns the verifier value.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.verifier
    }

    /// Returns the challenge method.
    #[must_use]
    pub fn method(&self) -> ChallengeMethod {
        self.method
    }

    /// Derives the code challenge.
    #[must_use]
    pub fn challenge(&self) -> String {
        match self.method {
            ChallengeMethod::Plain => self.verifier.clone(),
            ChallengeMethod::S256 => URL_SAFE_NO_PAD.encode(Sha256::digest(self.verifier.as_bytes())),
        }
    }

    /// Parameters added to the authorization request.
    #[must_use]
    pub fn challenge_params(&self) -> [(&'static str, String); 2] {
        [
            (PARAM_CODE_CHALLENGE, self.challenge()),
            (PARAM_CODE_CHALLENGE_METHOD, self.method.as_str().to_string()),
        ]
    }

    /// Parameters added to the token exchange.
    #[must_use]
    pub fn verifier_params(&self) -> [(&'static str, String); 1] {
        [(PARAM_CODE_VERIFIER, self.verifier.clone())]
    }
}

impl fmt::Debug for CodeVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeVerifier")
            .field("verifier", &"[redacted]")
            .field("method", &self.method)
            .finish()
    }
}
