//! HTTP error responses.
//!
//! Every failure is terminal for the request and answered with a minimal
//! JSON body `{"error": "..."}`. Server-side causes are logged, never sent.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;
use token_handler_auth::AuthError;

/// Errors returned by the token handler's HTTP surface.
#[derive(Debug)]
pub enum ApiError {
    /// The authentication flow failed.
    Auth(AuthError),
    /// The request body could not be read.
    InvalidBody { reason: String },
    /// The upstream API could not be reached.
    Upstream { reason: String },
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody {
            reason: rejection.body_text(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(err) => write!(f, "{err}"),
            Self::InvalidBody { reason } => write!(f, "invalid request body: {reason}"),
            Self::Upstream { reason } => write!(f, "upstream request failed: {reason}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Returns the status code and the message safe to show to clients.
    #[must_use]
    pub fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Auth(err) => match err {
                AuthError::UnknownProvider { .. } => {
                    (StatusCode::BAD_REQUEST, "unknown identity provider")
                }
                AuthError::ProviderMisconfigured { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "identity provider not configured",
                ),
                AuthError::InvalidReturnPath { .. } => {
                    (StatusCode::BAD_REQUEST, "invalid return path")
                }
                AuthError::InvalidState => (StatusCode::BAD_REQUEST, "invalid state"),
                AuthError::ExchangeFailed { cause, .. } if cause.is_rejection() => {
                    (StatusCode::BAD_REQUEST, "authorization code rejected")
                }
                AuthError::ExchangeFailed { .. } => {
                    (StatusCode::BAD_GATEWAY, "identity provider unavailable")
                }
                AuthError::Unauthenticated | AuthError::TokenRefreshFailed { .. } => {
                    (StatusCode::UNAUTHORIZED, "not authenticated")
                }
                AuthError::NotFound => (StatusCode::NOT_FOUND, "not found"),
                AuthError::StoreUnavailable { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
                }
            },
            Self::InvalidBody { .. } => (StatusCode::BAD_REQUEST, "invalid request body"),
            Self::Upstream { .. } => (StatusCode::BAD_GATEWAY, "upstream unavailable"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}
