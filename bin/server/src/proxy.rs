//! Forwarding of API requests to upstream services.
//!
//! Requests are forwarded to the upstream base URL followed by the original
//! path and query. Bodies are buffered in both directions. Cookies are not
//! forwarded in either direction.

use crate::error::ApiError;
use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::response::Response;
use tracing::{debug, instrument, warn};

/// Largest request body forwarded upstream.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Headers that only concern a single connection.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// An upstream API.
#[derive(Debug, Clone)]
pub struct Upstream {
    base: reqwest::Url,
}

impl Upstream {
    /// Parses the upstream base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` is not an absolute URL.
    pub fn parse(base: &str) -> Result<Self, config::ConfigError> {
        let base = reqwest::Url::parse(base).map_err(|e| {
            config::ConfigError::Message(format!("invalid upstream URL '{base}': {e}"))
        })?;
        Ok(Self { base })
    }

    /// Returns the upstream URL for a request path and query.
    #[must_use]
    pub fn target(&self, path_and_query: &str) -> String {
        format!(
            "{}{}",
            self.base.as_str().trim_end_matches('/'),
            path_and_query
        )
    }
}

/// Removes connection-scoped headers, including those named by the
/// `Connection` header.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Forwards `request` to `upstream` and relays the response.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn forward(
    http: &reqwest::Client,
    upstream: &Upstream,
    request: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    let target = upstream.target(path_and_query);

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::COOKIE);
    headers.remove(header::CONTENT_LENGTH);

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::InvalidBody {
            reason: e.to_string(),
        })?;

    let response = http
        .request(parts.method, &target)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| {
            warn!(error = %e, "upstream request failed");
            ApiError::Upstream {
                reason: e.to_string(),
            }
        })?;

    let status = response.status();
    let mut headers = response.headers().clone();
    strip_hop_by_hop(&mut headers);
    // Upstream cookies would be set on the token handler's origin.
    headers.remove(header::SET_COOKIE);
    let body = response.bytes().await.map_err(|e| ApiError::Upstream {
        reason: e.to_string(),
    })?;
    debug!(status = status.as_u16(), "upstream responded");

    let mut relayed = Response::new(Body::from(body));
    *relayed.status_mut() = status;
    *relayed.headers_mut() = headers;
    Ok(relayed)
}
