//! Request middleware: token injection and preflight status.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::PrivateCookieJar;

/// Sets the `Authorization` header from the client's session before handing
/// the request on. Requests without a usable session are rejected.
///
/// Cookie changes (a refreshed session) are sent back with the response.
pub async fn inject_token(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let mut store = state.cookie_store(jar);
    let result = state
        .injector()
        .authorize(&mut store, request.headers_mut())
        .await;
    let jar = store.into_jar();

    match result {
        Ok(()) => (jar, next.run(request).await).into_response(),
        Err(err) => (jar, ApiError::from(err)).into_response(),
    }
}

/// Answers successful `OPTIONS` requests with `204 No Content`.
///
/// The CORS layer answers every `OPTIONS` request itself with `200`.
pub async fn preflight_no_content(request: Request, next: Next) -> Response {
    let is_options = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if is_options && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}
