//! The `/auths` resource: start, complete, list and log out.
//!
//! Every handler answers with the request's cookie jar, so cookie changes
//! made by the flow reach the browser even when the request fails.

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::PrivateCookieJar;
use serde::{Deserialize, Serialize};
use token_handler_core::StateId;
use token_handler_session::CookieSessionStore;

/// Body of `POST /auths`.
#[derive(Debug, Deserialize)]
pub struct CreateAuth {
    pub idp: String,
    /// Where the app wants to return after login.
    #[serde(default)]
    pub path: String,
}

/// Body of `PUT /auths/{state}`.
#[derive(Debug, Deserialize)]
pub struct UpdateAuth {
    /// Informational; the provider recorded at start is authoritative.
    #[serde(default)]
    pub idp: String,
    pub code: String,
}

/// An authentication as seen by the app.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub idp: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
}

/// Body of `GET /auths`.
#[derive(Debug, Serialize)]
pub struct AuthList {
    pub count: usize,
    pub auths: Vec<String>,
    #[serde(rename = "@included", skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<AuthResource>,
}

fn respond<R: IntoResponse>(store: CookieSessionStore, result: Result<R, ApiError>) -> Response {
    (store.into_jar(), result).into_response()
}

/// `POST /auths`: starts an authentication.
pub async fn create_auth(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    payload: Result<Json<CreateAuth>, JsonRejection>,
) -> Response {
    let mut store = state.cookie_store(jar);
    let result = start(&state, &mut store, payload).await;
    respond(store, result)
}

async fn start(
    state: &AppState,
    store: &mut CookieSessionStore,
    payload: Result<Json<CreateAuth>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResource>), ApiError> {
    let Json(body) = payload?;
    let started = state.flow().start(store, &body.idp, &body.path).await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResource {
            idp: body.idp,
            path: body.path,
            authorization_url: Some(started.authorization_url),
            ..AuthResource::default()
        }),
    ))
}

/// `PUT /auths/{state}`: completes an authentication with the code from
/// the provider callback.
pub async fn update_auth(
    State(state): State<AppState>,
    Path(auth_state): Path<String>,
    jar: PrivateCookieJar,
    payload: Result<Json<UpdateAuth>, JsonRejection>,
) -> Response {
    let mut store = state.cookie_store(jar);
    let result = complete(&state, &mut store, StateId::from(auth_state), payload).await;
    respond(store, result)
}

async fn complete(
    state: &AppState,
    store: &mut CookieSessionStore,
    auth_state: StateId,
    payload: Result<Json<UpdateAuth>, JsonRejection>,
) -> Result<Json<AuthResource>, ApiError> {
    let Json(body) = payload?;
    let completed = state
        .flow()
        .complete(store, &auth_state, &body.code)
        .await?;
    if !body.idp.is_empty() && body.idp != completed.idp {
        tracing::debug!(requested = %body.idp, idp = %completed.idp, "ignoring idp in request body");
    }

    Ok(Json(AuthResource {
        idp: completed.idp,
        path: completed.return_path,
        ..AuthResource::default()
    }))
}

/// `GET /auths`: lists the client's session.
pub async fn list_auths(State(state): State<AppState>, jar: PrivateCookieJar) -> Response {
    let store = state.cookie_store(jar);
    let result = state
        .flow()
        .list(&store)
        .await
        .map(|listing| {
            Json(AuthList {
                count: listing.count(),
                auths: listing.ids().map(|id| id.as_str().to_string()).collect(),
                included: listing
                    .sessions
                    .into_iter()
                    .map(|session| AuthResource {
                        id: Some(session.id.as_str().to_string()),
                        idp: session.idp,
                        ..AuthResource::default()
                    })
                    .collect(),
            })
        })
        .map_err(ApiError::from);
    respond(store, result)
}

/// `DELETE /auths/{state}`: logs out.
pub async fn delete_auth(
    State(state): State<AppState>,
    Path(auth_state): Path<String>,
    jar: PrivateCookieJar,
) -> Response {
    let mut store = state.cookie_store(jar);
    let result = state
        .flow()
        .terminate(&mut store, &StateId::from(auth_state))
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(ApiError::from);
    respond(store, result)
}
