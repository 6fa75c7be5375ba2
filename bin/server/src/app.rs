//! Router assembly.

use crate::middleware::{inject_token, preflight_no_content};
use crate::proxy::{self, Upstream};
use crate::routes::{create_auth, delete_auth, list_auths, update_auth};
use crate::state::AppState;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, header};
use axum::routing::{any, get, put};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Builds the router: the `/auths` resource plus one proxied route group per
/// upstream, each behind CORS for `origins`.
///
/// # Errors
///
/// Returns an error if an origin is not a valid header value or an upstream
/// URL is invalid.
pub fn router(
    state: AppState,
    origins: &[String],
    upstreams: &[(String, String)],
) -> Result<Router, config::ConfigError> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|e| {
                config::ConfigError::Message(format!("invalid origin '{origin}': {e}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let auth_cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins.clone()))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let mut app = Router::new()
        .route("/auths", get(list_auths).post(create_auth))
        .route("/auths/{state}", put(update_auth).delete(delete_auth))
        .layer(auth_cors);

    for (prefix, base) in upstreams {
        let upstream = Upstream::parse(base)?;
        info!(prefix = %prefix, upstream = %base, "mounting upstream");

        let handler = move |State(state): State<AppState>, request: Request| {
            let upstream = upstream.clone();
            async move { proxy::forward(state.http(), &upstream, request).await }
        };

        let wildcard = if prefix == "/" {
            "/{*rest}".to_string()
        } else {
            format!("{prefix}/{{*rest}}")
        };

        let upstream_cors = CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins.clone()))
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true);

        let routes = Router::new()
            .route(prefix, any(handler.clone()))
            .route(&wildcard, any(handler))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                inject_token,
            ))
            .layer(upstream_cors);
        app = app.merge(routes);
    }

    Ok(app
        .layer(axum::middleware::from_fn(preflight_no_content))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
