//! token-handler web server.
//!
//! A backend-for-frontend that runs the OAuth 2.0 authorization code flow
//! on behalf of a single page app, keeps the resulting tokens server-side and
//! attaches them to API requests it proxies upstream.

pub mod app;
pub mod cleanup;
pub mod config;
pub mod discovery;
pub mod error;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod state;
