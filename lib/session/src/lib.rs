//! Session storage for token-handler.
//!
//! Sessions are addressed by a cookie name. The cookie itself only carries
//! an opaque record id, encrypted and authenticated by a
//! [`PrivateCookieJar`](axum_extra::extract::PrivateCookieJar); the record
//! contents live server-side in a [`SessionBackend`].
//!
//! This crate provides:
//! - The [`SessionStore`] trait consumed by the authentication flow
//! - [`CookieSessionStore`], the request-scoped store used by the server
//! - [`MemoryBackend`] and [`FileBackend`] for record persistence
//! - [`InMemorySessionStore`], a cookie-less store for tests and tooling
//!
//! Saving with a non-positive max age invalidates the session immediately.

pub mod backend;
pub mod cookie;
pub mod error;
pub mod file;
pub mod memory;
pub mod options;
pub mod store;

pub use backend::{SessionBackend, StoredRecord};
pub use cookie::CookieSessionStore;
pub use error::StoreError;
pub use file::FileBackend;
pub use memory::{InMemorySessionStore, MemoryBackend};
pub use options::SessionOptions;
pub use store::SessionStore;
