//! The session store abstraction consumed by the authentication flow.

use crate::error::StoreError;
use crate::options::SessionOptions;
use async_trait::async_trait;
use serde_json::Value;
use token_handler_core::Result;

/// A store of named sessions for a single client.
///
/// Implementations are request-scoped: the cookie store reads the client's
/// cookies and collects the cookies to send back. Each call is atomic from
/// the caller's point of view.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the value saved under `name`, or `None` if there is none or
    /// it has expired.
    async fn get(&self, name: &str) -> Result<Option<Value>, StoreError>;

    /// Saves `value` under `name`.
    ///
    /// Saving with a non-positive max age invalidates the session instead.
    async fn save(
        &mut self,
        name: &str,
        value: Value,
        options: &SessionOptions,
    ) -> Result<(), StoreError>;

    /// Removes the session saved under `name`, if any.
    async fn invalidate(
        &mut self,
        name: &str,
        options: &SessionOptions,
    ) -> Result<(), StoreError>;

    /// Removes the session saved under `name` and returns its value.
    ///
    /// Stores sharing a backend hand a value to at most one of any number
    /// of concurrent takes.
    async fn take(
        &mut self,
        name: &str,
        options: &SessionOptions,
    ) -> Result<Option<Value>, StoreError>;
}
