//! Server-side persistence of session records.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use token_handler_core::{RecordId, Result};

/// A persisted session value with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    value: Value,
    expires_at: DateTime<Utc>,
}

impl StoredRecord {
    /// Creates a record that lives for `ttl` from now.
    ///
    /// A `ttl` past the representable range saturates to the latest
    /// representable instant.
    #[must_use]
    pub fn new(value: Value, ttl: time::Duration) -> Self {
        let expires_at = chrono::Duration::try_seconds(ttl.whole_seconds())
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(if ttl.is_negative() {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            });
        Self { value, expires_at }
    }

    /// Returns the stored value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consumes the record, returning the stored value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Returns when the record expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the record has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Storage for session records shared by all requests.
///
/// Backends must be safe to use concurrently. Expired records read as
/// absent.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Loads the record with the given id.
    async fn load(&self, id: &RecordId) -> Result<Option<Value>, StoreError>;

    /// Stores `value` under `id` for `ttl`, replacing any previous record.
    async fn store(
        &self,
        id: &RecordId,
        value: Value,
        ttl: time::Duration,
    ) -> Result<(), StoreError>;

    /// Removes the record with the given id. Removing a missing record is not
    /// an error.
    async fn remove(&self, id: &RecordId) -> Result<(), StoreError>;

    /// Removes the record with the given id and returns its value.
    ///
    /// Of any number of concurrent calls for one id, at most one observes
    /// the value. Expired records are removed and read as absent.
    async fn take(&self, id: &RecordId) -> Result<Option<Value>, StoreError>;

    /// Removes every expired record, returning how many were removed.
    async fn delete_expired(&self) -> Result<usize, StoreError>;
}
