//! In-memory session persistence.

use crate::backend::{SessionBackend, StoredRecord};
use crate::error::StoreError;
use crate::options::SessionOptions;
use crate::store::SessionStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use token_handler_core::{RecordId, Result};
use tokio::sync::RwLock;

/// Session backend keeping records in process memory.
///
/// Records are lost on restart. Expired records are dropped when read or
/// swept by [`delete_expired`](SessionBackend::delete_expired).
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    records: Arc<RwLock<HashMap<RecordId, StoredRecord>>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns true if no records are held.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    async fn load(&self, id: &RecordId) -> Result<Option<Value>, StoreError> {
        {
            let records = self.records.read().await;
            match records.get(id) {
                None => return Ok(None),
                Some(record) if !record.is_expired() => return Ok(Some(record.value().clone())),
                Some(_) => {}
            }
        }

        let mut records = self.records.write().await;
        if records.get(id).is_some_and(StoredRecord::is_expired) {
            records.remove(id);
        }
        Ok(None)
    }

    async fn store(
        &self,
        id: &RecordId,
        value: Value,
        ttl: time::Duration,
    ) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(*id, StoredRecord::new(value, ttl));
        Ok(())
    }

    async fn remove(&self, id: &RecordId) -> Result<(), StoreError> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn take(&self, id: &RecordId) -> Result<Option<Value>, StoreError> {
        let record = self.records.write().await.remove(id);
        Ok(record
            .filter(|record| !record.is_expired())
            .map(StoredRecord::into_value))
    }

    async fn delete_expired(&self) -> Result<usize, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired());
        Ok(before - records.len())
    }
}

/// A cookie-less session store holding values by name.
///
/// Useful where there is no HTTP exchange to carry cookies, such as tests
/// of the authentication flow. The options of the last save are kept so
/// cookie attributes can be inspected.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: HashMap<String, (Value, SessionOptions)>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a session is saved under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    /// Returns the options the session under `name` was saved with.
    #[must_use]
    pub fn options(&self, name: &str) -> Option<&SessionOptions> {
        self.sessions.get(name).map(|(_, options)| options)
    }

    /// Inserts a raw value, bypassing serialization of typed records.
    pub fn insert_raw(&mut self, name: &str, value: Value, options: SessionOptions) {
        self.sessions.insert(name.to_string(), (value, options));
    }

    /// Returns the number of saved sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no sessions are saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, name: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.sessions.get(name).map(|(value, _)| value.clone()))
    }

    async fn save(
        &mut self,
        name: &str,
        value: Value,
        options: &SessionOptions,
    ) -> Result<(), StoreError> {
        if options.is_expiring() {
            return self.invalidate(name, options).await;
        }
        self.sessions
            .insert(name.to_string(), (value, options.clone()));
        Ok(())
    }

    async fn invalidate(
        &mut self,
        name: &str,
        _options: &SessionOptions,
    ) -> Result<(), StoreError> {
        self.sessions.remove(name);
        Ok(())
    }

    async fn take(
        &mut self,
        name: &str,
        _options: &SessionOptions,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self.sessions.remove(name).map(|(value, _)| value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn backend_store_and_load() {
        let backend = MemoryBackend::new();
        let id = RecordId::new();

        backend
            .store(&id, json!({"idp": "myidp"}), time::Duration::minutes(5))
            .await
            .expect("store");

        let loaded = backend.load(&id).await.expect("load");
        assert_eq!(loaded, Some(json!({"idp": "myidp"})));
    }

    #[tokio::test]
    async fn backend_drops_expired_records() {
        let backend = MemoryBackend::new();
        let id = RecordId::new();

        backend
            .store(&id, json!(1), time::Duration::seconds(-1))
            .await
            .expect("store");

        assert_eq!(backend.load(&id).await.expect("load"), None);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn backend_take_returns_value_once() {
        let backend = MemoryBackend::new();
        let id = RecordId::new();
        backend
            .store(&id, json!("pending"), time::Duration::minutes(5))
            .await
            .expect("store");

        let (first, second) = tokio::join!(backend.take(&id), backend.take(&id));
        let taken: Vec<_> = [first.expect("take"), second.expect("take")]
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(taken, vec![json!("pending")]);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn backend_take_expired_is_absent() {
        let backend = MemoryBackend::new();
        let id = RecordId::new();
        backend
            .store(&id, json!(1), time::Duration::seconds(-1))
            .await
            .expect("store");

        assert_eq!(backend.take(&id).await.expect("take"), None);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn backend_delete_expired_keeps_live_records() {
        let backend = MemoryBackend::new();
        let live = RecordId::new();
        backend
            .store(&live, json!("live"), time::Duration::minutes(5))
            .await
            .expect("store");
        for _ in 0..3 {
            backend
                .store(&RecordId::new(), json!("stale"), time::Duration::seconds(-1))
                .await
                .expect("store");
        }

        assert_eq!(backend.delete_expired().await.expect("sweep"), 3);
        assert_eq!(backend.len().await, 1);
        assert_eq!(backend.load(&live).await.expect("load"), Some(json!("live")));
        assert_eq!(backend.delete_expired().await.expect("sweep"), 0);
    }

    #[tokio::test]
    async fn backend_remove_missing_is_ok() {
        let backend = MemoryBackend::new();
        backend.remove(&RecordId::new()).await.expect("remove");
    }

    #[tokio::test]
    async fn store_save_with_expired_options_invalidates() {
        let mut store = InMemorySessionStore::new();
        let live = SessionOptions::new("/", time::Duration::days(1));

        store.save("token", json!("v"), &live).await.expect("save");
        assert!(store.contains("token"));

        store
            .save("token", json!("v"), &SessionOptions::expired("/"))
            .await
            .expect("save");
        assert!(!store.contains("token"));
        assert_eq!(store.get("token").await.expect("get"), None);
    }

    #[tokio::test]
    async fn store_take_removes() {
        let mut store = InMemorySessionStore::new();
        let options = SessionOptions::new("/auths", time::Duration::seconds(300));
        store.save("state", json!("v"), &options).await.expect("save");

        let expired = SessionOptions::expired("/auths");
        assert_eq!(store.take("state", &expired).await.expect("take"), Some(json!("v")));
        assert_eq!(store.take("state", &expired).await.expect("take"), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn store_keeps_options() {
        let mut store = InMemorySessionStore::new();
        let options = SessionOptions::new("/auths", time::Duration::seconds(300));

        store.save("state", json!({}), &options).await.expect("save");
        assert_eq!(store.options("state"), Some(&options));
    }
}
