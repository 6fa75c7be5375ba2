//! Request-scoped session store backed by encrypted cookies.

use crate::backend::SessionBackend;
use crate::error::StoreError;
use crate::options::SessionOptions;
use crate::store::SessionStore;
use async_trait::async_trait;
use axum_extra::extract::PrivateCookieJar;
use serde_json::Value;
use std::sync::Arc;
use token_handler_core::{RecordId, Result};
use tracing::warn;

/// Session store for one HTTP exchange.
///
/// The cookie named after the session holds the record id, encrypted by the
/// jar's key. Record contents are kept in the shared [`SessionBackend`].
/// After the handler is done, [`into_jar`](Self::into_jar) yields the jar so
/// its cookie changes can be sent with the response.
pub struct CookieSessionStore {
    backend: Arc<dyn SessionBackend>,
    jar: PrivateCookieJar,
}

impl CookieSessionStore {
    /// Creates a store over the cookies of the current request.
    #[must_use]
    pub fn new(backend: Arc<dyn SessionBackend>, jar: PrivateCookieJar) -> Self {
        Self { backend, jar }
    }

    /// Returns the jar, including all cookie changes made by this store.
    #[must_use]
    pub fn into_jar(self) -> PrivateCookieJar {
        self.jar
    }

    /// Returns the record id referenced by the cookie `name`.
    ///
    /// A cookie that decrypts but does not hold a valid record id is treated
    /// as absent.
    fn record_id(&self, name: &str) -> Option<RecordId> {
        let cookie = self.jar.get(name)?;
        match cookie.value().parse() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(cookie = name, error = %e, "ignoring session cookie with invalid record id");
                None
            }
        }
    }
}

#[async_trait]
impl SessionStore for CookieSessionStore {
    async fn get(&self, name: &str) -> Result<Option<Value>, StoreError> {
        match self.record_id(name) {
            Some(id) => self.backend.load(&id).await,
            None => Ok(None),
        }
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

        let id = self.record_id(name).unwrap_or_default();
        self.backend.store(&id, value, options.max_age()).await?;
        self.jar = self.jar.clone().add(options.cookie(name, id.to_string()));
        Ok(())
    }

    async fn invalidate(
        &mut self,
        name: &str,
        options: &SessionOptions,
    ) -> Result<(), StoreError> {
        if let Some(id) = self.record_id(name) {
            self.backend.remove(&id).await?;
        }
        self.jar = self.jar.clone().remove(options.removal_cookie(name));
        Ok(())
    }

    async fn take(
        &mut self,
        name: &str,
        options: &SessionOptions,
    ) -> Result<Option<Value>, StoreError> {
        let value = match self.record_id(name) {
            Some(id) => self.backend.take(&id).await?,
            None => None,
        };
        self.jar = self.jar.clone().remove(options.removal_cookie(name));
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use axum_extra::extract::cookie::Key;
    use serde_json::json;

    fn test_key() -> Key {
        Key::from(&[7u8; 64][..])
    }

    fn store(backend: &MemoryBackend) -> CookieSessionStore {
        CookieSessionStore::new(Arc::new(backend.clone()), PrivateCookieJar::new(test_key()))
    }

    #[tokio::test]
    async fn save_sets_encrypted_cookie_and_record() {
        let backend = MemoryBackend::new();
        let mut store = store(&backend);
        let options = SessionOptions::new("/", time::Duration::days(30));

        store
            .save("token", json!({"idp": "myidp"}), &options)
            .await
            .expect("save");

        assert_eq!(
            store.get("token").await.expect("get"),
            Some(json!({"idp": "myidp"}))
        );
        assert_eq!(backend.len().await, 1);

        let jar = store.into_jar();
        let cookie = jar.get("token").expect("cookie");
        assert!(cookie.value().starts_with("rec_"));
        assert!(!cookie.value().contains("myidp"));
    }

    #[tokio::test]
    async fn save_twice_reuses_record() {
        let backend = MemoryBackend::new();
        let mut store = store(&backend);
        let options = SessionOptions::new("/", time::Duration::days(30));

        store.save("token", json!(1), &options).await.expect("save");
        store.save("token", json!(2), &options).await.expect("save");

        assert_eq!(backend.len().await, 1);
        assert_eq!(store.get("token").await.expect("get"), Some(json!(2)));
    }

    #[tokio::test]
    async fn invalidate_removes_record_and_cookie() {
        let backend = MemoryBackend::new();
        let mut store = store(&backend);
        let options = SessionOptions::new("/auths", time::Duration::seconds(300));

        store.save("state", json!({}), &options).await.expect("save");
        store
            .save("state", json!({}), &SessionOptions::expired("/auths"))
            .await
            .expect("invalidate");

        assert!(backend.is_empty().await);
        assert_eq!(store.get("state").await.expect("get"), None);
    }

    #[tokio::test]
    async fn take_hands_value_to_one_of_two_requests() {
        let backend = MemoryBackend::new();
        let mut first = store(&backend);
        let options = SessionOptions::new("/auths", time::Duration::seconds(300));
        first.save("state", json!("pending"), &options).await.expect("save");

        let jar = first.into_jar();
        let shared: Arc<dyn SessionBackend> = Arc::new(backend.clone());
        let mut a = CookieSessionStore::new(shared.clone(), jar.clone());
        let mut b = CookieSessionStore::new(shared, jar);
        let expired = SessionOptions::expired("/auths");

        let (x, y) = tokio::join!(a.take("state", &expired), b.take("state", &expired));
        let taken: Vec<_> = [x.expect("take"), y.expect("take")]
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(taken, vec![json!("pending")]);
        assert!(backend.is_empty().await);
        assert!(a.into_jar().get("state").is_none());
    }

    #[tokio::test]
    async fn missing_cookie_reads_as_absent() {
        let backend = MemoryBackend::new();
        let store = store(&backend);
        assert_eq!(store.get("token").await.expect("get"), None);
    }
}
