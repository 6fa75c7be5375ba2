//! Filesystem session persistence.
//!
//! Each record is stored as one JSON file named after its record id inside
//! the configured directory. Writes go through a temporary file and a rename
//! so a concurrent reader never observes a partial record.

use crate::backend::{SessionBackend, StoredRecord};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use token_handler_core::{RecordId, Result};
use tracing::{debug, instrument, warn};

/// Session backend storing records as files in a directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Opens a backend rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::Backend {
                details: format!("failed to create {}: {e}", root.display()),
            })?;
        Ok(Self { root })
    }

    /// Returns the directory records are stored in.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: &RecordId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    /// Returns a path no other write or claim uses, for staging `id`.
    fn scratch_path(&self, id: &RecordId, extension: &str) -> PathBuf {
        self.root.join(format!("{id}.{}.{extension}", RecordId::new()))
    }

    async fn read_record(path: &Path) -> Result<Option<StoredRecord>, StoreError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Backend {
                    details: format!("failed to read {}: {e}", path.display()),
                }
                .into());
            }
        };

        let record = serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
            details: e.to_string(),
        })?;
        Ok(Some(record))
    }

    async fn remove_path(path: &Path) -> Result<(), StoreError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Backend {
                details: format!("failed to remove {}: {e}", path.display()),
            }
            .into()),
        }
    }
}

#[async_trait]
impl SessionBackend for FileBackend {
    #[instrument(skip(self), fields(record = %id))]
    async fn load(&self, id: &RecordId) -> Result<Option<Value>, StoreError> {
        let Some(record) = Self::read_record(&self.record_path(id)).await? else {
            return Ok(None);
        };

        if record.is_expired() {
            debug!("removing expired session record");
            self.remove(id).await?;
            return Ok(None);
        }

        Ok(Some(record.into_value()))
    }

    #[instrument(skip(self, value), fields(record = %id))]
    async fn store(
        &self,
        id: &RecordId,
        value: Value,
        ttl: time::Duration,
    ) -> Result<(), StoreError> {
        let record = StoredRecord::new(value, ttl);
        let bytes = serde_json::to_vec(&record).map_err(|e| StoreError::Serialization {
            details: e.to_string(),
        })?;

        let path = self.record_path(id);
        let tmp = self.scratch_path(id, "tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::Backend {
                details: format!("failed to write {}: {e}", tmp.display()),
            })?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Backend {
                details: format!("failed to move record into {}: {e}", path.display()),
            }
            .into());
        }
        Ok(())
    }

    #[instrument(skip(self), fields(record = %id))]
    async fn remove(&self, id: &RecordId) -> Result<(), StoreError> {
        Self::remove_path(&self.record_path(id)).await
    }

    /// Claims the record by renaming it to a private name. Only one rename
    /// of the record file can succeed.
    #[instrument(skip(self), fields(record = %id))]
    async fn take(&self, id: &RecordId) -> Result<Option<Value>, StoreError> {
        let path = self.record_path(id);
        let claim = self.scratch_path(id, "claim");
        match tokio::fs::rename(&path, &claim).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Backend {
                    details: format!("failed to claim {}: {e}", path.display()),
                }
                .into());
            }
        }

        let record = Self::read_record(&claim).await;
        Self::remove_path(&claim).await?;
        Ok(record?
            .filter(|record| !record.is_expired())
            .map(StoredRecord::into_value))
    }

    #[instrument(skip(self))]
    async fn delete_expired(&self) -> Result<usize, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::Backend {
                details: format!("failed to list {}: {e}", self.root.display()),
            })?;

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::Backend {
            details: format!("failed to list {}: {e}", self.root.display()),
        })? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(Some(record)) if record.is_expired() => {
                    Self::remove_path(&path).await?;
                    removed += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable session record");
                }
            }
        }
        Ok(removed)
    }
}
