//! Periodic removal of expired session records.
//!
//! Pending authentications that are never completed are not read again, so
//! nothing but a sweep removes them.

use std::sync::Arc;
use std::time::Duration;
use token_handler_session::SessionBackend;
use tokio::task::JoinHandle;

/// Removes expired records from `backend` once, logging the outcome.
///
/// Returns the number of records removed; a failed sweep counts as zero.
pub async fn sweep(backend: &dyn SessionBackend) -> usize {
    match backend.delete_expired().await {
        Ok(count) if count > 0 => {
            tracing::debug!(deleted_records = count, "Periodic session cleanup");
            count
        }
        Ok(_) => 0,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to cleanup expired sessions");
            0
        }
    }
}

/// Spawns a task sweeping `backend` every `interval`, starting immediately.
pub fn spawn(backend: Arc<dyn SessionBackend>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        loop {
            interval.tick().await;
            sweep(backend.as_ref()).await;
        }
    })
}
