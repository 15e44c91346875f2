//! SQLite-backed implementations of the server's storage traits.
//!
//! These live in the binary crate because they depend on `crm-store`, which
//! `crm-server` intentionally doesn't depend on (it only defines the traits).

pub mod activity_snapshot;
pub mod sqlite_chat_store;

pub use activity_snapshot::ActivitySnapshot;
pub use sqlite_chat_store::SqliteChatStore;

use crm_server::RealtimeError;
use crm_store::{ConnectionPool, PooledConnection, StoreError};

/// Run a repository call on a blocking thread with a pooled connection.
pub(crate) async fn with_conn<T, F>(pool: &ConnectionPool, f: F) -> Result<T, RealtimeError>
where
    F: FnOnce(&PooledConnection) -> crm_store::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> crm_store::Result<T> {
        let conn = pool.get()?;
        f(&conn)
    })
    .await
    .map_err(|e| RealtimeError::Persistence(format!("storage task failed: {e}")))?
    .map_err(into_realtime)
}

fn into_realtime(err: StoreError) -> RealtimeError {
    match err {
        StoreError::ConversationNotFound(id) => RealtimeError::ConversationNotFound(id.into()),
        other => RealtimeError::Persistence(other.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
