//! `SQLite` connection pool with WAL mode and foreign keys enabled.
//!
//! Uses `r2d2` connection pooling with the `r2d2_sqlite` backend.
//! The [`PragmaCustomizer`] runs on each new connection to ensure
//! WAL mode, foreign keys, and the busy timeout are set.

use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::info;

use crate::errors::Result;
use crate::sqlite::migrations::run_migrations;

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Configuration for the connection pool.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Maximum pool size (default: 8).
    pub pool_size: u32,
    /// Busy timeout in milliseconds (default: 5000).
    pub busy_timeout_ms: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

/// `SQLite` pragma customizer that runs on each new connection.
#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))?;
        Ok(())
    }
}

fn build(
    manager: SqliteConnectionManager,
    pool_size: u32,
    busy_timeout_ms: u32,
) -> Result<ConnectionPool> {
    let pool = Pool::builder()
        .max_size(pool_size)
        .connection_timeout(Duration::from_secs(5))
        .connection_customizer(Box::new(PragmaCustomizer { busy_timeout_ms }))
        .build(manager)?;
    Ok(pool)
}

/// Create an in-memory pool (for tests and ephemeral runs).
///
/// Every `SQLite` in-memory connection is its own database, so the pool is
/// capped at a single connection regardless of `config.pool_size`.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    let pool = build(SqliteConnectionManager::memory(), 1, config.busy_timeout_ms)?;
    let conn = pool.get()?;
    let _ = run_migrations(&conn)?;
    drop(conn);
    Ok(pool)
}

/// Create a file-backed connection pool without running migrations.
pub fn new_file(path: &Path, config: &ConnectionConfig) -> Result<ConnectionPool> {
    build(
        SqliteConnectionManager::file(path),
        config.pool_size,
        config.busy_timeout_ms,
    )
}

/// Open a file-backed pool and bring its schema up to date.
pub fn open(path: &Path, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let pool = new_file(path, config)?;
    let conn = pool.get()?;
    let applied = run_migrations(&conn)?;
    drop(conn);
    info!(path = %path.display(), applied, "database ready");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::{current_version, latest_version};

    #[test]
    fn in_memory_pool_is_migrated() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        assert_eq!(current_version(&conn).unwrap(), latest_version());
        let fk: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn in_memory_pool_shares_one_database() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            let _ = conn
                .execute(
                    "INSERT INTO notifications (id, user_id, title, content, kind, is_read, created_at)
                     VALUES ('n1', 'u1', 't', 'c', 'info', 0, '2025-01-01T00:00:00Z')",
                    [],
                )
                .unwrap();
        }
        let conn = pool.get().unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn file_pool_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crm.db");
        let pool = open(&path, &ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn reopening_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crm.db");
        drop(open(&path, &ConnectionConfig::default()).unwrap());
        let pool = open(&path, &ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }
}
