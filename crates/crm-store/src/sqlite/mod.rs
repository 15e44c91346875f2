//! `SQLite` backend.
//!
//! - **[`connection`]**: `r2d2` connection pool with WAL mode, foreign keys, and
//!   performance pragmas applied to every connection.
//! - **[`migrations`]**: Version-tracked schema evolution, embedded at compile
//!   time and run transactionally.
//! - **[`row_types`]**: Raw database row structs for `rusqlite` row mapping.
//! - **[`repositories`]**: Stateless repository structs.

pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod row_types;

pub use migrations::{current_version, latest_version, run_migrations};
