//! # crm-store
//!
//! `SQLite` persistence for the CRM realtime hub.
//!
//! - **Connection pool**: `r2d2` + `r2d2_sqlite` with WAL, foreign keys, and
//!   busy-timeout pragmas on every connection
//! - **Migrations**: embedded SQL, version-tracked in `schema_version`
//! - **Repositories**: stateless structs for users, conversations, messages,
//!   and notifications; every method takes `&Connection`
//!
//! The crate is synchronous. Async callers hop onto a blocking thread before
//! checking out a connection.

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;

pub use errors::{Result, StoreError};
pub use sqlite::connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory, open,
};
pub use sqlite::repositories::{
    conversation::{ConversationRepo, DirectConversation, direct_pair_key},
    message::{MessageRepo, SenderCount},
    notification::NotificationRepo,
    user::{NewUser, UserRepo},
};
pub use sqlite::row_types::{NotificationRow, UserRow};
