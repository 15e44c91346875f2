//! Repository implementations for `SQLite` database operations.
//!
//! Each repository is a stateless struct whose methods take a `&Connection`
//! parameter, so every operation is a function of (connection, input) and can
//! be tested against an in-memory database.

pub mod conversation;
pub mod message;
pub mod notification;
pub mod user;
