//! # crm-server
//!
//! Realtime hub for the CRM backend: an Axum WebSocket endpoint with one live
//! session per user.
//!
//! - **Connection registry**: user → connection binding, targeted sends, and
//!   fan-out with post-pass cleanup of dead peers
//! - **Session admission**: kick-on-reconnect, so a new login supersedes the
//!   previous one before it is registered
//! - **Heartbeat**: `ping` → `pong`, plus an optional idle watchdog
//! - **Message pipeline**: validate, persist, summarise, forward, acknowledge
//! - **Presence**: `status.change` on connect and disconnect
//! - **Dashboard**: periodic `screen.*.update` broadcasts and on-demand snapshots
//! - **Notifications**: persisted `sys.notification` pushes
//! - **Operational**: `/health`, `/metrics`, graceful shutdown

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod errors;
pub mod health;
pub mod im;
pub mod metrics;
pub mod notify;
pub mod server;
pub mod shutdown;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ServerConfig;
pub use context::{RealtimeContext, RealtimeDeps};
pub use errors::RealtimeError;
pub use server::CrmServer;
