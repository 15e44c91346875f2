//! WebSocket sessions: connection handles, the user registry, admission,
//! presence, heartbeat, frame dispatch, and the per-connection task.

pub mod admission;
pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod session;
