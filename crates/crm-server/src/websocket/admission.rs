//! Kick-on-reconnect admission and session release.
//!
//! Admissions, kicks and teardown releases are serialized through one gate,
//! together with the presence announcement each one makes. Peers therefore
//! see `status.change` events in the same order the bindings changed.

use std::sync::Arc;

use crm_core::ids::{ConnectionId, UserId};
use metrics::counter;
use tokio::sync::Mutex;
use tracing::info;

use super::connection::ClientConnection;
use super::presence::PresenceBroadcaster;
use super::protocol::{KICK_ACCOUNT_DISABLED, KICK_LOGGED_IN_ELSEWHERE, OutboundEvent};
use super::registry::ConnectionRegistry;
use crate::metrics::WS_SESSIONS_SUPERSEDED_TOTAL;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Result of an admission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Admission {
    /// Connection that was kicked to make room, if any.
    pub superseded: Option<ConnectionId>,
}

/// Result of releasing a session at teardown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Release {
    /// The session still held its user's binding.
    pub was_bound: bool,
    /// No other session holds the binding, so `offline` was announced.
    pub announced_offline: bool,
}

/// Admits new sessions, evicting any existing session for the same user.
pub struct SessionAdmission {
    registry: Arc<ConnectionRegistry>,
    presence: PresenceBroadcaster,
    gate: Mutex<()>,
}

impl SessionAdmission {
    /// Create an admission gate over the registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            presence: PresenceBroadcaster::new(registry.clone()),
            registry,
            gate: Mutex::new(()),
        }
    }

    /// Bind `connection` as its user's only live session and announce it
    /// `online`.
    ///
    /// The old binding is swapped out atomically, then the old session is
    /// sent `sys.kick` and closed with 1000. Its teardown finds the user
    /// still bound and stays silent.
    pub async fn admit(&self, connection: Arc<ClientConnection>) -> Admission {
        let _guard = self.gate.lock().await;
        let user_id = connection.user_id.clone();
        let new_conn = connection.id.clone();

        let superseded = self.registry.replace(connection).await.map(|old| {
            let _ = old.send_event(&OutboundEvent::kick(KICK_LOGGED_IN_ELSEWHERE));
            let _ = old.close(CLOSE_NORMAL, KICK_LOGGED_IN_ELSEWHERE);
            counter!(WS_SESSIONS_SUPERSEDED_TOTAL).increment(1);
            info!(
                user_id = %user_id,
                old_conn = %old.id,
                new_conn = %new_conn,
                "session superseded by new login"
            );
            old.id.clone()
        });

        let _ = self.presence.online(&user_id).await;
        Admission { superseded }
    }

    /// Drop a closing session's binding.
    ///
    /// Announces `offline` only when no other session holds the user.
    pub async fn release(&self, connection: &ClientConnection) -> Release {
        let _guard = self.gate.lock().await;
        let user_id = &connection.user_id;
        let was_bound = self
            .registry
            .unregister_connection(user_id, &connection.id)
            .await;
        let announced_offline = !self.registry.is_online(user_id).await;
        if announced_offline {
            let _ = self.presence.offline(user_id).await;
        }
        Release {
            was_bound,
            announced_offline,
        }
    }

    /// Kick a user's live session, if any.
    ///
    /// Returns whether a session was kicked. The offline announcement is left
    /// to the kicked session's release.
    pub async fn kick(&self, user_id: &UserId, reason: &str) -> bool {
        let _guard = self.gate.lock().await;
        let Some(conn) = self.registry.get(user_id).await else {
            return false;
        };
        let _ = self.registry.unregister_connection(user_id, &conn.id).await;
        let _ = conn.send_event(&OutboundEvent::kick(reason));
        let _ = conn.close(CLOSE_NORMAL, reason);
        info!(user_id = %user_id, reason, "session kicked");
        true
    }

    /// Kick a user whose account was disabled.
    pub async fn kick_disabled(&self, user_id: &UserId) -> bool {
        self.kick(user_id, KICK_ACCOUNT_DISABLED).await
    }
}
