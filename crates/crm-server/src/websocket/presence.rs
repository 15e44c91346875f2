//! Presence announcements.

use std::sync::Arc;

use crm_core::ids::UserId;
use tracing::debug;

use super::protocol::{OutboundEvent, PresenceStatus};
use super::registry::{BroadcastReport, ConnectionRegistry};

/// Broadcasts `status.change` to every live session.
pub struct PresenceBroadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl PresenceBroadcaster {
    /// Create a broadcaster over the registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Announce that `user_id` came online. The user itself is skipped.
    pub async fn online(&self, user_id: &UserId) -> BroadcastReport {
        let event = OutboundEvent::status_change(user_id, PresenceStatus::Online);
        let report = self.registry.broadcast_all(&event, Some(user_id)).await;
        debug!(user_id = %user_id, delivered = report.delivered, "announced online");
        report
    }

    /// Announce that `user_id` went offline.
    pub async fn offline(&self, user_id: &UserId) -> BroadcastReport {
        let event = OutboundEvent::status_change(user_id, PresenceStatus::Offline);
        let report = self.registry.broadcast_all(&event, None).await;
        debug!(user_id = %user_id, delivered = report.delivered, "announced offline");
        report
    }
}
