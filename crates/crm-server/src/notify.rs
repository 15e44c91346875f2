//! Persisted notifications with a live push to online users.

use std::sync::Arc;

use async_trait::async_trait;
use crm_core::ids::{NotificationId, UserId};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::errors::RealtimeError;
use crate::websocket::protocol::{OutboundEvent, event_types};
use crate::websocket::registry::{ConnectionRegistry, DeliveryOutcome};

/// A notification to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationDraft {
    /// Short title.
    pub title: String,
    /// Body text.
    pub content: String,
    /// Category, e.g. `system` or `approval`.
    pub kind: String,
}

/// A stored notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    /// Notification ID.
    pub id: NotificationId,
    /// Short title.
    pub title: String,
    /// Body text.
    pub content: String,
    /// Category.
    #[serde(rename = "type")]
    pub kind: String,
    /// RFC 3339 creation time.
    pub created_at: String,
}

/// Durable notification storage.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a notification for `user_id`.
    async fn insert(
        &self,
        user_id: &UserId,
        draft: &NotificationDraft,
    ) -> Result<NotificationRecord, RealtimeError>;
}

/// Result of [`NotificationEmitter::notify`].
#[derive(Clone, Debug)]
pub struct Notified {
    /// What was stored.
    pub record: NotificationRecord,
    /// Whether the live push reached the user.
    pub delivery: DeliveryOutcome,
}

/// Stores a notification, then pushes `sys.notification` if the user is online.
pub struct NotificationEmitter {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn NotificationStore>,
}

impl NotificationEmitter {
    /// Create an emitter.
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn NotificationStore>) -> Self {
        Self { registry, store }
    }

    /// Persist and push. Offline users find the record on their next fetch.
    pub async fn notify(
        &self,
        user_id: &UserId,
        draft: NotificationDraft,
    ) -> Result<Notified, RealtimeError> {
        let record = self.store.insert(user_id, &draft).await?;
        let event = OutboundEvent::new(
            event_types::SYS_NOTIFICATION,
            json!({
                "id": record.id,
                "title": record.title,
                "content": record.content,
                "type": record.kind,
                "read": false,
                "createdAt": record.created_at,
            }),
        );
        let delivery = self.registry.send_to(user_id, &event).await;
        debug!(user_id = %user_id, notification_id = %record.id, ?delivery, "notification emitted");
        Ok(Notified { record, delivery })
    }
}
