//! Per-message pipeline: validate, resolve, persist, forward, acknowledge.

use std::sync::Arc;

use chrono::Utc;
use crm_core::chat::{ChatMessage, Conversation, DeliveryStatus};
use crm_core::ids::{ConversationId, MessageId, UserId};
use crm_core::text::{conversation_summary, display_time};
use metrics::counter;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{ConversationDirectory, MessageStore};
use crate::errors::RealtimeError;
use crate::metrics::{IM_ERRORS_TOTAL, IM_MESSAGES_TOTAL};
use crate::websocket::connection::ClientConnection;
use crate::websocket::protocol::{
    CONVERSATION_NOT_FOUND_MESSAGE, ImMessagePayload, OutboundEvent, event_types,
};
use crate::websocket::registry::ConnectionRegistry;

/// Terminal outcome of a submission that was not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Persisted, forwarded, and acknowledged.
    Acknowledged {
        /// ID of the persisted message.
        message_id: MessageId,
        /// Users the message was forwarded to.
        recipients: Vec<UserId>,
        /// How many of them were reachable.
        delivered: usize,
    },
    /// The target conversation does not exist; `im.error` was sent.
    ConversationMissing,
}

/// Drives each inbound `im.message` to exactly one terminal outcome.
pub struct MessagePipeline {
    registry: Arc<ConnectionRegistry>,
    directory: Arc<dyn ConversationDirectory>,
    store: Arc<dyn MessageStore>,
    summary_max_chars: usize,
}

impl MessagePipeline {
    /// Create a pipeline over the given collaborators.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        directory: Arc<dyn ConversationDirectory>,
        store: Arc<dyn MessageStore>,
        summary_max_chars: usize,
    ) -> Self {
        Self {
            registry,
            directory,
            store,
            summary_max_chars,
        }
    }

    /// Submit a message on behalf of `sender`.
    ///
    /// `Err(Validation)` means the frame was dropped with no side effects.
    /// `Err(Persistence)` means nothing was forwarded or acknowledged.
    pub async fn submit(
        &self,
        sender: &ClientConnection,
        payload: ImMessagePayload,
    ) -> Result<SubmitOutcome, RealtimeError> {
        if payload.conversation_id.is_empty() {
            return Err(RealtimeError::Validation("missing conversationId".into()));
        }
        if payload.content.is_empty() {
            return Err(RealtimeError::Validation("empty content".into()));
        }

        let conversation_id = ConversationId::from(payload.conversation_id.as_str());
        let Some(conversation) = self.directory.find(&conversation_id).await? else {
            return Ok(reject_missing(sender, &conversation_id));
        };

        let message = self.build_message(sender, &conversation, payload);
        let summary = conversation_summary(
            conversation.kind(),
            &message.sender.name,
            &message.content,
            self.summary_max_chars,
            &message.display_time,
        );

        match self.store.append(&message, &summary).await {
            Ok(()) => {}
            // Deleted between lookup and write.
            Err(RealtimeError::ConversationNotFound(_)) => {
                return Ok(reject_missing(sender, &conversation_id));
            }
            Err(e) => {
                counter!(IM_ERRORS_TOTAL, "reason" => "persistence").increment(1);
                warn!(conversation_id = %conversation_id, error = %e, "failed to persist message");
                return Err(e);
            }
        }
        counter!(IM_MESSAGES_TOTAL, "scene" => message.scene.as_str()).increment(1);

        let recipients = conversation.recipients(&sender.user_id);
        let delivered = self.forward(&message, &recipients).await;

        let ack = OutboundEvent::im_ack(
            &message.id,
            &message.conversation_id,
            message.status.as_str(),
            &message.display_time,
        );
        let _ = sender.send_event(&ack);

        debug!(
            message_id = %message.id,
            conversation_id = %conversation_id,
            recipients = recipients.len(),
            delivered,
            "message acknowledged"
        );
        Ok(SubmitOutcome::Acknowledged {
            message_id: message.id,
            recipients,
            delivered,
        })
    }

    fn build_message(
        &self,
        sender: &ClientConnection,
        conversation: &Conversation,
        payload: ImMessagePayload,
    ) -> ChatMessage {
        let now = Utc::now();
        ChatMessage {
            id: MessageId::new(),
            conversation_id: conversation.id.clone(),
            sender_id: sender.user_id.clone(),
            sender: sender.profile().clone(),
            content: payload.content,
            content_kind: payload.content_kind,
            file_name: payload.file_name,
            file_size: payload.file_size,
            scene: conversation.scene(),
            status: DeliveryStatus::Sent,
            display_time: display_time(now),
            created_at: now.to_rfc3339(),
        }
    }

    /// Best-effort delivery; returns how many recipients queued the frame.
    async fn forward(&self, message: &ChatMessage, recipients: &[UserId]) -> usize {
        if recipients.is_empty() {
            return 0;
        }
        let event = OutboundEvent::new(event_types::IM_MESSAGE, forward_payload(message));
        let frame = match event.to_frame() {
            Ok(f) => f,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "failed to serialize forward");
                return 0;
            }
        };

        let mut delivered = 0;
        for recipient in recipients {
            let outcome = self.registry.send_raw(recipient, frame.clone()).await;
            if outcome.is_delivered() {
                delivered += 1;
            } else if let Some(err) = outcome.failure(recipient) {
                debug!(message_id = %message.id, error = %err, "forward not delivered");
            }
        }
        delivered
    }
}

fn reject_missing(sender: &ClientConnection, conversation_id: &ConversationId) -> SubmitOutcome {
    counter!(IM_ERRORS_TOTAL, "reason" => "conversation_not_found").increment(1);
    info!(sender = %sender.user_id, conversation_id = %conversation_id, "message to unknown conversation");
    let error = OutboundEvent::im_error(CONVERSATION_NOT_FOUND_MESSAGE, conversation_id);
    let _ = sender.send_event(&error);
    SubmitOutcome::ConversationMissing
}

/// Forwarded message as the recipient sees it.
fn forward_payload(message: &ChatMessage) -> Value {
    json!({
        "id": message.id,
        "conversationId": message.conversation_id,
        "senderId": message.sender_id,
        "senderName": message.sender.name,
        "senderExt": message.sender.ext,
        "senderDept": message.sender.dept,
        "senderAvatar": message.sender.avatar,
        "direction": "received",
        "type": message.content_kind,
        "content": message.content,
        "scene": message.scene,
        "time": message.display_time,
        "fileName": message.file_name,
        "fileSize": message.file_size,
    })
}
