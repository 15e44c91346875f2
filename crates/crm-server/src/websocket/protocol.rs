//! Wire protocol: one JSON object per WebSocket text frame.
//!
//! Inbound frames are `{"type": ..., "data": {...}}`. Outbound frames use the
//! envelope `{"type", "data", "timestamp" (epoch ms), "eventId"?}`.

use std::sync::Arc;

use crm_core::chat::ContentKind;
use crm_core::ids::{ConversationId, MessageId, UserId};
use crm_core::text::unix_millis;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::dashboard::DashboardBoard;

/// Event type tags used on the wire.
pub mod event_types {
    /// Client liveness probe.
    pub const PING: &str = "ping";
    /// Liveness probe answer.
    pub const PONG: &str = "pong";
    /// Session terminated by the server.
    pub const SYS_KICK: &str = "sys.kick";
    /// Persisted notification push.
    pub const SYS_NOTIFICATION: &str = "sys.notification";
    /// Chat message (inbound submit, outbound forward).
    pub const IM_MESSAGE: &str = "im.message";
    /// Sender acknowledgement.
    pub const IM_ACK: &str = "im.ack";
    /// Sender-only rejection.
    pub const IM_ERROR: &str = "im.error";
    /// Presence transition.
    pub const STATUS_CHANGE: &str = "status.change";
}

/// Kick reason sent to a session superseded by a newer login.
pub const KICK_LOGGED_IN_ELSEWHERE: &str = "logged_in_elsewhere";

/// Default reason for an administrative kick.
pub const KICK_ACCOUNT_DISABLED: &str = "account_disabled";

/// Message shown to a sender whose target conversation does not exist.
pub const CONVERSATION_NOT_FOUND_MESSAGE: &str = "conversation not found";

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// Body of an inbound `im.message` frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImMessagePayload {
    /// Target conversation; empty when the client omitted it.
    pub conversation_id: String,
    /// Text or URL.
    pub content: String,
    /// Kind of `content`.
    #[serde(rename = "contentType")]
    pub content_kind: ContentKind,
    /// Original file name.
    pub file_name: Option<String>,
    /// Human-readable file size.
    pub file_size: Option<String>,
}

/// A parsed inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    /// `ping`
    Ping,
    /// `im.message`
    ImMessage(ImMessagePayload),
    /// `screen.v1.init`, `screen.v2.init`, `screen.ranking.init`
    DashboardInit(DashboardBoard),
    /// Any other type; ignored by the session loop.
    Unknown(String),
}

/// Why an inbound frame could not be parsed.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Not a JSON object with a string `type`.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    /// Known type with an unusable `data` body.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// The frame type.
        kind: String,
        /// Deserialization failure.
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl InboundFrame {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let raw: RawFrame = serde_json::from_str(text).map_err(FrameError::Malformed)?;
        match raw.kind.as_str() {
            event_types::PING => Ok(Self::Ping),
            event_types::IM_MESSAGE => {
                let data = if raw.data.is_null() { json!({}) } else { raw.data };
                serde_json::from_value(data)
                    .map(Self::ImMessage)
                    .map_err(|source| FrameError::InvalidPayload {
                        kind: raw.kind,
                        source,
                    })
            }
            other => Ok(DashboardBoard::from_init_type(other)
                .map_or_else(|| Self::Unknown(raw.kind.clone()), Self::DashboardInit)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Presence state carried by `status.change`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// Session admitted.
    Online,
    /// Session ended.
    Offline,
}

/// Outbound event envelope. Constructed fresh per send, never persisted.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEvent {
    /// Event type tag.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Payload; opaque to the registry.
    pub data: Value,
    /// Creation time, epoch milliseconds.
    pub timestamp: i64,
    /// Optional correlation ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl OutboundEvent {
    /// Build an event stamped with the current time.
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: unix_millis(),
            event_id: None,
        }
    }

    /// Attach a correlation ID.
    #[must_use]
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Serialize once for fan-out.
    pub fn to_frame(&self) -> Result<Arc<String>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::new)
    }

    /// `pong`
    pub fn pong() -> Self {
        Self::new(event_types::PONG, json!({}))
    }

    /// `sys.kick {reason}`
    pub fn kick(reason: &str) -> Self {
        Self::new(event_types::SYS_KICK, json!({ "reason": reason }))
    }

    /// `status.change {userId, status}`
    pub fn status_change(user_id: &UserId, status: PresenceStatus) -> Self {
        Self::new(
            event_types::STATUS_CHANGE,
            json!({ "userId": user_id, "status": status }),
        )
    }

    /// `im.ack {messageId, conversationId, status, time}`
    pub fn im_ack(
        message_id: &MessageId,
        conversation_id: &ConversationId,
        status: &str,
        time: &str,
    ) -> Self {
        Self::new(
            event_types::IM_ACK,
            json!({
                "messageId": message_id,
                "conversationId": conversation_id,
                "status": status,
                "time": time,
            }),
        )
    }

    /// `im.error {message, conversationId}`
    pub fn im_error(message: &str, conversation_id: &str) -> Self {
        Self::new(
            event_types::IM_ERROR,
            json!({ "message": message, "conversationId": conversation_id }),
        )
    }
}
