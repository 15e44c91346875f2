//! Error taxonomy for the realtime hub.

use crm_core::ids::{ConversationId, UserId};
use thiserror::Error;

/// Errors raised by the realtime subsystem.
///
/// Each variant maps to a fixed recovery policy:
///
/// | Variant | Policy |
/// |---------|--------|
/// | `Authentication` | handshake closed with 1008, no session |
/// | `Conflict` | invariant violation; the session is closed with 1011 |
/// | `Validation` | frame dropped silently |
/// | `ConversationNotFound` | `im.error` to the sender |
/// | `Delivery` | connection unregistered, never surfaced to a sender |
/// | `Persistence` | fatal to the submitting session |
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Missing, malformed, or expired credential.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A second binding was attempted without evicting the first.
    #[error("user {user_id} already has a live session")]
    Conflict {
        /// The user whose binding already exists.
        user_id: UserId,
    },

    /// Inbound message is missing required fields.
    #[error("invalid message: {0}")]
    Validation(String),

    /// The target conversation does not exist.
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    /// Writing to a peer's connection failed.
    #[error("delivery to {user_id} failed")]
    Delivery {
        /// The unreachable recipient.
        user_id: UserId,
    },

    /// The storage backend failed.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl RealtimeError {
    /// Short label for metrics and structured logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication",
            Self::Conflict { .. } => "conflict",
            Self::Validation(_) => "validation",
            Self::ConversationNotFound(_) => "conversation_not_found",
            Self::Delivery { .. } => "delivery",
            Self::Persistence(_) => "persistence",
        }
    }

    /// Whether the error must end the session that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Persistence(_))
    }
}
