//! Instant messaging: storage seams and the message pipeline.
//!
//! The hub never talks to a database directly. Conversation lookups, message
//! writes, and sender profiles go through these traits so the pipeline can be
//! driven by SQLite in production and by in-memory fakes in tests.

pub mod pipeline;

use async_trait::async_trait;
use crm_core::chat::{ChatMessage, Conversation, ConversationSummary, SenderProfile};
use crm_core::ids::{ConversationId, UserId};

use crate::errors::RealtimeError;

/// Read-only conversation lookup.
#[async_trait]
pub trait ConversationDirectory: Send + Sync {
    /// Fetch a live conversation. `Ok(None)` when absent or deleted.
    async fn find(&self, id: &ConversationId) -> Result<Option<Conversation>, RealtimeError>;
}

/// Durable message storage.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist `message` and apply `summary` to its conversation atomically.
    async fn append(
        &self,
        message: &ChatMessage,
        summary: &ConversationSummary,
    ) -> Result<(), RealtimeError>;
}

/// Sender metadata lookup, consulted once per admitted session.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Profile for `user_id`, or `Ok(None)` for an unknown user.
    async fn profile(&self, user_id: &UserId) -> Result<Option<SenderProfile>, RealtimeError>;
}
