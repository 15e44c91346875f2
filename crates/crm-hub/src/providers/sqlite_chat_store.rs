//! Conversation lookup, message persistence, sender profiles, and
//! notifications backed by `crm-store`.

use async_trait::async_trait;
use crm_core::chat::{ChatMessage, Conversation, ConversationSummary, SenderProfile};
use crm_core::ids::{ConversationId, NotificationId, UserId};
use crm_server::RealtimeError;
use crm_server::im::{ConversationDirectory, MessageStore, ProfileDirectory};
use crm_server::notify::{NotificationDraft, NotificationRecord, NotificationStore};
use crm_store::{ConnectionPool, ConversationRepo, MessageRepo, NotificationRepo, UserRepo};

use super::with_conn;

/// One pool, four seams.
pub struct SqliteChatStore {
    pool: ConnectionPool,
}

impl SqliteChatStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationDirectory for SqliteChatStore {
    async fn find(&self, id: &ConversationId) -> Result<Option<Conversation>, RealtimeError> {
        let id = id.clone();
        with_conn(&self.pool, move |conn| ConversationRepo::find(conn, &id)).await
    }
}

#[async_trait]
impl MessageStore for SqliteChatStore {
    async fn append(
        &self,
        message: &ChatMessage,
        summary: &ConversationSummary,
    ) -> Result<(), RealtimeError> {
        let message = message.clone();
        let summary = summary.clone();
        with_conn(&self.pool, move |conn| MessageRepo::append(conn, &message, &summary)).await
    }
}

#[async_trait]
impl ProfileDirectory for SqliteChatStore {
    /// Disabled accounts still resolve; admission is not an authorization check.
    async fn profile(&self, user_id: &UserId) -> Result<Option<SenderProfile>, RealtimeError> {
        let user_id = user_id.clone();
        let row = with_conn(&self.pool, move |conn| UserRepo::get_by_id(conn, &user_id)).await?;
        Ok(row.map(|u| u.profile()))
    }
}

#[async_trait]
impl NotificationStore for SqliteChatStore {
    async fn insert(
        &self,
        user_id: &UserId,
        draft: &NotificationDraft,
    ) -> Result<NotificationRecord, RealtimeError> {
        let user_id = user_id.clone();
        let draft = draft.clone();
        let row = with_conn(&self.pool, move |conn| {
            NotificationRepo::insert(conn, &user_id, &draft.title, &draft.content, &draft.kind)
        })
        .await?;
        Ok(NotificationRecord {
            id: NotificationId::from_string(row.id),
            title: row.title,
            content: row.content,
            kind: row.kind,
            created_at: row.created_at,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
