//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use crm_core::chat::{ChatMessage, Conversation, ConversationSummary, Participants, SenderProfile};
use crm_core::ids::{ConversationId, NotificationId, UserId};
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::auth::IdentityResolver;
use crate::context::RealtimeDeps;
use crate::dashboard::{DashboardBoard, SnapshotSource};
use crate::errors::RealtimeError;
use crate::im::{ConversationDirectory, MessageStore, ProfileDirectory};
use crate::notify::{NotificationDraft, NotificationRecord, NotificationStore};

pub(crate) fn direct(id: &str, creator: &str, peer: &str) -> Conversation {
    Conversation {
        id: id.into(),
        name: "dm".into(),
        participants: Participants::Direct {
            creator: creator.into(),
            peer: peer.into(),
        },
        last_message: None,
        last_time: None,
    }
}

pub(crate) fn group(id: &str, members: &[&str]) -> Conversation {
    Conversation {
        id: id.into(),
        name: "team".into(),
        participants: Participants::Group {
            members: members.iter().map(|m| UserId::from(*m)).collect(),
        },
        last_message: None,
        last_time: None,
    }
}

#[derive(Default)]
pub(crate) struct TestDeps {
    conversations: HashMap<ConversationId, Conversation>,
    fail_store: bool,
    vanished: bool,
}

impl TestDeps {
    pub(crate) fn with_conversation(mut self, conversation: Conversation) -> Self {
        let _ = self.conversations.insert(conversation.id.clone(), conversation);
        self
    }

    pub(crate) fn failing_store(mut self) -> Self {
        self.fail_store = true;
        self
    }

    /// Conversations resolve, but every write reports them deleted.
    pub(crate) fn vanishing_store(mut self) -> Self {
        self.vanished = true;
        self
    }

    pub(crate) fn build(self) -> RealtimeDeps {
        self.build_with_store().0
    }

    /// Like [`build`](Self::build), also returning the store for inspection.
    pub(crate) fn build_with_store(self) -> (RealtimeDeps, Arc<MemoryStore>) {
        let memory = Arc::new(MemoryStore {
            conversations: self.conversations,
            fail_store: self.fail_store,
            vanished: self.vanished,
            messages: Mutex::new(Vec::new()),
        });
        let deps = RealtimeDeps {
            identity: Arc::new(TokenIsUser),
            directory: memory.clone(),
            messages: memory.clone(),
            profiles: memory.clone(),
            snapshots: memory.clone(),
            notifications: memory.clone(),
        };
        (deps, memory)
    }
}

/// Treats the token itself as the user ID; `""` is rejected.
struct TokenIsUser;

impl IdentityResolver for TokenIsUser {
    fn resolve(&self, token: &str) -> Result<UserId, RealtimeError> {
        if token.is_empty() {
            return Err(RealtimeError::Authentication("missing token".into()));
        }
        Ok(UserId::from(token))
    }
}

pub(crate) struct MemoryStore {
    conversations: HashMap<ConversationId, Conversation>,
    fail_store: bool,
    vanished: bool,
    messages: Mutex<Vec<(ChatMessage, ConversationSummary)>>,
}

impl MemoryStore {
    /// Messages written so far, with the summary each one carried.
    pub(crate) fn appended(&self) -> Vec<(ChatMessage, ConversationSummary)> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl ConversationDirectory for MemoryStore {
    async fn find(&self, id: &ConversationId) -> Result<Option<Conversation>, RealtimeError> {
        Ok(self.conversations.get(id).cloned())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(
        &self,
        message: &ChatMessage,
        summary: &ConversationSummary,
    ) -> Result<(), RealtimeError> {
        if self.fail_store {
            return Err(RealtimeError::Persistence("store offline".into()));
        }
        if self.vanished {
            return Err(RealtimeError::ConversationNotFound(
                message.conversation_id.clone(),
            ));
        }
        self.messages.lock().push((message.clone(), summary.clone()));
        Ok(())
    }
}

#[async_trait]
impl ProfileDirectory for MemoryStore {
    async fn profile(&self, user_id: &UserId) -> Result<Option<SenderProfile>, RealtimeError> {
        Ok(Some(SenderProfile {
            name: user_id.to_uppercase(),
            ..SenderProfile::default()
        }))
    }
}

#[async_trait]
impl SnapshotSource for MemoryStore {
    async fn snapshot(&self, board: DashboardBoard) -> Result<Value, RealtimeError> {
        Ok(json!({ "board": board.update_type() }))
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(
        &self,
        _user_id: &UserId,
        draft: &NotificationDraft,
    ) -> Result<NotificationRecord, RealtimeError> {
        Ok(NotificationRecord {
            id: NotificationId::new(),
            title: draft.title.clone(),
            content: draft.content.clone(),
            kind: draft.kind.clone(),
            created_at: "2026-01-01T00:00:00Z".into(),
        })
    }
}
