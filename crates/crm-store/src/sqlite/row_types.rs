//! Database row types for mapping between `SQLite` rows and Rust structs.
//!
//! These represent the raw row shape. Conversion to the domain types in
//! `crm-core` happens here so repositories can stay thin.

use crm_core::chat::{
    ChatMessage, ContentKind, Conversation, ConversationKind, DeliveryStatus, Participants, Scene,
    SenderProfile,
};
use crm_core::ids::UserId;
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// Raw row from the `users` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    /// User ID (credential `sub`).
    pub id: String,
    /// Login name.
    pub username: String,
    /// Display name.
    pub name: String,
    /// Employee number.
    pub employee_no: String,
    /// Department name.
    pub department: String,
    /// Avatar URL.
    pub avatar: String,
    /// Whether the account is enabled.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

impl UserRow {
    /// Display metadata copied onto messages this user sends.
    pub fn profile(&self) -> SenderProfile {
        SenderProfile {
            name: self.name.clone(),
            ext: self.employee_no.clone(),
            dept: self.department.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// Raw row from the `im_conversations` table.
#[derive(Clone, Debug)]
pub struct ConversationRow {
    pub(crate) id: String,
    pub(crate) kind: String,
    pub(crate) name: String,
    pub(crate) created_by: String,
    pub(crate) peer_user_id: Option<String>,
    pub(crate) member_ids: String,
    pub(crate) last_message: Option<String>,
    pub(crate) last_time: Option<String>,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = StoreError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        let invalid = |message: String| StoreError::InvalidRow {
            table: "im_conversations",
            message,
        };
        let kind: ConversationKind = row
            .kind
            .parse()
            .map_err(|e| invalid(format!("{}: {e}", row.id)))?;
        let participants = match kind {
            ConversationKind::Direct => {
                let peer = row
                    .peer_user_id
                    .ok_or_else(|| invalid(format!("{}: direct conversation without peer", row.id)))?;
                Participants::Direct {
                    creator: UserId::from(row.created_by),
                    peer: UserId::from(peer),
                }
            }
            ConversationKind::Group => {
                let members: Vec<UserId> = serde_json::from_str(&row.member_ids)
                    .map_err(|e| invalid(format!("{}: member_ids: {e}", row.id)))?;
                Participants::Group { members }
            }
        };
        Ok(Conversation {
            id: row.id.into(),
            name: row.name,
            participants,
            last_message: row.last_message,
            last_time: row.last_time,
        })
    }
}

/// Raw row from the `im_messages` table.
#[derive(Clone, Debug)]
pub struct MessageRow {
    pub(crate) id: String,
    pub(crate) conversation_id: String,
    pub(crate) sender_id: String,
    pub(crate) sender_name: String,
    pub(crate) sender_ext: String,
    pub(crate) sender_dept: String,
    pub(crate) sender_avatar: String,
    pub(crate) content: String,
    pub(crate) content_kind: String,
    pub(crate) file_name: Option<String>,
    pub(crate) file_size: Option<String>,
    pub(crate) scene: String,
    pub(crate) status: String,
    pub(crate) display_time: String,
    pub(crate) created_at: String,
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let invalid = |e: crm_core::chat::UnknownVariant| StoreError::InvalidRow {
            table: "im_messages",
            message: format!("{}: {e}", row.id),
        };
        let content_kind: ContentKind = row.content_kind.parse().map_err(invalid)?;
        let scene: Scene = row.scene.parse().map_err(invalid)?;
        let status: DeliveryStatus = row.status.parse().map_err(invalid)?;
        Ok(ChatMessage {
            id: row.id.into(),
            conversation_id: row.conversation_id.into(),
            sender_id: row.sender_id.into(),
            sender: SenderProfile {
                name: row.sender_name,
                ext: row.sender_ext,
                dept: row.sender_dept,
                avatar: row.sender_avatar,
            },
            content: row.content,
            content_kind,
            file_name: row.file_name,
            file_size: row.file_size,
            scene,
            status,
            display_time: row.display_time,
            created_at: row.created_at,
        })
    }
}

/// Raw row from the `notifications` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRow {
    /// Notification ID.
    pub id: String,
    /// Recipient.
    pub user_id: String,
    /// Title line.
    pub title: String,
    /// Body text.
    pub content: String,
    /// Category (`info`, `warning`, `order`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Whether the user has seen it.
    pub is_read: bool,
    /// Creation timestamp.
    pub created_at: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
