//! Chat domain model: conversations, messages, and sender metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, MessageId, UserId};

/// Whether a conversation is a two-party chat or a multi-party group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    /// Two participants: the creator and one peer.
    #[serde(alias = "single")]
    Direct,
    /// Explicit member list fixed at creation.
    Group,
}

impl ConversationKind {
    /// Storage / wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" | "single" => Ok(Self::Direct),
            "group" => Ok(Self::Group),
            other => Err(UnknownVariant(other.to_owned())),
        }
    }
}

/// Message scene, derived from the conversation kind at write time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scene {
    /// Message written into a direct conversation.
    Private,
    /// Message written into a group conversation.
    Group,
}

impl Scene {
    /// `group` → `group`, `direct` → `private`.
    pub fn for_kind(kind: ConversationKind) -> Self {
        match kind {
            ConversationKind::Direct => Self::Private,
            ConversationKind::Group => Self::Group,
        }
    }

    /// Storage / wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
        }
    }
}

impl FromStr for Scene {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "group" => Ok(Self::Group),
            other => Err(UnknownVariant(other.to_owned())),
        }
    }
}

/// What a message's `content` holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Plain text.
    #[default]
    Text,
    /// Image URL.
    Image,
    /// File URL, usually with a file name and size.
    File,
    /// Audio clip URL.
    Audio,
}

impl ContentKind {
    /// Storage / wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Audio => "audio",
        }
    }
}

impl FromStr for ContentKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            "audio" => Ok(Self::Audio),
            other => Err(UnknownVariant(other.to_owned())),
        }
    }
}

/// Delivery status recorded on a message row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Still in flight on the client.
    Sending,
    /// Persisted by the hub.
    #[default]
    Sent,
    /// Seen by the recipient.
    Read,
    /// Rejected or lost.
    Failed,
}

impl DeliveryStatus {
    /// Storage / wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "read" => Ok(Self::Read),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownVariant(other.to_owned())),
        }
    }
}

/// A stored string did not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);

/// Who may receive messages written into a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Participants {
    /// The creator and the peer of a direct conversation.
    Direct {
        /// User who opened the conversation.
        creator: UserId,
        /// The other party.
        peer: UserId,
    },
    /// Members of a group conversation.
    Group {
        /// Member IDs, fixed at creation.
        members: Vec<UserId>,
    },
}

/// A conversation as seen by the realtime core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Conversation ID.
    pub id: ConversationId,
    /// Display name.
    pub name: String,
    /// Participant set; also determines the kind.
    pub participants: Participants,
    /// Last-message summary text.
    pub last_message: Option<String>,
    /// Last-message display time.
    pub last_time: Option<String>,
}

impl Conversation {
    /// Direct or group.
    pub fn kind(&self) -> ConversationKind {
        match self.participants {
            Participants::Direct { .. } => ConversationKind::Direct,
            Participants::Group { .. } => ConversationKind::Group,
        }
    }

    /// Scene stamped on messages written into this conversation.
    pub fn scene(&self) -> Scene {
        Scene::for_kind(self.kind())
    }

    /// Users a message from `sender` is forwarded to.
    ///
    /// Direct: whichever stored participant is not the sender (empty for a
    /// self-chat). Group: every member except the sender, each at most once.
    pub fn recipients(&self, sender: &UserId) -> Vec<UserId> {
        match &self.participants {
            Participants::Direct { creator, peer } => {
                let other = if peer == sender { creator } else { peer };
                if other == sender || other.is_empty() {
                    Vec::new()
                } else {
                    vec![other.clone()]
                }
            }
            Participants::Group { members } => {
                let mut out: Vec<UserId> = Vec::with_capacity(members.len());
                for member in members {
                    if member != sender && !member.is_empty() && !out.contains(member) {
                        out.push(member.clone());
                    }
                }
                out
            }
        }
    }
}

/// Sender display metadata, denormalised onto every message.
///
/// Captured once when a session is admitted and never refreshed for the
/// lifetime of that session; a profile edit mid-session shows up only after
/// the user reconnects.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderProfile {
    /// Display name.
    pub name: String,
    /// Employee number.
    pub ext: String,
    /// Department.
    pub dept: String,
    /// Avatar URL.
    pub avatar: String,
}

/// A chat message, immutable once persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message ID.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Author.
    pub sender_id: UserId,
    /// Author metadata at write time.
    pub sender: SenderProfile,
    /// Message body (text or URL).
    pub content: String,
    /// Kind of `content`.
    pub content_kind: ContentKind,
    /// Original file name for file/image/audio messages.
    pub file_name: Option<String>,
    /// Human-readable file size.
    pub file_size: Option<String>,
    /// Derived from the conversation kind at write time.
    pub scene: Scene,
    /// Delivery status at write time.
    pub status: DeliveryStatus,
    /// Local presentation time (`HH:MM`).
    pub display_time: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// New last-message fields for a conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationSummary {
    /// Summary text (possibly prefixed with the sender's name).
    pub last_message: String,
    /// Display time of the message that produced the summary.
    pub last_time: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
