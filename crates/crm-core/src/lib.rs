//! # crm-core
//!
//! Foundation types shared by every crate of the CRM realtime hub.
//!
//! - **Branded IDs**: `UserId`, `ConversationId`, `MessageId`, `ConnectionId`,
//!   `NotificationId` as newtypes so identities cannot be mixed up
//! - **Chat model**: conversations (direct/group), messages, scenes, content
//!   kinds, and the sender profile captured at admission
//! - **Text helpers**: last-message summaries and display timestamps
//! - **Logging**: `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod chat;
pub mod constants;
pub mod ids;
pub mod logging;
pub mod text;

pub use chat::{
    ChatMessage, ContentKind, Conversation, ConversationKind, ConversationSummary, DeliveryStatus,
    Participants, Scene, SenderProfile,
};
pub use ids::{ConnectionId, ConversationId, MessageId, NotificationId, UserId};
