//! Branded ID newtypes.
//!
//! Each entity gets its own wrapper around `String` so a conversation ID can
//! never be passed where a user ID is expected. IDs minted by the hub are
//! UUID v7 (time-ordered); user IDs come from the identity provider and are
//! taken verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the underlying string is empty.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Adds UUID v7 generation to a branded ID minted by the hub itself.
macro_rules! generated_id {
    ($name:ident) => {
        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

branded_id! {
    /// Authenticated user identity (the `sub` of the presented credential).
    UserId
}

branded_id! {
    /// Unique identifier for a conversation (direct or group).
    ConversationId
}

branded_id! {
    /// Unique identifier for a persisted chat message.
    MessageId
}

branded_id! {
    /// Unique identifier for one WebSocket connection.
    ///
    /// A user keeps the same `UserId` across reconnects but every transport
    /// gets a fresh `ConnectionId`, which is what lets the registry tell a
    /// superseded handle apart from its replacement.
    ConnectionId
}

branded_id! {
    /// Unique identifier for a persisted notification.
    NotificationId
}

generated_id!(ConversationId);
generated_id!(MessageId);
generated_id!(ConnectionId);
generated_id!(NotificationId);

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
