//! Last-message summaries and presentation timestamps.

use chrono::{DateTime, Local, Utc};

use crate::chat::{ConversationKind, ConversationSummary};

/// First `max_chars` characters of `content`.
///
/// Counts Unicode scalar values, never bytes, so a multi-byte character is
/// never split.
pub fn truncate_chars(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

/// Summary line for a conversation's last message.
///
/// Group summaries are prefixed with the sender's display name
/// (`"{name}: {content}"`); direct summaries are the truncated content alone.
pub fn summarize(
    kind: ConversationKind,
    sender_name: &str,
    content: &str,
    max_chars: usize,
) -> String {
    let body = truncate_chars(content, max_chars);
    match kind {
        ConversationKind::Group => format!("{sender_name}: {body}"),
        ConversationKind::Direct => body.to_owned(),
    }
}

/// Build the summary update written alongside a new message.
pub fn conversation_summary(
    kind: ConversationKind,
    sender_name: &str,
    content: &str,
    max_chars: usize,
    display_time: &str,
) -> ConversationSummary {
    ConversationSummary {
        last_message: summarize(kind, sender_name, content, max_chars),
        last_time: display_time.to_owned(),
    }
}

/// Wall-clock `HH:MM` in the server's local timezone.
pub fn display_time(now: DateTime<Utc>) -> String {
    now.with_timezone(&Local).format("%H:%M").to_string()
}

/// Current time as epoch milliseconds.
pub fn unix_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
