//! Message repository: append-only writes to `im_messages`.

use crm_core::chat::{ChatMessage, ConversationSummary};
use crm_core::ids::ConversationId;
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::errors::{Result, StoreError};
use crate::sqlite::row_types::MessageRow;

const COLUMNS: &str = "id, conversation_id, sender_id, sender_name, sender_ext, sender_dept,
                       sender_avatar, content, content_kind, file_name, file_size, scene,
                       status, display_time, created_at";

/// Message repository: stateless, every method takes `&Connection`.
pub struct MessageRepo;

/// Per-sender message tally from [`MessageRepo::top_senders`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderCount {
    /// Sender user ID.
    pub sender_id: String,
    /// Sender display name as recorded on their messages.
    pub sender_name: String,
    /// Messages sent in the window.
    pub messages: i64,
}

impl MessageRepo {
    /// Insert a message row on its own.
    pub fn insert(conn: &Connection, msg: &ChatMessage) -> Result<()> {
        let _ = conn.execute(
            &format!(
                "INSERT INTO im_messages ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ),
            params![
                msg.id.as_str(),
                msg.conversation_id.as_str(),
                msg.sender_id.as_str(),
                msg.sender.name,
                msg.sender.ext,
                msg.sender.dept,
                msg.sender.avatar,
                msg.content,
                msg.content_kind.as_str(),
                msg.file_name,
                msg.file_size,
                msg.scene.as_str(),
                msg.status.as_str(),
                msg.display_time,
                msg.created_at,
            ],
        )?;
        Ok(())
    }

    /// Insert a message and update its conversation's summary atomically.
    ///
    /// Either both writes commit or neither does. A conversation that has
    /// disappeared (or been soft-deleted) since it was resolved aborts the
    /// whole append with [`StoreError::ConversationNotFound`].
    pub fn append(
        conn: &Connection,
        msg: &ChatMessage,
        summary: &ConversationSummary,
    ) -> Result<()> {
        let tx = conn.unchecked_transaction()?;
        Self::insert(&tx, msg)?;
        let changed = tx.execute(
            "UPDATE im_conversations
             SET last_message = ?1, last_time = ?2, updated_at = ?3
             WHERE id = ?4 AND is_deleted = 0",
            params![
                summary.last_message,
                summary.last_time,
                msg.created_at,
                msg.conversation_id.as_str()
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::ConversationNotFound(
                msg.conversation_id.to_string(),
            ));
        }
        tx.commit()?;
        Ok(())
    }

    /// Most recent `limit` messages of a conversation, oldest first.
    ///
    /// `before` (a `created_at` value) pages backwards through history.
    pub fn list(
        conn: &Connection,
        conversation_id: &ConversationId,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<ChatMessage>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM im_messages
             WHERE conversation_id = ?1 AND (?2 IS NULL OR created_at < ?2)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(params![conversation_id.as_str(), before, limit], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut messages = rows
            .into_iter()
            .map(ChatMessage::try_from)
            .collect::<Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Number of messages created at or after `since` (RFC 3339).
    pub fn count_since(conn: &Connection, since: &str) -> Result<i64> {
        let n = conn.query_row(
            "SELECT COUNT(*) FROM im_messages WHERE created_at >= ?1",
            params![since],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// Most active senders since `since`, busiest first.
    pub fn top_senders(conn: &Connection, since: &str, limit: u32) -> Result<Vec<SenderCount>> {
        let mut stmt = conn.prepare(
            "SELECT sender_id, MAX(sender_name), COUNT(*) AS n
             FROM im_messages
             WHERE created_at >= ?1
             GROUP BY sender_id
             ORDER BY n DESC, sender_id ASC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![since, limit], |row| {
                Ok(SenderCount {
                    sender_id: row.get(0)?,
                    sender_name: row.get(1)?,
                    messages: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
        Ok(MessageRow {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            sender_id: row.get(2)?,
            sender_name: row.get(3)?,
            sender_ext: row.get(4)?,
            sender_dept: row.get(5)?,
            sender_avatar: row.get(6)?,
            content: row.get(7)?,
            content_kind: row.get(8)?,
            file_name: row.get(9)?,
            file_size: row.get(10)?,
            scene: row.get(11)?,
            status: row.get(12)?,
            display_time: row.get(13)?,
            created_at: row.get(14)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;
    use crate::sqlite::repositories::conversation::ConversationRepo;
    use assert_matches::assert_matches;
    use crm_core::chat::{ContentKind, Conversation, DeliveryStatus, SenderProfile};
    use crm_core::ids::{MessageId, UserId};

    fn setup() -> (Connection, Conversation) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        let _ = run_migrations(&conn).unwrap();
        let conv = ConversationRepo::create_group(
            &conn,
            "team",
            &UserId::from("a"),
            &[UserId::from("b")],
        )
        .unwrap();
        (conn, conv)
    }

    fn message(conv: &Conversation, content: &str, created_at: &str) -> ChatMessage {
        ChatMessage {
            id: MessageId::new(),
            conversation_id: conv.id.clone(),
            sender_id: "a".into(),
            sender: SenderProfile {
                name: "Alice".into(),
                ..SenderProfile::default()
            },
            content: content.into(),
            content_kind: ContentKind::Text,
            file_name: None,
            file_size: None,
            scene: conv.scene(),
            status: DeliveryStatus::Sent,
            display_time: "09:00".into(),
            created_at: created_at.into(),
        }
    }

    fn summary(text: &str) -> ConversationSummary {
        ConversationSummary {
            last_message: text.into(),
            last_time: "09:00".into(),
        }
    }

    #[test]
    fn append_writes_message_and_summary() {
        let (conn, conv) = setup();
        let msg = message(&conv, "hello", "2025-01-01T09:00:00Z");
        MessageRepo::append(&conn, &msg, &summary("Alice: hello")).unwrap();

        let history = MessageRepo::list(&conn, &conv.id, 10, None).unwrap();
        assert_eq!(history, vec![msg]);
        let reloaded = ConversationRepo::get(&conn, &conv.id).unwrap();
        assert_eq!(reloaded.last_message.as_deref(), Some("Alice: hello"));
    }

    #[test]
    fn append_to_missing_conversation_rolls_back() {
        let (conn, conv) = setup();
        let mut ghost = conv.clone();
        ghost.id = "ghost".into();
        let msg = message(&ghost, "lost", "2025-01-01T09:00:00Z");
        // FK rejects the insert before the summary update is reached.
        assert!(MessageRepo::append(&conn, &msg, &summary("lost")).is_err());
        assert_eq!(MessageRepo::count_since(&conn, "2000-01-01").unwrap(), 0);
    }

    #[test]
    fn append_to_soft_deleted_conversation_rolls_back() {
        let (conn, conv) = setup();
        let _ = conn
            .execute(
                "UPDATE im_conversations SET is_deleted = 1 WHERE id = ?1",
                params![conv.id.as_str()],
            )
            .unwrap();
        let msg = message(&conv, "late", "2025-01-01T09:00:00Z");
        assert_matches!(
            MessageRepo::append(&conn, &msg, &summary("late")),
            Err(StoreError::ConversationNotFound(_))
        );
        assert!(MessageRepo::list(&conn, &conv.id, 10, None).unwrap().is_empty());
    }

    #[test]
    fn list_returns_latest_page_in_order() {
        let (conn, conv) = setup();
        for (i, ts) in ["2025-01-01T09:00:00Z", "2025-01-01T09:01:00Z", "2025-01-01T09:02:00Z"]
            .iter()
            .enumerate()
        {
            let msg = message(&conv, &format!("m{i}"), ts);
            MessageRepo::append(&conn, &msg, &summary("x")).unwrap();
        }
        let page = MessageRepo::list(&conn, &conv.id, 2, None).unwrap();
        let contents: Vec<&str> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m1", "m2"]);

        let older = MessageRepo::list(&conn, &conv.id, 10, Some("2025-01-01T09:01:00Z")).unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].content, "m0");
    }

    #[test]
    fn file_metadata_roundtrips() {
        let (conn, conv) = setup();
        let mut msg = message(&conv, "https://files/x.pdf", "2025-01-01T09:00:00Z");
        msg.content_kind = ContentKind::File;
        msg.file_name = Some("x.pdf".into());
        msg.file_size = Some("12 KB".into());
        MessageRepo::append(&conn, &msg, &summary("x")).unwrap();
        let stored = &MessageRepo::list(&conn, &conv.id, 1, None).unwrap()[0];
        assert_eq!(stored.content_kind, ContentKind::File);
        assert_eq!(stored.file_name.as_deref(), Some("x.pdf"));
        assert_eq!(stored.scene, crm_core::chat::Scene::Group);
    }

    #[test]
    fn count_since_filters_by_time() {
        let (conn, conv) = setup();
        MessageRepo::append(&conn, &message(&conv, "a", "2025-01-01T09:00:00Z"), &summary("a"))
            .unwrap();
        MessageRepo::append(&conn, &message(&conv, "b", "2025-01-02T09:00:00Z"), &summary("b"))
            .unwrap();
        assert_eq!(MessageRepo::count_since(&conn, "2025-01-02T00:00:00Z").unwrap(), 1);
    }

    #[test]
    fn top_senders_ranks_by_volume() {
        let (conn, conv) = setup();
        let mut from_b = message(&conv, "hi", "2025-01-01T09:00:00Z");
        from_b.sender_id = "b".into();
        from_b.sender.name = "Bob".into();
        MessageRepo::append(&conn, &from_b, &summary("x")).unwrap();
        for ts in ["2025-01-01T09:01:00Z", "2025-01-01T09:02:00Z"] {
            MessageRepo::append(&conn, &message(&conv, "yo", ts), &summary("x")).unwrap();
        }

        let ranking = MessageRepo::top_senders(&conn, "2025-01-01T00:00:00Z", 10).unwrap();
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].sender_id, "a");
        assert_eq!(ranking[0].sender_name, "Alice");
        assert_eq!(ranking[0].messages, 2);
        assert_eq!(ranking[1].sender_name, "Bob");

        let top_one = MessageRepo::top_senders(&conn, "2025-01-01T00:00:00Z", 1).unwrap();
        assert_eq!(top_one.len(), 1);
    }
}
