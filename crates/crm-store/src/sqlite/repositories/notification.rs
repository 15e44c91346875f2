//! Notification repository.

use crm_core::ids::NotificationId;
use rusqlite::{Connection, params};

use crate::errors::Result;
use crate::sqlite::row_types::NotificationRow;

/// Notification repository: stateless, every method takes `&Connection`.
pub struct NotificationRepo;

impl NotificationRepo {
    /// Persist a new unread notification.
    pub fn insert(
        conn: &Connection,
        user_id: &str,
        title: &str,
        content: &str,
        kind: &str,
    ) -> Result<NotificationRow> {
        let row = NotificationRow {
            id: NotificationId::new().into_inner(),
            user_id: user_id.to_owned(),
            title: title.to_owned(),
            content: content.to_owned(),
            kind: kind.to_owned(),
            is_read: false,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let _ = conn.execute(
            "INSERT INTO notifications (id, user_id, title, content, kind, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![row.id, row.user_id, row.title, row.content, row.kind, row.created_at],
        )?;
        Ok(row)
    }

    /// Unread notifications for a user, newest first.
    pub fn list_unread(conn: &Connection, user_id: &str) -> Result<Vec<NotificationRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, content, kind, is_read, created_at
             FROM notifications
             WHERE user_id = ?1 AND is_read = 0
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Mark one notification read. Returns whether a row changed.
    pub fn mark_read(conn: &Connection, id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND is_read = 0",
            params![id],
        )?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRow> {
        Ok(NotificationRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            kind: row.get(4)?,
            is_read: row.get::<_, i32>(5)? == 1,
            created_at: row.get(6)?,
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

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        let _ = run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn insert_is_unread() {
        let conn = setup();
        let row = NotificationRepo::insert(&conn, "u1", "Order shipped", "#42", "order").unwrap();
        assert!(!row.is_read);
        let unread = NotificationRepo::list_unread(&conn, "u1").unwrap();
        assert_eq!(unread, vec![row]);
    }

    #[test]
    fn mark_read_removes_from_unread() {
        let conn = setup();
        let row = NotificationRepo::insert(&conn, "u1", "t", "c", "info").unwrap();
        assert!(NotificationRepo::mark_read(&conn, &row.id).unwrap());
        assert!(!NotificationRepo::mark_read(&conn, &row.id).unwrap());
        assert!(NotificationRepo::list_unread(&conn, "u1").unwrap().is_empty());
    }

    #[test]
    fn serializes_kind_as_type() {
        let conn = setup();
        let row = NotificationRepo::insert(&conn, "u1", "t", "c", "warning").unwrap();
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["type"], "warning");
        assert_eq!(json["isRead"], false);
    }
}
