//! User repository: display metadata for the sender-profile cache.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::sqlite::row_types::UserRow;

/// Input for [`UserRepo::upsert`].
#[derive(Clone, Debug, Default)]
pub struct NewUser<'a> {
    /// User ID (must match the credential `sub`).
    pub id: &'a str,
    /// Login name; unique.
    pub username: &'a str,
    /// Display name.
    pub name: &'a str,
    /// Employee number.
    pub employee_no: &'a str,
    /// Department name.
    pub department: &'a str,
    /// Avatar URL.
    pub avatar: &'a str,
}

const COLUMNS: &str = "id, username, name, employee_no, department, avatar, is_active,
                       created_at, updated_at";

/// User repository: stateless, every method takes `&Connection`.
pub struct UserRepo;

impl UserRepo {
    /// Insert a user or refresh the display fields of an existing one.
    pub fn upsert(conn: &Connection, user: &NewUser<'_>) -> Result<UserRow> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO users (id, username, name, employee_no, department, avatar,
                                is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
             ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                name = excluded.name,
                employee_no = excluded.employee_no,
                department = excluded.department,
                avatar = excluded.avatar,
                updated_at = excluded.updated_at",
            params![
                user.id,
                user.username,
                user.name,
                user.employee_no,
                user.department,
                user.avatar,
                now
            ],
        )?;
        let row = conn.query_row(
            &format!("SELECT {COLUMNS} FROM users WHERE id = ?1"),
            params![user.id],
            Self::map_row,
        )?;
        Ok(row)
    }

    /// Get a user by ID.
    pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Get a user by login name.
    pub fn get_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Enable or disable an account. Returns whether a row was updated.
    pub fn set_active(conn: &Connection, id: &str, active: bool) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            params![i32::from(active), chrono::Utc::now().to_rfc3339(), id],
        )?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
        Ok(UserRow {
            id: row.get(0)?,
            username: row.get(1)?,
            name: row.get(2)?,
            employee_no: row.get(3)?,
            department: row.get(4)?,
            avatar: row.get(5)?,
            is_active: row.get::<_, i32>(6)? == 1,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
