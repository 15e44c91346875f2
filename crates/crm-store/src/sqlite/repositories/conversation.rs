//! Conversation repository: CRUD for `im_conversations`.
//!
//! Direct conversations carry a `direct_pair_key` (the two participant IDs
//! sorted, length-prefixed and joined) behind a partial unique index, so at most one
//! direct conversation exists per unordered pair no matter how many callers
//! race to create it.

use crm_core::chat::{Conversation, ConversationKind, ConversationSummary};
use crm_core::ids::{ConversationId, UserId};
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::{Result, StoreError};
use crate::sqlite::row_types::ConversationRow;

const COLUMNS: &str = "id, kind, name, created_by, peer_user_id, member_ids,
                       last_message, last_time";

/// Result of [`ConversationRepo::get_or_create_direct`].
#[derive(Debug)]
pub struct DirectConversation {
    /// The (possibly pre-existing) conversation.
    pub conversation: Conversation,
    /// Whether this call inserted it.
    pub created: bool,
}

/// Conversation repository: stateless, every method takes `&Connection`.
pub struct ConversationRepo;

impl ConversationRepo {
    /// Create a group conversation. The creator is added to the member list
    /// if absent; duplicates are dropped, order is preserved.
    pub fn create_group(
        conn: &Connection,
        name: &str,
        creator: &UserId,
        members: &[UserId],
    ) -> Result<Conversation> {
        let mut member_ids: Vec<&UserId> = Vec::with_capacity(members.len() + 1);
        for id in std::iter::once(creator).chain(members) {
            if !id.is_empty() && !member_ids.contains(&id) {
                member_ids.push(id);
            }
        }

        let id = ConversationId::new();
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO im_conversations
                (id, kind, name, created_by, member_ids, created_at, updated_at)
             VALUES (?1, 'group', ?2, ?3, ?4, ?5, ?5)",
            params![
                id.as_str(),
                name,
                creator.as_str(),
                serde_json::to_string(&member_ids)?,
                now
            ],
        )?;
        Self::get(conn, &id)
    }

    /// Return the direct conversation between `creator` and `peer`, creating
    /// it if it does not exist yet.
    ///
    /// Lookup goes through the pair key, so `(a, b)` and `(b, a)` resolve to
    /// the same row. A soft-deleted pair is revived rather than left
    /// unreachable behind the unique key.
    pub fn get_or_create_direct(
        conn: &Connection,
        creator: &UserId,
        peer: &UserId,
        name: &str,
    ) -> Result<DirectConversation> {
        if creator.is_empty() || peer.is_empty() {
            return Err(StoreError::InvalidOperation(
                "direct conversation needs two participant ids".into(),
            ));
        }
        let key = direct_pair_key(creator, peer);
        let members = serde_json::to_string(&[creator, peer])?;
        let id = ConversationId::new();
        let now = chrono::Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO im_conversations
                (id, kind, name, created_by, peer_user_id, member_ids, direct_pair_key,
                 created_at, updated_at)
             VALUES (?1, 'direct', ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id.as_str(),
                name,
                creator.as_str(),
                peer.as_str(),
                members,
                key,
                now
            ],
        )?;
        if inserted == 0 {
            let _ = conn.execute(
                "UPDATE im_conversations SET is_deleted = 0, updated_at = ?1
                 WHERE direct_pair_key = ?2 AND is_deleted = 1",
                params![now, key],
            )?;
        }

        let row = conn.query_row(
            &format!("SELECT {COLUMNS} FROM im_conversations WHERE direct_pair_key = ?1"),
            params![key],
            Self::map_row,
        )?;
        Ok(DirectConversation {
            conversation: row.try_into()?,
            created: inserted == 1,
        })
    }

    /// Find a live (not soft-deleted) conversation.
    pub fn find(conn: &Connection, id: &ConversationId) -> Result<Option<Conversation>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM im_conversations WHERE id = ?1 AND is_deleted = 0"
                ),
                params![id.as_str()],
                Self::map_row,
            )
            .optional()?;
        row.map(Conversation::try_from).transpose()
    }

    /// Like [`find`](Self::find) but a missing row is an error.
    pub fn get(conn: &Connection, id: &ConversationId) -> Result<Conversation> {
        Self::find(conn, id)?.ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))
    }

    /// Live conversations `user` participates in, most recently updated first.
    pub fn list_for_user(conn: &Connection, user: &UserId) -> Result<Vec<Conversation>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM im_conversations c
             WHERE c.is_deleted = 0
               AND EXISTS (SELECT 1 FROM json_each(c.member_ids) WHERE json_each.value = ?1)
             ORDER BY c.updated_at DESC, c.id DESC"
        ))?;
        let rows = stmt
            .query_map(params![user.as_str()], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(Conversation::try_from).collect()
    }

    /// Overwrite the last-message fields. Returns whether a live row matched.
    pub fn update_summary(
        conn: &Connection,
        id: &ConversationId,
        summary: &ConversationSummary,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE im_conversations
             SET last_message = ?1, last_time = ?2, updated_at = ?3
             WHERE id = ?4 AND is_deleted = 0",
            params![
                summary.last_message,
                summary.last_time,
                chrono::Utc::now().to_rfc3339(),
                id.as_str()
            ],
        )?;
        Ok(changed > 0)
    }

    /// Count live conversations of a kind.
    pub fn count(conn: &Connection, kind: ConversationKind) -> Result<i64> {
        let n = conn.query_row(
            "SELECT COUNT(*) FROM im_conversations WHERE kind = ?1 AND is_deleted = 0",
            params![kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
        Ok(ConversationRow {
            id: row.get(0)?,
            kind: row.get(1)?,
            name: row.get(2)?,
            created_by: row.get(3)?,
            peer_user_id: row.get(4)?,
            member_ids: row.get(5)?,
            last_message: row.get(6)?,
            last_time: row.get(7)?,
        })
    }
}

/// Order-independent key for a direct pair.
///
/// The lower ID is length-prefixed, so IDs containing `:` cannot collide:
/// `("a:b", "c")` and `("a", "b:c")` map to different keys.
pub fn direct_pair_key(a: &UserId, b: &UserId) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{lo}:{hi}", lo.as_str().len())
}
