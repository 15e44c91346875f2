//! Dashboard payloads computed from message and conversation activity.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use crm_core::chat::ConversationKind;
use crm_server::RealtimeError;
use crm_server::dashboard::{DashboardBoard, SnapshotSource};
use crm_store::{ConnectionPool, ConversationRepo, MessageRepo, PooledConnection};
use serde_json::{Value, json};

use super::with_conn;

const RANKING_SIZE: u32 = 10;

/// Reads activity counters straight from the database on every request.
pub struct ActivitySnapshot {
    pool: ConnectionPool,
}

impl ActivitySnapshot {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotSource for ActivitySnapshot {
    async fn snapshot(&self, board: DashboardBoard) -> Result<Value, RealtimeError> {
        let now = Utc::now();
        with_conn(&self.pool, move |conn| compute(conn, board, now)).await
    }
}

fn compute(
    conn: &PooledConnection,
    board: DashboardBoard,
    now: DateTime<Utc>,
) -> crm_store::Result<Value> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc().to_rfc3339();
    let generated_at = now.to_rfc3339();

    let payload = match board {
        DashboardBoard::Overview => json!({
            "messagesToday": MessageRepo::count_since(conn, &midnight)?,
            "directConversations": ConversationRepo::count(conn, ConversationKind::Direct)?,
            "groupConversations": ConversationRepo::count(conn, ConversationKind::Group)?,
            "generatedAt": generated_at,
        }),
        DashboardBoard::Performance => {
            let hour_ago = (now - Duration::hours(1)).to_rfc3339();
            let week_ago = (now - Duration::days(7)).to_rfc3339();
            json!({
                "messagesLastHour": MessageRepo::count_since(conn, &hour_ago)?,
                "messagesToday": MessageRepo::count_since(conn, &midnight)?,
                "messagesLast7Days": MessageRepo::count_since(conn, &week_ago)?,
                "generatedAt": generated_at,
            })
        }
        DashboardBoard::Ranking => {
            let rows: Vec<Value> = MessageRepo::top_senders(conn, &midnight, RANKING_SIZE)?
                .into_iter()
                .enumerate()
                .map(|(i, s)| {
                    json!({
                        "rank": i + 1,
                        "senderId": s.sender_id,
                        "senderName": s.sender_name,
                        "messages": s.messages,
                    })
                })
                .collect();
            json!({ "ranking": rows, "generatedAt": generated_at })
        }
    };
    Ok(payload)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
