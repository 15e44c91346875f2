//! Per-transport connection handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crm_core::chat::SenderProfile;
use crm_core::ids::{ConnectionId, UserId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use super::protocol::OutboundEvent;

/// Frame queued for the connection's writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized JSON text frame.
    Text(Arc<String>),
    /// Close the transport with this code and reason.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Result of queueing a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendResult {
    /// Accepted by the send queue.
    Queued,
    /// Queue at capacity; the frame was dropped.
    Full,
    /// Writer is gone; the transport is dead.
    Closed,
}

/// A connected, authenticated WebSocket client.
///
/// Sends never block: frames go through a bounded queue drained by the
/// session's writer task.
pub struct ClientConnection {
    /// Unique per transport.
    pub id: ConnectionId,
    /// Owner of the session.
    pub user_id: UserId,
    /// When the transport was accepted.
    pub connected_at: Instant,
    profile: SenderProfile,
    tx: mpsc::Sender<Outbound>,
    dropped_messages: AtomicU64,
    last_activity: Mutex<Instant>,
    cancel: CancellationToken,
}

impl ClientConnection {
    /// Create a handle around the writer queue.
    pub fn new(user_id: UserId, profile: SenderProfile, tx: mpsc::Sender<Outbound>) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            user_id,
            connected_at: now,
            profile,
            tx,
            dropped_messages: AtomicU64::new(0),
            last_activity: Mutex::new(now),
            cancel: CancellationToken::new(),
        }
    }

    /// Sender profile captured at admission.
    pub fn profile(&self) -> &SenderProfile {
        &self.profile
    }

    /// Queue a pre-serialized text frame.
    pub fn send(&self, frame: Arc<String>) -> SendResult {
        if self.cancel.is_cancelled() {
            return SendResult::Closed;
        }
        match self.tx.try_send(Outbound::Text(frame)) {
            Ok(()) => SendResult::Queued,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                SendResult::Full
            }
            Err(TrySendError::Closed(_)) => SendResult::Closed,
        }
    }

    /// Serialize and queue an event.
    pub fn send_event(&self, event: &OutboundEvent) -> SendResult {
        match event.to_frame() {
            Ok(frame) => self.send(frame),
            Err(e) => {
                tracing::warn!(event_type = %event.event_type, error = %e, "failed to serialize event");
                SendResult::Closed
            }
        }
    }

    /// Ask the writer to close the transport, then cancel the session.
    ///
    /// Returns `false` if the connection was already closing.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let _ = self.tx.try_send(Outbound::Close {
            code,
            reason: reason.to_owned(),
        });
        self.cancel.cancel();
        true
    }

    /// Whether `close` has been called or the session ended.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled when the connection closes.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record inbound traffic.
    pub fn mark_activity(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last inbound frame (or acceptance).
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Frames dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
