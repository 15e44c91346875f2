//! User → live connection bindings.
//!
//! At most one binding per user. Fan-out snapshots the bindings under the
//! read lock and removes dead peers after the pass, never during it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crm_core::ids::{ConnectionId, UserId};
use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::connection::{ClientConnection, SendResult};
use super::protocol::OutboundEvent;
use crate::errors::RealtimeError;
use crate::metrics::WS_DELIVERY_FAILURES_TOTAL;

/// Queue-full drops tolerated before a slow peer is evicted.
const MAX_TOTAL_DROPS: u64 = 100;

/// Close code sent to an evicted peer.
const CLOSE_GOING_AWAY: u16 = 1001;

/// Result of [`ConnectionRegistry::unregister`].
#[derive(Debug)]
pub enum UnregisterOutcome {
    /// The binding existed and was removed.
    Removed(Arc<ClientConnection>),
    /// No binding for that user.
    AlreadyAbsent,
}

/// Result of a targeted send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Queued on the recipient's connection.
    Delivered,
    /// Recipient has no live session.
    NotConnected,
    /// Recipient's queue was full; frame dropped, binding kept.
    Dropped,
    /// Recipient's transport was dead; binding removed.
    Disconnected,
}

impl DeliveryOutcome {
    /// Whether the frame reached the recipient's queue.
    pub fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Error describing a failed write, if any.
    pub fn failure(self, user_id: &UserId) -> Option<RealtimeError> {
        matches!(self, Self::Dropped | Self::Disconnected).then(|| RealtimeError::Delivery {
            user_id: user_id.clone(),
        })
    }
}

/// Summary of a fan-out pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Bindings the frame was offered to.
    pub attempted: usize,
    /// Bindings that queued it.
    pub delivered: usize,
    /// Bindings removed after the pass.
    pub removed: usize,
}

/// Registry of live sessions, one per user.
pub struct ConnectionRegistry {
    bindings: RwLock<HashMap<UserId, Arc<ClientConnection>>>,
    active_count: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Bind a connection to its user.
    ///
    /// Fails with [`RealtimeError::Conflict`] if the user is already bound;
    /// callers evict the old session first.
    pub async fn register(&self, connection: Arc<ClientConnection>) -> Result<(), RealtimeError> {
        let mut bindings = self.bindings.write().await;
        if bindings.contains_key(&connection.user_id) {
            return Err(RealtimeError::Conflict {
                user_id: connection.user_id.clone(),
            });
        }
        let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        let _ = bindings.insert(connection.user_id.clone(), connection);
        Ok(())
    }

    /// Bind a connection, returning the binding it displaced.
    ///
    /// The swap happens under one write lock, so no reader ever sees the
    /// user unbound in between.
    pub async fn replace(&self, connection: Arc<ClientConnection>) -> Option<Arc<ClientConnection>> {
        let mut bindings = self.bindings.write().await;
        let previous = bindings.insert(connection.user_id.clone(), connection);
        if previous.is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
        previous
    }

    /// Remove whatever binding the user has.
    pub async fn unregister(&self, user_id: &UserId) -> UnregisterOutcome {
        let removed = self.bindings.write().await.remove(user_id);
        match removed {
            Some(conn) => {
                let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
                UnregisterOutcome::Removed(conn)
            }
            None => UnregisterOutcome::AlreadyAbsent,
        }
    }

    /// Remove the user's binding only if it is still `connection_id`.
    ///
    /// A superseded session tearing down must not remove its replacement.
    pub async fn unregister_connection(&self, user_id: &UserId, connection_id: &ConnectionId) -> bool {
        let mut bindings = self.bindings.write().await;
        let is_current = bindings
            .get(user_id)
            .is_some_and(|conn| &conn.id == connection_id);
        if is_current {
            let _ = bindings.remove(user_id);
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
        is_current
    }

    /// Current binding for a user.
    pub(crate) async fn get(&self, user_id: &UserId) -> Option<Arc<ClientConnection>> {
        self.bindings.read().await.get(user_id).cloned()
    }

    /// Serialize and send an event to one user.
    pub async fn send_to(&self, user_id: &UserId, event: &OutboundEvent) -> DeliveryOutcome {
        match event.to_frame() {
            Ok(frame) => self.send_raw(user_id, frame).await,
            Err(e) => {
                warn!(event_type = %event.event_type, error = %e, "failed to serialize event");
                DeliveryOutcome::Dropped
            }
        }
    }

    /// Send a pre-serialized frame to one user.
    ///
    /// A dead transport, or a peer past [`MAX_TOTAL_DROPS`], is unregistered
    /// and closed. Failures are never surfaced to whoever triggered the send.
    pub async fn send_raw(&self, user_id: &UserId, frame: Arc<String>) -> DeliveryOutcome {
        let Some(conn) = self.get(user_id).await else {
            return DeliveryOutcome::NotConnected;
        };
        match conn.send(frame) {
            SendResult::Queued => DeliveryOutcome::Delivered,
            SendResult::Full if conn.drop_count() < MAX_TOTAL_DROPS => {
                debug!(user_id = %user_id, drops = conn.drop_count(), "send queue full, frame dropped");
                counter!(WS_DELIVERY_FAILURES_TOTAL, "reason" => "queue_full").increment(1);
                DeliveryOutcome::Dropped
            }
            SendResult::Full | SendResult::Closed => {
                self.evict(&conn).await;
                DeliveryOutcome::Disconnected
            }
        }
    }

    /// Send an event to every bound user except `exclude`.
    pub async fn broadcast_all(
        &self,
        event: &OutboundEvent,
        exclude: Option<&UserId>,
    ) -> BroadcastReport {
        let frame = match event.to_frame() {
            Ok(f) => f,
            Err(e) => {
                warn!(event_type = %event.event_type, error = %e, "failed to serialize event");
                return BroadcastReport::default();
            }
        };

        let mut report = BroadcastReport::default();
        let mut to_remove = Vec::new();
        {
            let bindings = self.bindings.read().await;
            for conn in bindings.values() {
                if exclude.is_some_and(|u| u == &conn.user_id) {
                    continue;
                }
                report.attempted += 1;
                match conn.send(frame.clone()) {
                    SendResult::Queued => report.delivered += 1,
                    SendResult::Full if conn.drop_count() < MAX_TOTAL_DROPS => {
                        counter!(WS_DELIVERY_FAILURES_TOTAL, "reason" => "queue_full").increment(1);
                    }
                    SendResult::Full | SendResult::Closed => to_remove.push(conn.clone()),
                }
            }
        }

        for conn in &to_remove {
            self.evict(conn).await;
        }
        report.removed = to_remove.len();
        debug!(
            event_type = %event.event_type,
            attempted = report.attempted,
            delivered = report.delivered,
            removed = report.removed,
            "broadcast event to all"
        );
        report
    }

    async fn evict(&self, conn: &Arc<ClientConnection>) {
        if self.unregister_connection(&conn.user_id, &conn.id).await {
            warn!(user_id = %conn.user_id, conn_id = %conn.id, drops = conn.drop_count(), "evicting unreachable connection");
            counter!(WS_DELIVERY_FAILURES_TOTAL, "reason" => "disconnected").increment(1);
        }
        let _ = conn.close(CLOSE_GOING_AWAY, "unreachable");
    }

    /// Whether the user has a live binding.
    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.bindings.read().await.contains_key(user_id)
    }

    /// Users with a live binding.
    pub async fn online_users(&self) -> Vec<UserId> {
        self.bindings.read().await.keys().cloned().collect()
    }

    /// Number of live bindings.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Close and remove every binding. Used on shutdown.
    pub async fn close_all(&self, code: u16, reason: &str) -> usize {
        let drained: Vec<_> = self.bindings.write().await.drain().map(|(_, c)| c).collect();
        self.active_count.store(0, Ordering::Relaxed);
        for conn in &drained {
            let _ = conn.close(code, reason);
        }
        drained.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::Outbound;
    use assert_matches::assert_matches;
    use crm_core::chat::SenderProfile;
    use proptest::prelude::*;
    use tokio::sync::mpsc;

    fn make_connection(user: &str, capacity: usize) -> (Arc<ClientConnection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = ClientConnection::new(user.into(), SenderProfile::default(), tx);
        (Arc::new(conn), rx)
    }

    fn text_of(out: Outbound) -> serde_json::Value {
        match out {
            Outbound::Text(t) => serde_json::from_str(&t).unwrap(),
            Outbound::Close { .. } => panic!("expected text frame"),
        }
    }

    #[tokio::test]
    async fn register_then_lookup() {
        let reg = ConnectionRegistry::new();
        let (conn, _rx) = make_connection("u1", 8);
        reg.register(conn).await.unwrap();
        assert!(reg.is_online(&"u1".into()).await);
        assert_eq!(reg.connection_count(), 1);
        assert_eq!(reg.online_users().await, vec![UserId::from("u1")]);
    }

    #[tokio::test]
    async fn second_register_conflicts() {
        let reg = ConnectionRegistry::new();
        let (a, _ra) = make_connection("u1", 8);
        let (b, _rb) = make_connection("u1", 8);
        reg.register(a.clone()).await.unwrap();
        let err = reg.register(b).await.unwrap_err();
        assert_matches!(err, RealtimeError::Conflict { user_id } if user_id.as_str() == "u1");
        assert_eq!(reg.get(&"u1".into()).await.unwrap().id, a.id);
        assert_eq!(reg.connection_count(), 1);
    }

    #[tokio::test]
    async fn unregister_reports_absent() {
        let reg = ConnectionRegistry::new();
        assert_matches!(reg.unregister(&"nobody".into()).await, UnregisterOutcome::AlreadyAbsent);
        let (conn, _rx) = make_connection("u1", 8);
        reg.register(conn).await.unwrap();
        assert_matches!(reg.unregister(&"u1".into()).await, UnregisterOutcome::Removed(_));
        assert_eq!(reg.connection_count(), 0);
    }

    #[tokio::test]
    async fn unregister_connection_ignores_stale_id() {
        let reg = ConnectionRegistry::new();
        let (old, _ro) = make_connection("u1", 8);
        let (new, _rn) = make_connection("u1", 8);
        reg.register(new.clone()).await.unwrap();
        assert!(!reg.unregister_connection(&"u1".into(), &old.id).await);
        assert!(reg.is_online(&"u1".into()).await);
        assert!(reg.unregister_connection(&"u1".into(), &new.id).await);
        assert!(!reg.is_online(&"u1".into()).await);
    }

    #[tokio::test]
    async fn send_to_offline_user() {
        let reg = ConnectionRegistry::new();
        let outcome = reg.send_to(&"ghost".into(), &OutboundEvent::pong()).await;
        assert_eq!(outcome, DeliveryOutcome::NotConnected);
        assert!(outcome.failure(&"ghost".into()).is_none());
    }

    #[tokio::test]
    async fn send_to_delivers() {
        let reg = ConnectionRegistry::new();
        let (conn, mut rx) = make_connection("u1", 8);
        reg.register(conn).await.unwrap();
        let outcome = reg.send_to(&"u1".into(), &OutboundEvent::pong()).await;
        assert!(outcome.is_delivered());
        assert_eq!(text_of(rx.recv().await.unwrap())["type"], "pong");
    }

    #[tokio::test]
    async fn send_to_dead_transport_unregisters() {
        let reg = ConnectionRegistry::new();
        let (conn, rx) = make_connection("u1", 8);
        reg.register(conn.clone()).await.unwrap();
        drop(rx);
        let outcome = reg.send_to(&"u1".into(), &OutboundEvent::pong()).await;
        assert_eq!(outcome, DeliveryOutcome::Disconnected);
        assert_matches!(outcome.failure(&"u1".into()), Some(RealtimeError::Delivery { .. }));
        assert!(!reg.is_online(&"u1".into()).await);
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn full_queue_drops_until_threshold() {
        let reg = ConnectionRegistry::new();
        let (conn, _rx) = make_connection("u1", 1);
        reg.register(conn.clone()).await.unwrap();
        assert!(reg.send_to(&"u1".into(), &OutboundEvent::pong()).await.is_delivered());
        for _ in 0..MAX_TOTAL_DROPS - 1 {
            assert_eq!(
                reg.send_to(&"u1".into(), &OutboundEvent::pong()).await,
                DeliveryOutcome::Dropped
            );
        }
        assert!(reg.is_online(&"u1".into()).await);
        assert_eq!(
            reg.send_to(&"u1".into(), &OutboundEvent::pong()).await,
            DeliveryOutcome::Disconnected
        );
        assert!(!reg.is_online(&"u1".into()).await);
    }

    #[tokio::test]
    async fn broadcast_excludes_and_cleans_up() {
        let reg = ConnectionRegistry::new();
        let (a, mut ra) = make_connection("a", 8);
        let (b, mut rb) = make_connection("b", 8);
        let (c, rc) = make_connection("c", 8);
        reg.register(a).await.unwrap();
        reg.register(b).await.unwrap();
        reg.register(c).await.unwrap();
        drop(rc);

        let report = reg
            .broadcast_all(&OutboundEvent::pong(), Some(&"a".into()))
            .await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.removed, 1);
        assert!(ra.try_recv().is_err());
        assert_eq!(text_of(rb.recv().await.unwrap())["type"], "pong");
        assert!(!reg.is_online(&"c".into()).await);
        assert_eq!(reg.connection_count(), 2);
    }

    #[tokio::test]
    async fn replace_swaps_binding_in_place() {
        let reg = ConnectionRegistry::new();
        let (old, _ro) = make_connection("u1", 8);
        let (new, _rn) = make_connection("u1", 8);
        assert!(reg.replace(old.clone()).await.is_none());
        let displaced = reg.replace(new.clone()).await.unwrap();
        assert_eq!(displaced.id, old.id);
        assert_eq!(reg.get(&"u1".into()).await.unwrap().id, new.id);
        assert_eq!(reg.connection_count(), 1);
        assert!(!reg.unregister_connection(&"u1".into(), &old.id).await);
    }

    #[tokio::test]
    async fn broadcast_survives_all_but_one_dead() {
        let reg = ConnectionRegistry::new();
        let mut live_rx = None;
        for i in 0..6 {
            let (conn, rx) = make_connection(&format!("u{i}"), 8);
            reg.register(conn).await.unwrap();
            if i == 3 {
                live_rx = Some(rx);
            }
        }

        let report = reg.broadcast_all(&OutboundEvent::pong(), None).await;
        assert_eq!(report.attempted, 6);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.removed, 5);
        assert_eq!(text_of(live_rx.unwrap().recv().await.unwrap())["type"], "pong");
        assert_eq!(reg.online_users().await, vec![UserId::from("u3")]);
        assert_eq!(reg.connection_count(), 1);
    }

    proptest! {
        #[test]
        fn broadcast_reaches_every_live_peer(
            dead in prop::collection::vec(any::<bool>(), 1..12),
            exclude in prop::option::of(0usize..12),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let reg = ConnectionRegistry::new();
                let mut receivers = Vec::new();
                for (i, is_dead) in dead.iter().enumerate() {
                    let (conn, rx) = make_connection(&format!("u{i}"), 8);
                    reg.register(conn).await.unwrap();
                    receivers.push((!is_dead).then_some(rx));
                }
                let excluded = exclude.filter(|&i| i < dead.len());
                let exclude_id = excluded.map(|i| UserId::from(format!("u{i}")));

                let report = reg.broadcast_all(&OutboundEvent::pong(), exclude_id.as_ref()).await;

                let targets: Vec<usize> = (0..dead.len()).filter(|&i| Some(i) != excluded).collect();
                let expected_dead = targets.iter().filter(|&&i| dead[i]).count();
                prop_assert_eq!(report.attempted, targets.len());
                prop_assert_eq!(report.delivered, targets.len() - expected_dead);
                prop_assert_eq!(report.removed, expected_dead);
                prop_assert_eq!(report.delivered + report.removed, report.attempted);
                prop_assert_eq!(reg.connection_count(), dead.len() - expected_dead);

                for (i, rx) in receivers.iter_mut().enumerate() {
                    let user = UserId::from(format!("u{i}"));
                    match rx {
                        Some(rx) if Some(i) == excluded => prop_assert!(rx.try_recv().is_err()),
                        Some(rx) => prop_assert!(rx.try_recv().is_ok()),
                        None if Some(i) == excluded => prop_assert!(reg.is_online(&user).await),
                        None => prop_assert!(!reg.is_online(&user).await),
                    }
                }
                Ok::<(), TestCaseError>(())
            })?;
        }
    }

    #[tokio::test]
    async fn broadcast_to_empty_registry() {
        let reg = ConnectionRegistry::new();
        let report = reg.broadcast_all(&OutboundEvent::pong(), None).await;
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn close_all_drains() {
        let reg = ConnectionRegistry::new();
        let (a, mut ra) = make_connection("a", 8);
        let (b, _rb) = make_connection("b", 8);
        reg.register(a).await.unwrap();
        reg.register(b.clone()).await.unwrap();
        assert_eq!(reg.close_all(1001, "server_shutdown").await, 2);
        assert_eq!(reg.connection_count(), 0);
        assert!(b.is_closed());
        assert_matches!(ra.recv().await.unwrap(), Outbound::Close { code: 1001, .. });
    }
}
