//! Shared state handed to every session task.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::auth::IdentityResolver;
use crate::config::ServerConfig;
use crate::dashboard::SnapshotSource;
use crate::im::pipeline::MessagePipeline;
use crate::im::{ConversationDirectory, MessageStore, ProfileDirectory};
use crate::notify::{NotificationEmitter, NotificationStore};
use crate::websocket::admission::SessionAdmission;
use crate::websocket::registry::ConnectionRegistry;

/// External collaborators the hub is wired to.
#[derive(Clone)]
pub struct RealtimeDeps {
    /// Resolves the handshake token to a user.
    pub identity: Arc<dyn IdentityResolver>,
    /// Conversation lookup.
    pub directory: Arc<dyn ConversationDirectory>,
    /// Message persistence.
    pub messages: Arc<dyn MessageStore>,
    /// Sender profiles.
    pub profiles: Arc<dyn ProfileDirectory>,
    /// Dashboard payloads.
    pub snapshots: Arc<dyn SnapshotSource>,
    /// Notification persistence.
    pub notifications: Arc<dyn NotificationStore>,
}

/// Everything a session needs, built once per server.
///
/// The registry is constructed here and shared by handle; nothing else in
/// the process owns a binding table.
pub struct RealtimeContext {
    /// Server settings.
    pub config: ServerConfig,
    /// User → connection bindings.
    pub registry: Arc<ConnectionRegistry>,
    /// Kick-on-reconnect gate; also owns `status.change` announcements.
    pub admission: SessionAdmission,
    /// `im.message` handling.
    pub pipeline: MessagePipeline,
    /// `sys.notification` pushes.
    pub notifier: NotificationEmitter,
    /// Handshake identity.
    pub identity: Arc<dyn IdentityResolver>,
    /// Sender profiles.
    pub profiles: Arc<dyn ProfileDirectory>,
    /// Dashboard payloads.
    pub snapshots: Arc<dyn SnapshotSource>,
    live_sessions: AtomicUsize,
}

impl RealtimeContext {
    /// Wire the hub's components around a fresh registry.
    pub fn new(config: ServerConfig, deps: RealtimeDeps) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            admission: SessionAdmission::new(registry.clone()),
            pipeline: MessagePipeline::new(
                registry.clone(),
                deps.directory,
                deps.messages,
                config.summary_max_chars,
            ),
            notifier: NotificationEmitter::new(registry.clone(), deps.notifications),
            identity: deps.identity,
            profiles: deps.profiles,
            snapshots: deps.snapshots,
            registry,
            config,
            live_sessions: AtomicUsize::new(0),
        }
    }

    /// Open transports, including ones still tearing down.
    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::Relaxed)
    }

    pub(crate) fn session_opened(&self) {
        let _ = self.live_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_closed(&self) {
        let _ = self.live_sessions.fetch_sub(1, Ordering::Relaxed);
    }
}
