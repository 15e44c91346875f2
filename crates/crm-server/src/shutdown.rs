//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default grace period before remaining tasks are aborted.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the process-wide shutdown token and the background tasks that must
/// be drained when it fires.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    /// Create a coordinator with no tracked tasks.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Clone of the shutdown token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Await `handle` during [`graceful_shutdown`](Self::graceful_shutdown).
    pub fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Number of tracked tasks still running.
    pub fn tracked_count(&self) -> usize {
        self.tasks.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, then wait up to `timeout` for every tracked task.
    /// Tasks still running afterwards are aborted.
    pub async fn graceful_shutdown(&self, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();

        let handles: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to complete"
        );

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!("shutdown timed out after {timeout:?}, aborting remaining tasks");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
