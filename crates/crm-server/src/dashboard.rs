//! Dashboard pushes.
//!
//! Snapshot computation lives outside the hub behind [`SnapshotSource`]; the
//! producer only asks for each board on a timer and hands the result to the
//! registry's broadcast.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::RealtimeError;
use crate::metrics::DASHBOARD_PUSHES_TOTAL;
use crate::websocket::protocol::OutboundEvent;
use crate::websocket::registry::ConnectionRegistry;

/// A dashboard screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DashboardBoard {
    /// `screen.v1`: headline totals.
    Overview,
    /// `screen.v2`: performance breakdown.
    Performance,
    /// `screen.ranking`: leaderboard.
    Ranking,
}

impl DashboardBoard {
    /// Every board, in push order.
    pub const ALL: [Self; 3] = [Self::Overview, Self::Performance, Self::Ranking];

    /// Inbound request type.
    pub fn init_type(self) -> &'static str {
        match self {
            Self::Overview => "screen.v1.init",
            Self::Performance => "screen.v2.init",
            Self::Ranking => "screen.ranking.init",
        }
    }

    /// Outbound snapshot type.
    pub fn update_type(self) -> &'static str {
        match self {
            Self::Overview => "screen.v1.update",
            Self::Performance => "screen.v2.update",
            Self::Ranking => "screen.ranking.update",
        }
    }

    /// Board requested by an inbound frame type.
    pub fn from_init_type(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.init_type() == kind)
    }

    /// Snapshot event for this board.
    pub fn update_event(self, snapshot: Value) -> OutboundEvent {
        OutboundEvent::new(self.update_type(), snapshot)
    }
}

/// Opaque producer of dashboard payloads.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Current payload for `board`.
    async fn snapshot(&self, board: DashboardBoard) -> Result<Value, RealtimeError>;
}

/// Periodically broadcasts every board to every live session.
pub struct DashboardPushProducer {
    registry: Arc<ConnectionRegistry>,
    source: Arc<dyn SnapshotSource>,
    interval: Duration,
}

impl DashboardPushProducer {
    /// Create a producer pushing every `interval`.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        source: Arc<dyn SnapshotSource>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            source,
            interval,
        }
    }

    /// Push each board once. Returns how many boards were broadcast.
    pub async fn push_once(&self) -> usize {
        if self.registry.connection_count() == 0 {
            return 0;
        }
        let mut pushed = 0;
        for board in DashboardBoard::ALL {
            match self.source.snapshot(board).await {
                Ok(snapshot) => {
                    let report = self
                        .registry
                        .broadcast_all(&board.update_event(snapshot), None)
                        .await;
                    counter!(DASHBOARD_PUSHES_TOTAL, "board" => board.update_type()).increment(1);
                    debug!(board = board.update_type(), delivered = report.delivered, "dashboard pushed");
                    pushed += 1;
                }
                Err(e) => {
                    warn!(board = board.update_type(), error = %e, "snapshot failed, skipping board");
                }
            }
        }
        pushed
    }

    /// Push on every tick until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let _ = ticker.tick().await;
        info!(interval_secs = self.interval.as_secs(), "dashboard push producer started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.push_once().await;
                }
                () = cancel.cancelled() => {
                    info!("dashboard push producer stopped");
                    return;
                }
            }
        }
    }
}
