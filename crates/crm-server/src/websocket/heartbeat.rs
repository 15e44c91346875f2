//! Liveness: application-level `ping` → `pong`, and an optional idle
//! watchdog for sessions that stop sending anything.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::{ClientConnection, SendResult};
use super::protocol::OutboundEvent;

/// Answer a client `ping`.
pub fn answer_ping(connection: &ClientConnection) -> SendResult {
    connection.send_event(&OutboundEvent::pong())
}

/// Outcome of the idle watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogResult {
    /// No inbound traffic within the timeout window.
    TimedOut,
    /// The session ended first.
    Cancelled,
}

/// Watch a connection for inbound silence.
///
/// Every `interval` the time since the last inbound frame is compared with
/// `timeout`. Any frame (a `ping` included) resets the clock.
pub async fn run_idle_watchdog(
    connection: Arc<ClientConnection>,
    timeout: Duration,
    interval: Duration,
    cancel: CancellationToken,
) -> WatchdogResult {
    let mut check_interval = time::interval(interval);
    check_interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if connection.idle_for() >= timeout {
                    return WatchdogResult::TimedOut;
                }
            }
            () = cancel.cancelled() => {
                return WatchdogResult::Cancelled;
            }
        }
    }
}
