//! Inbound frame dispatch.

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::connection::ClientConnection;
use super::heartbeat::answer_ping;
use super::protocol::InboundFrame;
use crate::context::RealtimeContext;
use crate::errors::RealtimeError;
use crate::im::pipeline::SubmitOutcome;

/// What the session loop should do after a frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// Keep reading.
    Continue,
    /// Close the session.
    Fatal(RealtimeError),
}

/// Handle one inbound text frame for `connection`.
///
/// Malformed and unknown frames are logged and ignored; only a fatal
/// pipeline error ends the session.
pub async fn handle_frame(
    text: &str,
    connection: &Arc<ClientConnection>,
    ctx: &RealtimeContext,
) -> FrameOutcome {
    let frame = match InboundFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "ignoring unparseable frame");
            return FrameOutcome::Continue;
        }
    };

    match frame {
        InboundFrame::Ping => {
            let _ = answer_ping(connection);
        }
        InboundFrame::ImMessage(payload) => match ctx.pipeline.submit(connection, payload).await {
            Ok(SubmitOutcome::Acknowledged { .. } | SubmitOutcome::ConversationMissing) => {}
            Err(e) if e.is_fatal() => {
                error!(error = %e, category = e.category(), "message pipeline failed");
                return FrameOutcome::Fatal(e);
            }
            Err(e) => debug!(error = %e, "message dropped"),
        },
        InboundFrame::DashboardInit(board) => match ctx.snapshots.snapshot(board).await {
            Ok(snapshot) => {
                let _ = connection.send_event(&board.update_event(snapshot));
            }
            Err(e) => warn!(board = board.update_type(), error = %e, "snapshot request failed"),
        },
        InboundFrame::Unknown(kind) => debug!(kind, "ignoring unknown frame type"),
    }
    FrameOutcome::Continue
}
