//! WebSocket session lifecycle, from upgrade through teardown.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use crm_core::chat::SenderProfile;
use crm_core::ids::UserId;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::connection::{ClientConnection, Outbound};
use super::handler::{FrameOutcome, handle_frame};
use super::heartbeat::{WatchdogResult, run_idle_watchdog};
use crate::context::RealtimeContext;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// How long teardown waits for queued frames to flush.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Run one authenticated session.
///
/// 1. Captures the sender profile
/// 2. Admits the connection and announces `online`, kicking any previous
///    session for the user
/// 3. Dispatches inbound frames until the client leaves or the handle is closed
/// 4. Releases the binding, announcing `offline` if no newer session took over
#[instrument(skip_all, fields(user_id = %user_id, conn_id))]
pub async fn run_ws_session(ws: WebSocket, user_id: UserId, ctx: Arc<RealtimeContext>) {
    ctx.session_opened();
    let (mut ws_tx, mut ws_rx) = ws.split();

    let profile = match ctx.profiles.profile(&user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            warn!("no profile for user, using empty sender metadata");
            SenderProfile::default()
        }
        Err(e) => {
            warn!(error = %e, "profile lookup failed, using empty sender metadata");
            SenderProfile::default()
        }
    };

    let (send_tx, mut send_rx) = mpsc::channel::<Outbound>(ctx.config.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(user_id.clone(), profile, send_tx));
    let _ = tracing::Span::current().record("conn_id", tracing::field::display(&connection.id));

    let admission = ctx.admission.admit(connection.clone()).await;
    info!(superseded = ?admission.superseded, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let writer = tokio::spawn(async move {
        while let Some(outbound) = send_rx.recv().await {
            match outbound {
                Outbound::Text(text) => {
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    let watchdog = ctx.config.idle_timeout.map(|timeout| {
        let conn = connection.clone();
        let interval = ctx.config.idle_check_interval.min(timeout);
        tokio::spawn(async move {
            if run_idle_watchdog(conn.clone(), timeout, interval, conn.cancellation()).await
                == WatchdogResult::TimedOut
            {
                info!(idle_secs = conn.idle_for().as_secs(), "closing idle session");
                let _ = conn.close(close_code::AWAY, "idle_timeout");
            }
        })
    });

    let cancel = connection.cancellation();
    loop {
        let msg = tokio::select! {
            () = cancel.cancelled() => {
                debug!("session closed by server");
                break;
            }
            msg = ws_rx.next() => msg,
        };

        let text = match msg {
            Some(Ok(Message::Text(t))) => t.to_string(),
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => {
                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                    continue;
                }
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                connection.mark_activity();
                continue;
            }
            Some(Ok(Message::Close(_))) => {
                info!("client sent close frame");
                break;
            }
            Some(Err(e)) => {
                debug!(error = %e, "websocket read failed");
                break;
            }
            None => break,
        };

        connection.mark_activity();
        if let FrameOutcome::Fatal(e) = handle_frame(&text, &connection, &ctx).await {
            let _ = connection.close(close_code::ERROR, e.category());
            break;
        }
    }

    // Teardown
    let _ = connection.close(close_code::NORMAL, "");
    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }
    let release = ctx.admission.release(&connection).await;
    let abort = writer.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        abort.abort();
    }

    info!(
        was_bound = release.was_bound,
        announced_offline = release.announced_offline,
        dropped = connection.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    ctx.session_closed();
}
