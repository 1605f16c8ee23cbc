// src/core/handler/client.rs

//! The reader port: one `<door>:<credential>` request per frame, one decision
//! per reply. A malformed request ends the connection.

use super::Flow;
use crate::connection::{Connection, ConnectionGuard, ConnectionHandle};
use crate::core::audit::AuditEvent;
use crate::core::metrics::{AUTHORIZATION_LATENCY_SECONDS, AUTHORIZATIONS_TOTAL};
use crate::core::protocol::ClientRequest;
use crate::core::state::ServerState;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives one reader connection until it closes.
pub async fn serve(mut conn: Connection, state: Arc<ServerState>) {
    let handle = conn.handle().clone();
    let _guard = ConnectionGuard::new(handle.clone());
    state.stats.increment_total_connections();

    loop {
        let frame = match conn.read_frame().await {
            Ok(frame) => frame,
            Err(e) if e.is_normal_disconnect() => {
                debug!("Reader {} disconnected", handle.peer());
                break;
            }
            Err(e) => {
                warn!("Reader {} dropped: {}", handle.peer(), e);
                break;
            }
        };
        state.stats.increment_total_frames();
        if handle_frame(&frame, &state, &handle).await == Flow::Close {
            break;
        }
    }
}

/// Answers one reader frame.
pub async fn handle_frame(frame: &str, state: &ServerState, handle: &ConnectionHandle) -> Flow {
    let request = match ClientRequest::parse(frame) {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed reader request from {}: {:?}", handle.peer(), frame);
            let _ = handle.write(e.to_string());
            return Flow::Close;
        }
    };

    let timer = AUTHORIZATION_LATENCY_SECONDS.start_timer();
    let auth = state
        .access
        .authorize(&request.door, &request.credential)
        .await;
    timer.observe_duration();

    AUTHORIZATIONS_TOTAL
        .with_label_values(&[auth.decision.label()])
        .inc();
    info!(
        door = %auth.door,
        user = auth.user.as_ref().map(|u| u.name.as_str()).unwrap_or("-"),
        decision = auth.decision.label(),
        "Reader request"
    );

    state
        .audit
        .record(AuditEvent::decision(&auth, &request.credential))
        .await;

    match handle.write(auth.decision.reply()) {
        Ok(()) => Flow::Continue,
        Err(_) => Flow::Close,
    }
}
