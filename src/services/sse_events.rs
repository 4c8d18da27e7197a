use serde::Serialize;
use tracing::warn;

use crate::{
    dao::models::SessionEntity,
    dto::{
        session::SessionSnapshot,
        sse::{ServerEvent, SessionClosedEvent, SystemStatus},
    },
    state::{SharedState, SseHub},
};

pub(crate) const EVENT_SESSION_UPDATED: &str = "session.updated";
const EVENT_SESSION_CLOSED: &str = "session.closed";
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Push the latest stored snapshot of `session`'s code to its subscribers.
///
/// Publications of one session are serialized and each re-reads the session and its players
/// under that lock, so subscribers never see an older snapshot after a newer one even when the
/// writers that triggered them finish out of order.
pub async fn publish_session(state: &SharedState, session: &SessionEntity) {
    let code = session.code.as_str();
    let Some(hub) = state.hubs().active(code) else {
        return;
    };
    let store = match state.require_session_store().await {
        Ok(store) => store,
        Err(err) => {
            warn!(code, error = %err, "skipping snapshot publication");
            return;
        }
    };

    let _publishing = hub.publishing().await;
    let latest = match store.load_session(code).await {
        Ok(Some(current)) => current.value,
        // Gone; the closing event follows from the delete.
        Ok(None) => return,
        Err(err) => {
            warn!(code, error = %err, "failed to reload session for snapshot");
            return;
        }
    };
    let players = match store.list_players(code).await {
        Ok(players) => players,
        Err(err) => {
            warn!(code, error = %err, "failed to list players for snapshot");
            return;
        }
    };

    let snapshot = SessionSnapshot::build(&latest, &players);
    send_event(&hub, EVENT_SESSION_UPDATED, &snapshot);
}

/// Tell subscribers the session is gone and drop its hub.
pub fn publish_closed(state: &SharedState, code: &str) {
    if let Some(hub) = state.hubs().remove(code) {
        let payload = SessionClosedEvent {
            code: code.to_owned(),
        };
        send_event(&hub, EVENT_SESSION_CLOSED, &payload);
    }
}

/// Broadcast the degraded flag to every open stream.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    let payload = SystemStatus { degraded };
    for hub in state.hubs().all_active() {
        send_event(&hub, EVENT_SYSTEM_STATUS, &payload);
    }
}

fn send_event<T>(hub: &SseHub, event: &str, payload: &T)
where
    T: Serialize,
{
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(message) => hub.broadcast(message),
        Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
    }
}
