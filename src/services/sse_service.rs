use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    dto::{session::SessionSnapshot, sse::ServerEvent},
    error::ServiceError,
    services::{recovery, sse_events::EVENT_SESSION_UPDATED},
    state::SharedState,
};

/// Subscribe to the stream of `code` and capture the snapshot the client starts from.
///
/// The receiver is registered before the snapshot is read so no update can fall between them.
pub async fn subscribe_session(
    state: &SharedState,
    code: &str,
) -> Result<(broadcast::Receiver<ServerEvent>, ServerEvent), ServiceError> {
    let store = state.require_session_store().await?;
    let receiver = state.hubs().hub(code).subscribe();

    let Some(current) = store.load_session(code).await? else {
        state.hubs().remove(code);
        return Err(ServiceError::NotFound(format!("session `{code}` not found")));
    };
    // Anything released here is published to the receiver registered above.
    if let Err(err) = recovery::resume(state, &current.value).await {
        warn!(code, error = %err, "failed to resume session");
    }
    let players = store.list_players(code).await?;
    let snapshot = SessionSnapshot::build(&current.value, &players);
    let initial = ServerEvent::json(Some(EVENT_SESSION_UPDATED.to_string()), &snapshot)
        .map_err(|err| ServiceError::InvalidState(format!("unserializable snapshot: {err}")))?;

    Ok((receiver, initial))
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a broadcast receiver into an SSE response, starting with `initial` and
/// forwarding events until the client disconnects or the session closes.
pub fn to_sse_stream(
    state: SharedState,
    code: String,
    mut receiver: broadcast::Receiver<ServerEvent>,
    initial: ServerEvent,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if tx.send(Ok(to_event(initial))).await.is_ok() {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    recv_result = receiver.recv() => {
                        match recv_result {
                            Ok(payload) => {
                                if tx.send(Ok(to_event(payload))).await.is_err() {
                                    break;
                                }
                            }
                            Err(RecvError::Closed) => break,
                            // Snapshots are full state; the next one supersedes what was missed.
                            Err(RecvError::Lagged(_)) => continue,
                        }
                    }
                }
            }
        }
        drop(receiver);
        state.hubs().release_idle(&code);
        info!(%code, "session SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
