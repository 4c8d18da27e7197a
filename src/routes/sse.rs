use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sessions/{code}/events",
    tag = "sse",
    params(("code" = String, Path, description = "Session join code")),
    responses(
        (status = 200, description = "Session snapshots, starting with the current one", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown session")
    )
)]
/// Stream session snapshots to a host or player device.
pub async fn session_stream(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (receiver, initial) = sse_service::subscribe_session(&state, &code).await?;
    info!(%code, "new session SSE connection");
    Ok(sse_service::to_sse_stream(state, code, receiver, initial))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{code}/events", get(session_stream))
}
