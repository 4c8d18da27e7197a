use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::session::{
        AnswerRequest, AnswerResponse, BuzzResponse, CreateSessionResponse, JoinRequest,
        SessionSnapshot, SkipVoteResponse, StartRequest,
    },
    error::AppError,
    routes::identity::Caller,
    services::{
        arbitration::{self, ClaimOutcome},
        round_director::{self, AdvanceTrigger},
        session_service,
    },
    state::SharedState,
};

/// Session lifecycle and in-game intents.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{code}", get(get_session).delete(delete_session))
        .route("/sessions/{code}/join", post(join_session))
        .route("/sessions/{code}/start", post(start_game))
        .route("/sessions/{code}/buzz", post(buzz))
        .route("/sessions/{code}/answer", post(submit_answer))
        .route("/sessions/{code}/skip-vote", post(vote_skip))
        .route("/sessions/{code}/skip", post(host_skip))
        .route("/sessions/{code}/advance", post(advance))
        .route("/sessions/{code}/reset", post(reset))
}

/// Open a new session hosted by the caller.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "session",
    params(("Authorization" = String, Header, description = "Bearer token from /identity")),
    responses(
        (status = 200, description = "Session created", body = CreateSessionResponse),
        (status = 401, description = "Unknown identity")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Caller(host): Caller,
) -> Result<Json<CreateSessionResponse>, AppError> {
    let code = session_service::create_session(&state, host).await?;
    Ok(Json(CreateSessionResponse { code }))
}

/// Current snapshot of a session and its leaderboard.
#[utoipa::path(
    get,
    path = "/sessions/{code}",
    tag = "session",
    params(("code" = String, Path, description = "Session join code")),
    responses(
        (status = 200, description = "Session snapshot", body = SessionSnapshot),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session_service::get_snapshot(&state, &code).await?))
}

/// Abandon a session (host only).
#[utoipa::path(
    delete,
    path = "/sessions/{code}",
    tag = "session",
    params(
        ("code" = String, Path, description = "Session join code"),
        ("Authorization" = String, Header, description = "Bearer token from /identity")
    ),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 403, description = "Caller is not the host")
    )
)]
pub async fn delete_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Caller(caller): Caller,
) -> Result<StatusCode, AppError> {
    session_service::delete_session(&state, &code, caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Join a session, or update the caller's name and avatar.
#[utoipa::path(
    post,
    path = "/sessions/{code}/join",
    tag = "session",
    request_body = JoinRequest,
    params(
        ("code" = String, Path, description = "Session join code"),
        ("Authorization" = String, Header, description = "Bearer token from /identity")
    ),
    responses(
        (status = 200, description = "Joined", body = SessionSnapshot),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Caller(player_id): Caller,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let snapshot = session_service::join_session(
        &state,
        &code,
        player_id,
        payload.display_name,
        payload.avatar_image,
    )
    .await?;
    Ok(Json(snapshot))
}

/// Start a game from the lobby (host only).
#[utoipa::path(
    post,
    path = "/sessions/{code}/start",
    tag = "session",
    request_body = StartRequest,
    params(
        ("code" = String, Path, description = "Session join code"),
        ("Authorization" = String, Header, description = "Bearer token from /identity")
    ),
    responses(
        (status = 200, description = "Round 1 started", body = SessionSnapshot),
        (status = 409, description = "Not in the lobby, category exhausted or no playable media")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Caller(caller): Caller,
    Valid(Json(payload)): Valid<Json<StartRequest>>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = round_director::start_game(
        &state,
        &code,
        caller,
        payload.category,
        payload.total_rounds,
    )
    .await?;
    Ok(Json(session_service::snapshot_of(&state, &session).await?))
}

/// Try to claim the right to answer.
#[utoipa::path(
    post,
    path = "/sessions/{code}/buzz",
    tag = "play",
    params(
        ("code" = String, Path, description = "Session join code"),
        ("Authorization" = String, Header, description = "Bearer token from /identity")
    ),
    responses(
        (status = 200, description = "Whether the buzz won the claim", body = BuzzResponse)
    )
)]
pub async fn buzz(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Caller(player_id): Caller,
) -> Result<Json<BuzzResponse>, AppError> {
    let response = match arbitration::attempt_claim(&state, &code, player_id).await? {
        ClaimOutcome::Accepted { .. } => BuzzResponse {
            accepted: true,
            reason: None,
        },
        ClaimOutcome::Rejected(reason) => BuzzResponse {
            accepted: false,
            reason: Some(reason),
        },
    };
    Ok(Json(response))
}

/// Submit the claimant's guess; the verdict is pushed over SSE.
#[utoipa::path(
    post,
    path = "/sessions/{code}/answer",
    tag = "play",
    request_body = AnswerRequest,
    params(
        ("code" = String, Path, description = "Session join code"),
        ("Authorization" = String, Header, description = "Bearer token from /identity")
    ),
    responses(
        (status = 202, description = "Guess stored", body = AnswerResponse),
        (status = 403, description = "Caller does not hold the claim")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Caller(player_id): Caller,
    Valid(Json(payload)): Valid<Json<AnswerRequest>>,
) -> Result<(StatusCode, Json<AnswerResponse>), AppError> {
    let accepted = arbitration::submit_answer(&state, &code, player_id, payload.text).await?;
    Ok((StatusCode::ACCEPTED, Json(AnswerResponse { accepted })))
}

/// Vote to abandon the current round.
#[utoipa::path(
    post,
    path = "/sessions/{code}/skip-vote",
    tag = "play",
    params(
        ("code" = String, Path, description = "Session join code"),
        ("Authorization" = String, Header, description = "Bearer token from /identity")
    ),
    responses(
        (status = 200, description = "Vote tally", body = SkipVoteResponse)
    )
)]
pub async fn vote_skip(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Caller(player_id): Caller,
) -> Result<Json<SkipVoteResponse>, AppError> {
    Ok(Json(arbitration::vote_skip(&state, &code, player_id).await?))
}

/// Reveal the answer with nobody credited (host only).
#[utoipa::path(
    post,
    path = "/sessions/{code}/skip",
    tag = "host",
    params(
        ("code" = String, Path, description = "Session join code"),
        ("Authorization" = String, Header, description = "Bearer token from /identity")
    ),
    responses(
        (status = 200, description = "Round revealed", body = SessionSnapshot)
    )
)]
pub async fn host_skip(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Caller(caller): Caller,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = round_director::host_skip(&state, &code, caller).await?;
    Ok(Json(session_service::snapshot_of(&state, &session).await?))
}

/// Leave the reveal screen now instead of waiting for the auto-advance.
#[utoipa::path(
    post,
    path = "/sessions/{code}/advance",
    tag = "play",
    params(
        ("code" = String, Path, description = "Session join code"),
        ("Authorization" = String, Header, description = "Bearer token from /identity")
    ),
    responses(
        (status = 200, description = "Next round or game over", body = SessionSnapshot)
    )
)]
pub async fn advance(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Caller(caller): Caller,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = round_director::advance(&state, &code, AdvanceTrigger::Caller(caller)).await?;
    Ok(Json(session_service::snapshot_of(&state, &session).await?))
}

/// Return to the lobby (host only).
#[utoipa::path(
    post,
    path = "/sessions/{code}/reset",
    tag = "host",
    params(
        ("code" = String, Path, description = "Session join code"),
        ("Authorization" = String, Header, description = "Bearer token from /identity")
    ),
    responses(
        (status = 200, description = "Back in the lobby", body = SessionSnapshot)
    )
)]
pub async fn reset(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Caller(caller): Caller,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = round_director::reset(&state, &code, caller).await?;
    Ok(Json(session_service::snapshot_of(&state, &session).await?))
}
