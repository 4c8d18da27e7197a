use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts},
    routing::post,
};
use uuid::Uuid;

use crate::{
    dto::identity::IdentityResponse,
    error::AppError,
    services::identity::{self, issue_identity},
    state::SharedState,
};

const BEARER_PREFIX: &str = "Bearer ";

/// Identity endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/identity", post(create_identity))
        .route("/identity/refresh", post(refresh_identity))
}

/// Issue an anonymous identity to a device.
#[utoipa::path(
    post,
    path = "/identity",
    tag = "identity",
    responses(
        (status = 200, description = "Identity issued", body = IdentityResponse)
    )
)]
pub async fn create_identity(
    State(state): State<SharedState>,
) -> Result<Json<IdentityResponse>, AppError> {
    Ok(Json(issue_identity(&state)?))
}

/// Trade a still-valid token for a fresh one carrying the same identity.
#[utoipa::path(
    post,
    path = "/identity/refresh",
    tag = "identity",
    responses(
        (status = 200, description = "Token renewed", body = IdentityResponse),
        (status = 401, description = "Missing, forged or expired token")
    )
)]
pub async fn refresh_identity(
    State(state): State<SharedState>,
    Caller(player_id): Caller,
) -> Result<Json<IdentityResponse>, AppError> {
    Ok(Json(identity::refresh_identity(&state, player_id)?))
}

/// Player identity resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Uuid);

impl FromRequestParts<SharedState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::unauthorized("missing `Authorization: Bearer <token>` header"))?;

        let player_id = identity::authenticate(state, token)?;
        Ok(Caller(player_id))
    }
}
