use utoipa::OpenApi;

/// Aggregated OpenAPI document for the CineScore backend, served by Swagger UI and exported by
/// `openapi-generator`.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::identity::create_identity,
        crate::routes::identity::refresh_identity,
        crate::routes::catalog::list_categories,
        crate::routes::session::create_session,
        crate::routes::session::get_session,
        crate::routes::session::delete_session,
        crate::routes::session::join_session,
        crate::routes::session::start_game,
        crate::routes::session::buzz,
        crate::routes::session::submit_answer,
        crate::routes::session::vote_skip,
        crate::routes::session::host_skip,
        crate::routes::session::advance,
        crate::routes::session::reset,
        crate::routes::sse::session_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::identity::IdentityResponse,
            crate::dto::session::CreateSessionResponse,
            crate::dto::session::JoinRequest,
            crate::dto::session::StartRequest,
            crate::dto::session::AnswerRequest,
            crate::dto::session::BuzzRejection,
            crate::dto::session::BuzzResponse,
            crate::dto::session::AnswerResponse,
            crate::dto::session::SkipVoteResponse,
            crate::dto::session::CategorySummary,
            crate::dto::session::SessionSnapshot,
            crate::dto::session::PlayerSummary,
            crate::dto::session::CurrentItemView,
            crate::dto::session::ClaimView,
            crate::dto::session::VerdictView,
            crate::dto::session::RoundOutcomeView,
            crate::dto::session::WinnerView,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::SessionClosedEvent,
            crate::dao::models::SessionStatus,
            crate::dao::models::RoundEnd,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "identity", description = "Anonymous device identities"),
        (name = "catalog", description = "Trivia categories"),
        (name = "session", description = "Session lifecycle"),
        (name = "play", description = "Player intents during a round"),
        (name = "host", description = "Host-only overrides"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
