use serde::Serialize;
use utoipa::ToSchema;

/// Coarse service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Session store connected and answering.
    Ok,
    /// No usable session store; store-backed routes answer 503.
    Degraded,
}

/// Body of `GET /healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: HealthStatus,
    /// Sessions with at least one connected event stream.
    pub live_sessions: usize,
}
