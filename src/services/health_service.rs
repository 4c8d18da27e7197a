use tracing::warn;

use crate::{
    dto::health::{HealthResponse, HealthStatus},
    state::SharedState,
};

/// Report `ok` or `degraded`, probing the session store on the way.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let live_sessions = state.hubs().all_active().len();
    let status = match state.require_session_store().await {
        Ok(store) => match store.health_check().await {
            Ok(()) if !state.is_degraded() => HealthStatus::Ok,
            Ok(()) => HealthStatus::Degraded,
            Err(err) => {
                warn!(error = %err, "session store health check failed");
                HealthStatus::Degraded
            }
        },
        Err(_) => HealthStatus::Degraded,
    };

    HealthResponse {
        status,
        live_sessions,
    }
}
