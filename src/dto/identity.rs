use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Anonymous identity issued to a device.
#[derive(Debug, Serialize, ToSchema)]
pub struct IdentityResponse {
    /// Stable player identity.
    pub player_id: Uuid,
    /// Bearer token to present on every intent.
    pub token: String,
    /// Seconds until the token expires; refresh it before then.
    pub expires_in: u64,
}
