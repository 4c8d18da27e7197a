//! Anonymous device identities carried as signed bearer tokens.
//!
//! Tokens are HS256 JWTs whose subject is the player id, so any replica configured with the
//! same secret can verify them without shared state.

use std::time::Duration;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    get_current_timestamp,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    config::IdentitySettings, dto::identity::IdentityResponse, error::ServiceError,
    state::SharedState,
};

#[derive(Debug, Serialize, Deserialize)]
struct IdentityClaims {
    sub: Uuid,
    iat: u64,
    exp: u64,
}

/// Signs and verifies identity tokens.
pub struct IdentityIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl IdentityIssuer {
    /// Issuer keyed with the configured secret.
    pub fn new(settings: &IdentitySettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            ttl: settings.ttl,
        }
    }

    /// Token proving `player_id`, valid for the configured lifetime.
    pub fn sign(&self, player_id: Uuid) -> Result<String, ServiceError> {
        let now = get_current_timestamp();
        let claims = IdentityClaims {
            sub: player_id,
            iat: now,
            exp: now.saturating_add(self.ttl.as_secs()),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| ServiceError::Internal(format!("failed to sign identity: {err}")))
    }

    /// Identity behind `token`, if the signature holds and it has not expired.
    pub fn resolve(&self, token: &str) -> Option<Uuid> {
        match decode::<IdentityClaims>(token, &self.decoding, &self.validation) {
            Ok(data) => Some(data.claims.sub),
            Err(err) => {
                debug!(error = %err, "rejected identity token");
                None
            }
        }
    }

    /// Token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

fn response(state: &SharedState, player_id: Uuid) -> Result<IdentityResponse, ServiceError> {
    let issuer = state.identities();
    Ok(IdentityResponse {
        player_id,
        token: issuer.sign(player_id)?,
        expires_in: issuer.ttl().as_secs(),
    })
}

/// Issue an anonymous identity to a new device.
pub fn issue_identity(state: &SharedState) -> Result<IdentityResponse, ServiceError> {
    let player_id = Uuid::new_v4();
    let identity = response(state, player_id)?;
    info!(%player_id, "issued anonymous identity");
    Ok(identity)
}

/// Fresh token for an identity that still holds a valid one.
pub fn refresh_identity(
    state: &SharedState,
    player_id: Uuid,
) -> Result<IdentityResponse, ServiceError> {
    let identity = response(state, player_id)?;
    debug!(%player_id, "refreshed identity token");
    Ok(identity)
}

/// Resolve a bearer token presented by a client.
pub fn authenticate(state: &SharedState, token: &str) -> Result<Uuid, ServiceError> {
    state
        .identities()
        .resolve(token)
        .ok_or_else(|| ServiceError::Unauthorized("invalid or expired identity token".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer(secret: &str) -> IdentityIssuer {
        IdentityIssuer::new(&IdentitySettings {
            secret: secret.into(),
            ttl: Duration::from_secs(3600),
        })
    }

    #[test]
    fn signed_tokens_resolve_to_their_identity() {
        let issuer = issuer("shared-secret");
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let first_token = issuer.sign(first).unwrap();
        let second_token = issuer.sign(second).unwrap();

        assert_eq!(issuer.resolve(&first_token), Some(first));
        assert_eq!(issuer.resolve(&second_token), Some(second));
        assert_eq!(issuer.resolve("forged"), None);
    }

    #[test]
    fn any_issuer_with_the_same_secret_accepts_the_token() {
        let player = Uuid::new_v4();
        let token = issuer("shared-secret").sign(player).unwrap();

        assert_eq!(issuer("shared-secret").resolve(&token), Some(player));
        assert_eq!(issuer("other-secret").resolve(&token), None);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let issuer = issuer("shared-secret");
        let now = get_current_timestamp();
        let claims = IdentityClaims {
            sub: Uuid::new_v4(),
            iat: now - 120,
            exp: now - 60,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &issuer.encoding).unwrap();

        assert_eq!(issuer.resolve(&token), None);
    }
}
