use anyhow::Result;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, version4::V4, Local};
use tracing::debug;
use uuid::Uuid;

use crate::http::AppError;
use crate::AppState;

pub const TOKEN_ISSUER: &str = "agora";
pub const TOKEN_AUDIENCE: &str = "agora";

/// Caller identified by a valid access token. Wrap in `Option` for routes
/// that also serve anonymous viewers.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::unauthorized("invalid Authorization header"))?;

        let user_id = verify_access_token(token, &state.paseto_access_key)
            .map_err(|_| AppError::internal("failed to authenticate"))?
            .ok_or_else(|| AppError::unauthorized("invalid token"))?;

        Ok(AuthUser { user_id })
    }
}

/// Decrypts a v4.local access token and returns its subject. `Ok(None)` for
/// any token that is malformed, expired, or not an access token for this
/// service.
pub fn verify_access_token(token: &str, key_bytes: &[u8; 32]) -> Result<Option<Uuid>> {
    let key = SymmetricKey::<V4>::from(key_bytes)?;
    let mut rules = ClaimsValidationRules::new();
    rules.validate_issuer_with(TOKEN_ISSUER);
    rules.validate_audience_with(TOKEN_AUDIENCE);

    let untrusted = match UntrustedToken::<Local, V4>::try_from(token) {
        Ok(token) => token,
        Err(_) => return Ok(None),
    };
    let trusted = match local::decrypt(&key, &untrusted, &rules, None, None) {
        Ok(token) => token,
        Err(err) => {
            debug!(error = ?err, "rejected access token");
            return Ok(None);
        }
    };

    let claims = match trusted.payload_claims() {
        Some(claims) => claims,
        None => return Ok(None),
    };
    if !has_token_type(claims, "access") {
        return Ok(None);
    }
    Ok(claim_uuid(claims, "sub"))
}

fn claim_uuid(claims: &Claims, name: &str) -> Option<Uuid> {
    claims
        .get_claim(name)
        .and_then(|value| value.as_str())
        .and_then(|value| Uuid::parse_str(value).ok())
}

fn has_token_type(claims: &Claims, expected: &str) -> bool {
    claims
        .get_claim("typ")
        .and_then(|value| value.as_str())
        .map(|value| value == expected)
        .unwrap_or(false)
}
