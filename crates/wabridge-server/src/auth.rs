//! Bearer JWT authentication and per-route scope enforcement.
//!
//! Tokens are HS256 only; any other signing algorithm is rejected. Claims
//! must carry the configured audience and issuer, a non-empty subject and
//! runtime id, and issued-at/expiry stamps. The `scope` claim is a space or
//! comma separated list that must contain the route's scope or the
//! `whatsapp:*` wildcard.

use axum::extract::{Request, State};
use axum::http::{header, Method};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::api::AppState;
use crate::error::ApiError;

pub const WILDCARD_SCOPE: &str = "whatsapp:*";

#[derive(Clone)]
pub struct AuthConfig {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthConfig {
    pub fn new(secret: &str, audience: &str, issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience]);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "aud", "iss"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BridgeClaims {
    #[serde(default)]
    scope: String,
    #[serde(default)]
    runtime_id: String,
    #[serde(default)]
    sub: String,
    iat: Option<i64>,
    exp: Option<i64>,
}

/// The scope a route demands. Every served route must have an entry here;
/// a guarded request whose method+path pair is missing from the table is
/// refused outright.
fn required_scope(method: &Method, path: &str) -> Option<&'static str> {
    match (method, path) {
        (&Method::POST, "/api/send") => Some("whatsapp:send"),
        (&Method::POST, "/api/download") => Some("whatsapp:download"),
        (&Method::POST, "/api/connect") => Some("whatsapp:connect"),
        (&Method::GET, "/api/auth/status") => Some("whatsapp:status"),
        (&Method::POST, "/api/disconnect") => Some("whatsapp:disconnect"),
        (&Method::POST, "/api/disconnect/revoke") => Some("whatsapp:disconnect"),
        _ => None,
    }
}

fn has_required_scope(claim_scope: &str, required: &str) -> bool {
    if required.is_empty() {
        return false;
    }
    claim_scope
        .split([' ', ','])
        .filter(|scope| !scope.is_empty())
        .any(|scope| scope == required || scope == WILDCARD_SCOPE)
}

fn authorize(auth: &AuthConfig, request: &Request) -> Result<(), ApiError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or("");
    let token = header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::Unauthorized)?;

    let required =
        required_scope(request.method(), request.uri().path()).ok_or(ApiError::Forbidden)?;

    let token_data = decode::<BridgeClaims>(token, &auth.decoding_key, &auth.validation)
        .map_err(|_| ApiError::Unauthorized)?;
    let claims = token_data.claims;

    if claims.exp.is_none() || claims.iat.is_none() || claims.sub.trim().is_empty() {
        return Err(ApiError::Unauthorized);
    }
    if claims.runtime_id.trim().is_empty() {
        return Err(ApiError::Unauthorized);
    }
    if !has_required_scope(&claims.scope, required) {
        return Err(ApiError::Forbidden);
    }

    Ok(())
}

/// Middleware guarding every control-plane route.
pub async fn require_bridge_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&state.auth, &request)?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_list_accepts_space_and_comma_separators() {
        assert!(has_required_scope("whatsapp:send whatsapp:status", "whatsapp:send"));
        assert!(has_required_scope("whatsapp:status,whatsapp:send", "whatsapp:send"));
        assert!(!has_required_scope("whatsapp:status", "whatsapp:send"));
    }

    #[test]
    fn wildcard_scope_matches_everything() {
        assert!(has_required_scope("whatsapp:*", "whatsapp:send"));
        assert!(has_required_scope("whatsapp:*", "whatsapp:disconnect"));
    }

    #[test]
    fn empty_required_scope_never_matches() {
        assert!(!has_required_scope("whatsapp:send", ""));
    }

    #[test]
    fn route_scope_table_covers_every_route() {
        assert_eq!(
            required_scope(&Method::POST, "/api/send"),
            Some("whatsapp:send")
        );
        assert_eq!(
            required_scope(&Method::POST, "/api/disconnect/revoke"),
            Some("whatsapp:disconnect")
        );
        assert_eq!(required_scope(&Method::GET, "/api/send"), None);
        assert_eq!(required_scope(&Method::POST, "/api/unknown"), None);
    }
}
