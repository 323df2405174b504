//! Bearer token verification for the aggregate endpoints.
//!
//! Tokens are issued by the user service; the gateway only checks the
//! signature and reads the identity claims. Proxied routes never look at
//! the token, they forward it as-is.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::http::error::GatewayError;

/// Identity carried by a gateway token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub email: String,
    pub username: String,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
}

/// Verifies a raw token and yields the caller's identity.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Claims, GatewayError>;
}

/// HS256 verifier sharing its secret with the user service.
pub struct JwtVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Sign `claims` with the shared secret.
    pub fn sign(&self, claims: &Claims) -> Result<String, GatewayError> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| GatewayError::Internal(format!("failed to sign token: {}", e)))
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Claims, GatewayError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                GatewayError::Forbidden("Invalid token".to_string())
            })
    }
}

/// Shared verifier handle stored in router state.
pub type SharedVerifier = Arc<dyn TokenVerifier>;

/// Extractor for an authenticated caller.
///
/// Missing or non-bearer `Authorization` → 401; bad token → 403.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Claims);

impl<S> FromRequestParts<S> for Authenticated
where
    SharedVerifier: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| GatewayError::Unauthorized("Token not provided".to_string()))?;

        let verifier = SharedVerifier::from_ref(state);
        verifier.verify(token).map(Authenticated)
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp: u64) -> Claims {
        Claims {
            id: "u1".into(),
            email: "ana@example.com".into(),
            username: "ana".into(),
            exp,
        }
    }

    fn far_future() -> u64 {
        (chrono::Utc::now().timestamp() + 3600) as u64
    }

    #[test]
    fn test_round_trip_with_shared_secret() {
        let verifier = JwtVerifier::new("secret");
        let token = verifier.sign(&claims(far_future())).unwrap();
        assert_eq!(verifier.verify(&token).unwrap().username, "ana");
    }

    #[test]
    fn test_wrong_secret_and_expired_are_forbidden() {
        let token = JwtVerifier::new("other").sign(&claims(far_future())).unwrap();
        let verifier = JwtVerifier::new("secret");
        assert!(matches!(verifier.verify(&token), Err(GatewayError::Forbidden(_))));

        let expired = verifier.sign(&claims(1_000)).unwrap();
        assert!(matches!(verifier.verify(&expired), Err(GatewayError::Forbidden(_))));
        assert!(matches!(verifier.verify("garbage"), Err(GatewayError::Forbidden(_))));
    }

    #[test]
    fn test_bearer_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
