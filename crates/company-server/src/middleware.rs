//! Bearer token authentication for mutating routes.

use axum::{
    body::Body,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::ApiError;
use crate::AppState;

/// Issuer and audience every accepted token must carry.
pub const TOKEN_ISSUER: &str = "api.companyservice.io";

/// Subject of an authenticated request, stored in request extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedSubject(pub String);

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// Checks HMAC-signed bearer tokens.
#[derive(Clone)]
pub struct JwtVerifier {
    // `None` when no secret is configured; every token is refused.
    key: Option<DecodingKey>,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_audience(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.validate_nbf = true;

        let key = if secret.is_empty() {
            tracing::warn!("no JWT secret configured, protected routes will refuse every request");
            None
        } else {
            Some(DecodingKey::from_secret(secret.as_bytes()))
        };
        Self { key, validation }
    }

    /// Returns the token's subject if the token is valid.
    pub fn verify(&self, token: &str) -> Option<String> {
        let key = self.key.as_ref()?;
        match decode::<Claims>(token, key, &self.validation) {
            Ok(data) => Some(data.claims.sub),
            Err(e) => {
                tracing::debug!(error = %e, "rejected bearer token");
                None
            }
        }
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("enabled", &self.key.is_some())
            .finish_non_exhaustive()
    }
}

/// Middleware that requires `Authorization: Bearer <jwt>`.
///
/// On success the token subject is inserted as [`AuthenticatedSubject`].
/// Every failure answers 401 with the same body, so callers cannot tell a
/// bad signature from an expired token.
pub async fn auth_middleware(mut req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or_else(|| ApiError::InternalServerError("app state missing".to_string()))?
        .clone();

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized)?;

    let subject = state.jwt.verify(token).ok_or(ApiError::Unauthorized)?;
    req.extensions_mut().insert(AuthenticatedSubject(subject));

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    Ok(response)
}
