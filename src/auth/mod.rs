//! Bearer authentication middleware.
//!
//! Verifies `Authorization: Bearer <jwt>` (or the dev-mode subject header)
//! and stores the authenticated subject in request extensions for handlers
//! to pick up. The health endpoint stays unauthenticated by being routed
//! outside the middleware.

pub mod jwt;

use std::sync::Arc;

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::errors::{ApiError, AppError};

pub use jwt::JwtVerifier;

/// Header consulted in dev auth mode.
pub const DEBUG_SUBJECT_HEADER: &str = "x-debug-subject";

/// The authenticated subject, inserted into request extensions on success.
#[derive(Debug, Clone)]
pub struct AuthSubject(pub String);

/// How incoming requests are authenticated.
pub enum Authenticator {
    /// Verify RS256 JWTs against a JWKS endpoint.
    Jwt(JwtVerifier),
    /// Local/dev shim: subject comes from `X-Debug-Subject`, falling back to
    /// a configured default. Not for production deployments.
    Dev { default_subject: Option<String> },
}

pub async fn subject_layer(
    auth: Arc<Authenticator>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let subject = match auth.as_ref() {
        Authenticator::Dev { default_subject } => {
            let from_header = request
                .headers()
                .get(DEBUG_SUBJECT_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            match from_header.or_else(|| default_subject.clone()) {
                Some(s) => s,
                None => {
                    return unauthorized(
                        "missing subject (set X-Debug-Subject)",
                        request_id,
                    )
                }
            }
        }
        Authenticator::Jwt(verifier) => {
            let Some(authz) = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
            else {
                return unauthorized("missing Authorization header", request_id);
            };
            let Some(raw) = authz.strip_prefix("Bearer ") else {
                return unauthorized("malformed Authorization header", request_id);
            };
            let raw = raw.trim();
            if raw.is_empty() {
                return unauthorized("missing bearer token", request_id);
            }
            match verifier.verify(raw).await {
                Ok(subject) => subject,
                Err(_) => return unauthorized("invalid token", request_id),
            }
        }
    };

    request.extensions_mut().insert(AuthSubject(subject));
    next.run(request).await
}

fn unauthorized(message: &str, request_id: Option<String>) -> Response {
    ApiError {
        error: AppError::Unauthorized(message.to_string()),
        request_id,
    }
    .into_response()
}
