//! REST API module: handlers per resource plus shared response and
//! idempotency plumbing.

mod members;
mod rsvps;
mod trips;

pub use members::*;
pub use rsvps::*;
pub use trips::*;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;

use crate::domain::Member;
use crate::errors::{ApiError, AppError};
use crate::idempotency::{self, Fingerprint, Precheck};
use crate::AppState;

/// Handler return type: a ready response or an error carrying request-id
/// context.
pub type ApiResult = Result<Response, ApiError>;

/// Request id propagated by the request-id layers; surfaced in error
/// envelopes.
#[derive(Debug, Clone, Default)]
pub struct ReqId(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for ReqId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(ReqId(id))
    }
}

/// Build a JSON response with the given status.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    (status, Json(body)).into_response()
}

/// Attach request-id context to a service error.
pub fn fail(error: AppError, rid: &ReqId) -> ApiError {
    ApiError {
        error,
        request_id: rid.0.clone(),
    }
}

/// The authenticated → provisioned gate used by everything except the
/// provisioning and own-profile endpoints. An unprovisioned caller gets 401.
pub async fn require_member(state: &AppState, subject: &str) -> Result<Member, AppError> {
    match state.members.get_my_profile(subject).await {
        Ok(m) => Ok(m),
        Err(AppError::MemberNotProvisioned) => Err(AppError::CallerNotProvisioned),
        Err(e) => Err(e),
    }
}

pub fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Run a mutating use case under the idempotency protocol.
///
/// Without a key the use case executes directly. With one, a stored
/// response for the same fingerprint is replayed verbatim, a reused key
/// with a different canonical body is rejected, and a fresh execution has
/// its successful response recorded for later replay.
pub async fn with_idempotency<B, T, Fut>(
    state: &AppState,
    rid: &ReqId,
    key: Option<String>,
    subject: &str,
    method: &str,
    route: &str,
    canonical_body: &B,
    success_status: StatusCode,
    run: Fut,
) -> ApiResult
where
    B: Serialize,
    T: Serialize,
    Fut: Future<Output = Result<T, AppError>>,
{
    let Some(key) = key else {
        let out = run.await.map_err(|e| fail(e, rid))?;
        return Ok(json_response(success_status, &out));
    };

    let body_hash = idempotency::canonical_body_hash(canonical_body).map_err(|e| fail(e, rid))?;
    let fp = Fingerprint::new(&key, subject, method, route, &body_hash);

    match idempotency::precheck(state.idempotency.as_ref(), &fp)
        .await
        .map_err(|e| fail(e, rid))?
    {
        Precheck::Replay(record) => Ok(idempotency::replay_response(record)),
        Precheck::Execute => {
            let out = run.await.map_err(|e| fail(e, rid))?;
            let body = serde_json::to_vec(&out)
                .map_err(|e| fail(AppError::Internal(format!("serialize response: {e}")), rid))?;
            if let Err(err) = idempotency::record_response(
                state.idempotency.as_ref(),
                &fp,
                success_status,
                body.clone(),
            )
            .await
            {
                // The mutation already happened; a failed replay record must
                // not fail the request.
                tracing::warn!(error = %err, route, "failed to record idempotent response");
            }
            let mut response = Response::new(axum::body::Body::from(body));
            *response.status_mut() = success_status;
            response.headers_mut().insert(
                axum::http::header::CONTENT_TYPE,
                axum::http::HeaderValue::from_static("application/json"),
            );
            Ok(response)
        }
    }
}
