//! RSVP API endpoints.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use super::{fail, idempotency_key, json_response, require_member, ApiResult, ReqId};
use crate::auth::AuthSubject;
use crate::domain::{Rsvp, RsvpResponse, RsvpSummary, TripId};
use crate::errors::AppError;
use crate::idempotency::TripScoped;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RsvpEnvelope {
    pub rsvp: Rsvp,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpSummaryEnvelope {
    pub rsvp_summary: RsvpSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetMyRsvpRequest {
    pub response: String,
}

/// PUT /trips/{tripId}/rsvp - Set the caller's RSVP (idempotent).
pub async fn set_my_rsvp(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
    Path(trip_id): Path<TripId>,
    headers: HeaderMap,
    Json(body): Json<SetMyRsvpRequest>,
) -> ApiResult {
    let me = require_member(&state, &subject)
        .await
        .map_err(|e| fail(e, &rid))?;
    let response = RsvpResponse::parse(&body.response).ok_or_else(|| {
        fail(
            AppError::validation(
                "invalid response",
                "response",
                "must be YES, NO, or UNSET",
            ),
            &rid,
        )
    })?;

    let canonical = TripScoped {
        trip_id,
        body: &body,
    };
    let rsvps = state.rsvps.clone();
    super::with_idempotency(
        &state,
        &rid,
        idempotency_key(&headers),
        &subject,
        "PUT",
        "/trips/{tripId}/rsvp",
        &canonical,
        StatusCode::OK,
        async move {
            let rsvp = rsvps.set_my_rsvp(me.id, trip_id, response).await?;
            Ok(RsvpEnvelope { rsvp })
        },
    )
    .await
}

/// GET /trips/{tripId}/rsvp/me - The caller's RSVP record.
pub async fn get_my_rsvp(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
    Path(trip_id): Path<TripId>,
) -> ApiResult {
    let me = require_member(&state, &subject)
        .await
        .map_err(|e| fail(e, &rid))?;
    let rsvp = state
        .rsvps
        .get_my_rsvp(me.id, trip_id)
        .await
        .map_err(|e| fail(e, &rid))?;
    Ok(json_response(StatusCode::OK, &RsvpEnvelope { rsvp }))
}

/// GET /trips/{tripId}/rsvps - RSVP summary for a published or canceled
/// trip.
pub async fn get_trip_rsvp_summary(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
    Path(trip_id): Path<TripId>,
) -> ApiResult {
    let me = require_member(&state, &subject)
        .await
        .map_err(|e| fail(e, &rid))?;
    let rsvp_summary = state
        .rsvps
        .summary(me.id, trip_id)
        .await
        .map_err(|e| fail(e, &rid))?;
    Ok(json_response(
        StatusCode::OK,
        &RsvpSummaryEnvelope { rsvp_summary },
    ))
}
