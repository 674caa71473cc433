//! Trip API endpoints.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use super::{fail, idempotency_key, json_response, require_member, ApiResult, ReqId};
use crate::auth::AuthSubject;
use crate::domain::{
    normalize_human_name, DraftVisibility, MemberId, TripDetails, TripId, TripSummary,
};
use crate::errors::AppError;
use crate::idempotency::TripScoped;
use crate::services::trips::{CreateTripDraftInput, TripCreated, TripPatch};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TripEnvelope {
    pub trip: TripDetails,
}

#[derive(Debug, Serialize)]
pub struct TripsEnvelope {
    pub trips: Vec<TripSummary>,
}

#[derive(Debug, Serialize)]
pub struct TripCreatedEnvelope {
    pub trip: TripCreated,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPublishedEnvelope {
    pub trip: TripDetails,
    pub announcement_copy: String,
}

/// GET /trips - All published and canceled trips.
pub async fn list_visible_trips(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
) -> ApiResult {
    let me = require_member(&state, &subject)
        .await
        .map_err(|e| fail(e, &rid))?;
    let trips = state
        .trips
        .list_visible(me.id)
        .await
        .map_err(|e| fail(e, &rid))?;
    Ok(json_response(StatusCode::OK, &TripsEnvelope { trips }))
}

/// GET /trips/drafts - Draft trips visible to the caller.
pub async fn list_my_draft_trips(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
) -> ApiResult {
    let me = require_member(&state, &subject)
        .await
        .map_err(|e| fail(e, &rid))?;
    let trips = state
        .trips
        .list_my_drafts(me.id)
        .await
        .map_err(|e| fail(e, &rid))?;
    Ok(json_response(StatusCode::OK, &TripsEnvelope { trips }))
}

/// GET /trips/{tripId} - Full details, including RSVP state when published
/// or canceled.
pub async fn get_trip_details(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
    Path(trip_id): Path<TripId>,
) -> ApiResult {
    let me = require_member(&state, &subject)
        .await
        .map_err(|e| fail(e, &rid))?;
    let trip = state
        .trips
        .details(me.id, trip_id)
        .await
        .map_err(|e| fail(e, &rid))?;
    Ok(json_response(StatusCode::OK, &TripEnvelope { trip }))
}

/// POST /trips - Create a draft trip (idempotent).
pub async fn create_trip_draft(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
    headers: HeaderMap,
    Json(input): Json<CreateTripDraftInput>,
) -> ApiResult {
    let me = require_member(&state, &subject)
        .await
        .map_err(|e| fail(e, &rid))?;

    let canonical = CreateTripDraftInput {
        name: normalize_human_name(&input.name),
    };
    let trips = state.trips.clone();
    super::with_idempotency(
        &state,
        &rid,
        idempotency_key(&headers),
        &subject,
        "POST",
        "/trips",
        &canonical,
        StatusCode::CREATED,
        async move {
            let trip = trips.create_draft(me.id, input).await?;
            Ok(TripCreatedEnvelope { trip })
        },
    )
    .await
}

/// PATCH /trips/{tripId} - Update a trip (idempotent).
pub async fn update_trip(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
    Path(trip_id): Path<TripId>,
    headers: HeaderMap,
    Json(patch): Json<TripPatch>,
) -> ApiResult {
    let me = require_member(&state, &subject)
        .await
        .map_err(|e| fail(e, &rid))?;

    let canonical_patch = canonicalize_trip_patch(&patch);
    let canonical = TripScoped {
        trip_id,
        body: &canonical_patch,
    };
    let trips = state.trips.clone();
    super::with_idempotency(
        &state,
        &rid,
        idempotency_key(&headers),
        &subject,
        "PATCH",
        "/trips/{tripId}",
        &canonical,
        StatusCode::OK,
        async move {
            let trip = trips.update_trip(me.id, trip_id, patch).await?;
            Ok(TripEnvelope { trip })
        },
    )
    .await
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDraftVisibilityRequest {
    pub draft_visibility: String,
}

/// PUT /trips/{tripId}/draft-visibility - Flip draft visibility (idempotent,
/// creator-only).
pub async fn set_trip_draft_visibility(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
    Path(trip_id): Path<TripId>,
    headers: HeaderMap,
    Json(body): Json<SetDraftVisibilityRequest>,
) -> ApiResult {
    let me = require_member(&state, &subject)
        .await
        .map_err(|e| fail(e, &rid))?;
    let visibility = DraftVisibility::parse(&body.draft_visibility).ok_or_else(|| {
        fail(
            AppError::validation(
                "invalid draftVisibility",
                "draftVisibility",
                "must be PRIVATE or PUBLIC",
            ),
            &rid,
        )
    })?;

    let canonical = TripScoped {
        trip_id,
        body: &body,
    };
    let trips = state.trips.clone();
    super::with_idempotency(
        &state,
        &rid,
        idempotency_key(&headers),
        &subject,
        "PUT",
        "/trips/{tripId}/draft-visibility",
        &canonical,
        StatusCode::OK,
        async move {
            let trip = trips.set_draft_visibility(me.id, trip_id, visibility).await?;
            Ok(TripEnvelope { trip })
        },
    )
    .await
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOrganizerRequest {
    pub member_id: MemberId,
}

/// POST /trips/{tripId}/organizers - Add an organizer (idempotent).
pub async fn add_trip_organizer(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
    Path(trip_id): Path<TripId>,
    headers: HeaderMap,
    Json(body): Json<AddOrganizerRequest>,
) -> ApiResult {
    let me = require_member(&state, &subject)
        .await
        .map_err(|e| fail(e, &rid))?;
    let target = body.member_id;

    let canonical = TripScoped {
        trip_id,
        body: &body,
    };
    let trips = state.trips.clone();
    super::with_idempotency(
        &state,
        &rid,
        idempotency_key(&headers),
        &subject,
        "POST",
        "/trips/{tripId}/organizers",
        &canonical,
        StatusCode::OK,
        async move {
            let trip = trips.add_organizer(me.id, trip_id, target).await?;
            Ok(TripEnvelope { trip })
        },
    )
    .await
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoveOrganizerCanonical {
    trip_id: TripId,
    member_id: MemberId,
}

/// DELETE /trips/{tripId}/organizers/{memberId} - Remove an organizer
/// (idempotent; the last organizer cannot be removed).
pub async fn remove_trip_organizer(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
    Path((trip_id, member_id)): Path<(TripId, MemberId)>,
    headers: HeaderMap,
) -> ApiResult {
    let me = require_member(&state, &subject)
        .await
        .map_err(|e| fail(e, &rid))?;

    let canonical = RemoveOrganizerCanonical { trip_id, member_id };
    let trips = state.trips.clone();
    super::with_idempotency(
        &state,
        &rid,
        idempotency_key(&headers),
        &subject,
        "DELETE",
        "/trips/{tripId}/organizers/{memberId}",
        &canonical,
        StatusCode::OK,
        async move {
            let trip = trips.remove_organizer(me.id, trip_id, member_id).await?;
            Ok(TripEnvelope { trip })
        },
    )
    .await
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TripIdCanonical {
    trip_id: TripId,
}

/// POST /trips/{tripId}/publish - Publish a PUBLIC draft (idempotent;
/// re-emits the announcement copy when already published).
pub async fn publish_trip(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
    Path(trip_id): Path<TripId>,
    headers: HeaderMap,
) -> ApiResult {
    let me = require_member(&state, &subject)
        .await
        .map_err(|e| fail(e, &rid))?;

    let canonical = TripIdCanonical { trip_id };
    let trips = state.trips.clone();
    super::with_idempotency(
        &state,
        &rid,
        idempotency_key(&headers),
        &subject,
        "POST",
        "/trips/{tripId}/publish",
        &canonical,
        StatusCode::OK,
        async move {
            let (trip, announcement_copy) = trips.publish(me.id, trip_id).await?;
            Ok(TripPublishedEnvelope {
                trip,
                announcement_copy,
            })
        },
    )
    .await
}

/// POST /trips/{tripId}/cancel - Cancel a trip (idempotent, terminal).
pub async fn cancel_trip(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
    Path(trip_id): Path<TripId>,
    headers: HeaderMap,
) -> ApiResult {
    let me = require_member(&state, &subject)
        .await
        .map_err(|e| fail(e, &rid))?;

    let canonical = TripIdCanonical { trip_id };
    let trips = state.trips.clone();
    super::with_idempotency(
        &state,
        &rid,
        idempotency_key(&headers),
        &subject,
        "POST",
        "/trips/{tripId}/cancel",
        &canonical,
        StatusCode::OK,
        async move {
            let trip = trips.cancel(me.id, trip_id).await?;
            Ok(TripEnvelope { trip })
        },
    )
    .await
}

/// Canonical form of the trip patch for idempotency hashing: the name is
/// normalized the same way the service will normalize it.
fn canonicalize_trip_patch(patch: &TripPatch) -> TripPatch {
    let mut canonical = patch.clone();
    canonical.name = canonical.name.map(|v| normalize_human_name(&v));
    canonical
}
