//! Trip use cases: draft lifecycle, organizer management, publishing,
//! cancellation, listings, and the details projection.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    normalize_human_name, reorder_artifacts_by_id, required_publish_fields_missing,
    sort_member_summaries, DraftVisibility, Location, Member, MemberId, MemberSummary, Patch,
    Rsvp, RsvpResponse, RsvpSummary, Trip, TripDetails, TripId, TripStatus, TripSummary,
};
use crate::errors::AppError;
use crate::store::{MemberStore, RsvpStore, StoreError, TripStore};

use super::{Clock, TripLocks};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTripDraftInput {
    pub name: String,
}

/// The minimal response returned when a draft trip is created.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripCreated {
    pub trip_id: TripId,
    pub status: TripStatus,
    pub draft_visibility: DraftVisibility,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationPatch {
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub label: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub address: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub latitude: Patch<f64>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub longitude: Patch<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TripPatch {
    /// Optional but cannot be null.
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub name: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub description: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub start_date: Patch<chrono::NaiveDate>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub end_date: Patch<chrono::NaiveDate>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub capacity_rigs: Patch<u32>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub difficulty_text: Patch<String>,
    /// Null clears the location; a value patches it field-wise.
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub meeting_location: Patch<LocationPatch>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub comms_requirements_text: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub recommended_requirements_text: Patch<String>,
    /// Null clears all artifacts; a value reorders existing artifacts by id.
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub artifact_ids: Patch<Vec<String>>,
}

pub struct TripService {
    trips: Arc<dyn TripStore>,
    members: Arc<dyn MemberStore>,
    rsvps: Arc<dyn RsvpStore>,
    locks: Arc<TripLocks>,
    clock: Arc<dyn Clock>,
}

impl TripService {
    pub fn new(
        trips: Arc<dyn TripStore>,
        members: Arc<dyn MemberStore>,
        rsvps: Arc<dyn RsvpStore>,
        locks: Arc<TripLocks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            trips,
            members,
            rsvps,
            locks,
            clock,
        }
    }

    pub async fn create_draft(
        &self,
        caller: MemberId,
        input: CreateTripDraftInput,
    ) -> Result<TripCreated, AppError> {
        // The caller must exist as a member.
        match self.members.get_by_id(caller).await {
            Ok(_) => {}
            Err(StoreError::NotFound) => {
                return Err(AppError::validation(
                    "invalid caller",
                    "memberId",
                    "caller does not exist",
                ))
            }
            Err(e) => return Err(e.into()),
        }

        let name = normalize_human_name(&input.name);
        if name.is_empty() {
            return Err(AppError::validation(
                "invalid name",
                "name",
                "must be non-empty",
            ));
        }

        let now = self.clock.now();
        let trip = Trip {
            id: Uuid::new_v4(),
            status: TripStatus::Draft,
            name: Some(name),
            description: None,
            creator_member_id: caller,
            organizer_member_ids: vec![caller],
            draft_visibility: Some(DraftVisibility::Private),
            start_date: None,
            end_date: None,
            capacity_rigs: None,
            attending_rigs: None,
            difficulty_text: None,
            meeting_location: None,
            comms_requirements_text: None,
            recommended_requirements_text: None,
            artifacts: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        match self.trips.create(&trip).await {
            Ok(()) => Ok(TripCreated {
                trip_id: trip.id,
                status: TripStatus::Draft,
                draft_visibility: DraftVisibility::Private,
            }),
            Err(StoreError::AlreadyExists) => Err(AppError::TripIdConflict),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update_trip(
        &self,
        caller: MemberId,
        trip_id: TripId,
        patch: TripPatch,
    ) -> Result<TripDetails, AppError> {
        let _guard = self.locks.acquire(trip_id).await;
        let mut trip = self.load(trip_id).await?;

        // Authorization depends on the current status. Unauthorized access
        // to an existing trip surfaces as not-found.
        match trip.status {
            TripStatus::Draft => {
                let allowed = match trip.draft_visibility {
                    Some(DraftVisibility::Private) => trip.creator_member_id == caller,
                    Some(DraftVisibility::Public) => trip.is_organizer(caller),
                    None => false,
                };
                if !allowed {
                    return Err(AppError::TripNotFound);
                }
            }
            TripStatus::Published => {
                if !trip.is_organizer(caller) {
                    return Err(AppError::TripNotFound);
                }
            }
            TripStatus::Canceled => return Err(AppError::TripCanceled),
        }

        match patch.name {
            Patch::Unspecified => {}
            Patch::Null => {
                return Err(AppError::validation("invalid name", "name", "cannot be null"))
            }
            Patch::Value(v) => {
                let name = normalize_human_name(&v);
                if name.is_empty() {
                    return Err(AppError::validation(
                        "invalid name",
                        "name",
                        "must be non-empty",
                    ));
                }
                trip.name = Some(name);
            }
        }

        patch.description.apply_to(&mut trip.description);
        patch.difficulty_text.apply_to(&mut trip.difficulty_text);
        patch
            .comms_requirements_text
            .apply_to(&mut trip.comms_requirements_text);
        patch
            .recommended_requirements_text
            .apply_to(&mut trip.recommended_requirements_text);
        patch.start_date.apply_to(&mut trip.start_date);
        patch.end_date.apply_to(&mut trip.end_date);

        match patch.capacity_rigs {
            Patch::Unspecified => {}
            Patch::Null => trip.capacity_rigs = None,
            Patch::Value(v) => {
                if v < 1 {
                    return Err(AppError::validation(
                        "invalid capacityRigs",
                        "capacityRigs",
                        "must be >= 1",
                    ));
                }
                if trip.status == TripStatus::Published {
                    let attending = trip.attending_rigs.unwrap_or(0);
                    if v < attending {
                        return Err(AppError::CapacityBelowAttendance {
                            attending_rigs: attending,
                        });
                    }
                }
                trip.capacity_rigs = Some(v);
            }
        }

        match patch.meeting_location {
            Patch::Unspecified => {}
            Patch::Null => trip.meeting_location = None,
            Patch::Value(lp) => {
                trip.meeting_location = Some(apply_location_patch(trip.meeting_location.take(), lp)?)
            }
        }

        match patch.artifact_ids {
            Patch::Unspecified => {}
            Patch::Null => trip.artifacts = Vec::new(),
            Patch::Value(ids) => {
                trip.artifacts = reorder_artifacts_by_id(&trip.artifacts, &ids).map_err(|reason| {
                    AppError::validation("invalid artifactIds", "artifactIds", reason)
                })?;
            }
        }

        if let (Some(start), Some(end)) = (trip.start_date, trip.end_date) {
            if end < start {
                return Err(AppError::validation(
                    "invalid date range",
                    "endDate",
                    "must be on or after startDate",
                ));
            }
        }

        trip.updated_at = self.clock.now();
        self.trips.save(&trip).await?;
        self.details_for(&trip, None).await
    }

    /// Creator-only, draft-only visibility flip.
    pub async fn set_draft_visibility(
        &self,
        caller: MemberId,
        trip_id: TripId,
        visibility: DraftVisibility,
    ) -> Result<TripDetails, AppError> {
        let _guard = self.locks.acquire(trip_id).await;
        let mut trip = self.load_visible(trip_id, caller).await?;
        if trip.status != TripStatus::Draft {
            return Err(AppError::TripNotDraft);
        }
        if trip.creator_member_id != caller {
            return Err(AppError::TripNotFound);
        }
        trip.draft_visibility = Some(visibility);
        trip.updated_at = self.clock.now();
        self.trips.save(&trip).await?;
        self.details_for(&trip, None).await
    }

    /// Idempotent: adding an existing organizer is a no-op.
    pub async fn add_organizer(
        &self,
        caller: MemberId,
        trip_id: TripId,
        target: MemberId,
    ) -> Result<TripDetails, AppError> {
        let _guard = self.locks.acquire(trip_id).await;
        let mut trip = self.load_visible(trip_id, caller).await?;
        if !trip.is_organizer(caller) {
            return Err(AppError::TripNotFound);
        }
        match self.members.get_by_id(target).await {
            Ok(_) => {}
            Err(StoreError::NotFound) => {
                return Err(AppError::validation(
                    "invalid memberId",
                    "memberId",
                    "member not found",
                ))
            }
            Err(e) => return Err(e.into()),
        }

        if !trip.is_organizer(target) {
            trip.organizer_member_ids.push(target);
            trip.updated_at = self.clock.now();
            self.trips.save(&trip).await?;
        }
        self.details_for(&trip, None).await
    }

    /// Idempotent for absent targets; removing the last organizer fails.
    pub async fn remove_organizer(
        &self,
        caller: MemberId,
        trip_id: TripId,
        target: MemberId,
    ) -> Result<TripDetails, AppError> {
        let _guard = self.locks.acquire(trip_id).await;
        let mut trip = self.load_visible(trip_id, caller).await?;
        if !trip.is_organizer(caller) {
            return Err(AppError::TripNotFound);
        }

        if !trip.is_organizer(target) {
            return self.details_for(&trip, None).await;
        }
        if trip.organizer_member_ids.len() == 1 {
            return Err(AppError::LastOrganizer);
        }
        trip.organizer_member_ids.retain(|id| *id != target);
        trip.updated_at = self.clock.now();
        self.trips.save(&trip).await?;
        self.details_for(&trip, None).await
    }

    /// One-way transition from a PUBLIC draft with every required field
    /// present. Re-publishing an already-published trip is an idempotent
    /// success that re-emits the announcement copy.
    pub async fn publish(
        &self,
        caller: MemberId,
        trip_id: TripId,
    ) -> Result<(TripDetails, String), AppError> {
        let _guard = self.locks.acquire(trip_id).await;
        let mut trip = self.load_visible(trip_id, caller).await?;
        if !trip.is_organizer(caller) {
            return Err(AppError::TripNotFound);
        }

        match trip.status {
            TripStatus::Published => {
                let copy = announcement_copy(&trip);
                let details = self.details_for(&trip, None).await?;
                return Ok((details, copy));
            }
            TripStatus::Canceled => return Err(AppError::TripCanceled),
            TripStatus::Draft => {}
        }

        if trip.draft_visibility != Some(DraftVisibility::Public) {
            return Err(AppError::TripPrivateDraft);
        }
        let missing = required_publish_fields_missing(&trip);
        if !missing.is_empty() {
            return Err(AppError::TripNotReadyToPublish { missing });
        }

        trip.status = TripStatus::Published;
        trip.draft_visibility = None;
        if trip.attending_rigs.is_none() {
            trip.attending_rigs = Some(0);
        }
        trip.updated_at = self.clock.now();
        self.trips.save(&trip).await?;

        let copy = announcement_copy(&trip);
        let details = self.details_for(&trip, None).await?;
        Ok((details, copy))
    }

    /// Terminal transition; idempotent once canceled.
    pub async fn cancel(&self, caller: MemberId, trip_id: TripId) -> Result<TripDetails, AppError> {
        let _guard = self.locks.acquire(trip_id).await;
        let mut trip = self.load_visible(trip_id, caller).await?;
        if !trip.is_organizer(caller) {
            return Err(AppError::TripNotFound);
        }
        if trip.status == TripStatus::Canceled {
            return self.details_for(&trip, None).await;
        }
        trip.status = TripStatus::Canceled;
        trip.draft_visibility = None;
        trip.updated_at = self.clock.now();
        self.trips.save(&trip).await?;
        self.details_for(&trip, None).await
    }

    pub async fn list_visible(&self, _caller: MemberId) -> Result<Vec<TripSummary>, AppError> {
        let trips = self.trips.list_published_and_canceled().await?;
        Ok(trips.iter().map(TripSummary::of).collect())
    }

    pub async fn list_my_drafts(&self, caller: MemberId) -> Result<Vec<TripSummary>, AppError> {
        let trips = self.trips.list_drafts_visible_to(caller).await?;
        Ok(trips.iter().map(TripSummary::of).collect())
    }

    pub async fn details(
        &self,
        caller: MemberId,
        trip_id: TripId,
    ) -> Result<TripDetails, AppError> {
        let trip = self.load_visible(trip_id, caller).await?;
        self.details_for(&trip, Some(caller)).await
    }

    async fn load(&self, trip_id: TripId) -> Result<Trip, AppError> {
        match self.trips.get_by_id(trip_id).await {
            Ok(t) => Ok(t),
            Err(StoreError::NotFound) => Err(AppError::TripNotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_visible(&self, trip_id: TripId, caller: MemberId) -> Result<Trip, AppError> {
        let trip = self.load(trip_id).await?;
        if !trip.is_visible_to(caller) {
            return Err(AppError::TripNotFound);
        }
        Ok(trip)
    }

    /// Assemble the details projection. `caller` controls whether the
    /// caller's own RSVP is attached.
    pub(crate) async fn details_for(
        &self,
        trip: &Trip,
        caller: Option<MemberId>,
    ) -> Result<TripDetails, AppError> {
        let organizers = self
            .load_member_summaries(&trip.organizer_member_ids, false)
            .await?;

        let (rsvp_summary, my_rsvp) = match trip.status {
            TripStatus::Published | TripStatus::Canceled => {
                let summary = self.rsvp_summary_for(trip).await?;
                let mine = match caller {
                    Some(member_id) => match self.rsvps.get(trip.id, member_id).await {
                        Ok(r) => Some(r),
                        Err(StoreError::NotFound) => None,
                        Err(e) => return Err(e.into()),
                    },
                    None => None,
                };
                (Some(summary), mine)
            }
            TripStatus::Draft => (None, None),
        };

        Ok(TripDetails {
            summary: TripSummary::of(trip),
            description: trip.description.clone(),
            difficulty_text: trip.difficulty_text.clone(),
            meeting_location: trip.meeting_location.clone(),
            comms_requirements_text: trip.comms_requirements_text.clone(),
            recommended_requirements_text: trip.recommended_requirements_text.clone(),
            organizers,
            artifacts: trip.artifacts.clone(),
            rsvp_summary,
            my_rsvp,
            rsvp_actions_enabled: trip.status == TripStatus::Published,
        })
    }

    pub(crate) async fn rsvp_summary_for(&self, trip: &Trip) -> Result<RsvpSummary, AppError> {
        let records: Vec<Rsvp> = self.rsvps.list_by_trip(trip.id).await?;
        let mut yes_ids = Vec::new();
        let mut no_ids = Vec::new();
        for r in &records {
            match r.response {
                RsvpResponse::Yes => yes_ids.push(r.member_id),
                RsvpResponse::No => no_ids.push(r.member_id),
                // UNSET collapses to "no record" at the output boundary.
                RsvpResponse::Unset => {}
            }
        }
        let attending_members = self.load_member_summaries(&yes_ids, true).await?;
        let not_attending_members = self.load_member_summaries(&no_ids, true).await?;
        Ok(RsvpSummary {
            capacity_rigs: trip.capacity_rigs,
            attending_rigs: attending_members.len() as u32,
            attending_members,
            not_attending_members,
        })
    }

    async fn load_member_summaries(
        &self,
        ids: &[MemberId],
        sorted: bool,
    ) -> Result<Vec<MemberSummary>, AppError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let m: Member = self.members.get_by_id(*id).await?;
            out.push(MemberSummary::of(&m));
        }
        if sorted {
            sort_member_summaries(&mut out);
        }
        Ok(out)
    }
}

fn apply_location_patch(
    existing: Option<Location>,
    patch: LocationPatch,
) -> Result<Location, AppError> {
    let mut out = existing.unwrap_or(Location {
        label: String::new(),
        address: None,
        latitude: None,
        longitude: None,
    });
    match patch.label {
        Patch::Unspecified => {}
        Patch::Null => {
            return Err(AppError::validation(
                "invalid meetingLocation",
                "meetingLocation.label",
                "cannot be null",
            ))
        }
        Patch::Value(v) => out.label = v,
    }
    patch.address.apply_to(&mut out.address);
    patch.latitude.apply_to(&mut out.latitude);
    patch.longitude.apply_to(&mut out.longitude);

    if out.label.trim().is_empty() {
        return Err(AppError::validation(
            "invalid meetingLocation",
            "meetingLocation.label",
            "is required",
        ));
    }
    if out.latitude.is_some() != out.longitude.is_some() {
        return Err(AppError::validation(
            "invalid meetingLocation",
            "meetingLocation",
            "latitude and longitude must be set together",
        ));
    }
    Ok(out)
}

/// Deterministic announcement text assembled at publish time. The core's
/// sole notification artifact.
pub fn announcement_copy(trip: &Trip) -> String {
    let name = trip
        .name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("(untitled)");

    let date_line = match (trip.start_date, trip.end_date) {
        (Some(start), Some(end)) => format!("Dates: {start} to {end}"),
        (Some(start), None) => format!("Start: {start}"),
        _ => "Dates: TBD".to_string(),
    };

    let mut lines = vec![format!("Trip: {name}"), date_line];
    if let Some(capacity) = trip.capacity_rigs {
        lines.push(format!("Capacity: {capacity} rigs"));
    }
    if let Some(location) = &trip.meeting_location {
        let label = location.label.trim();
        if !label.is_empty() {
            let mut line = format!("Meet: {label}");
            if let Some(address) = location.address.as_deref().map(str::trim) {
                if !address.is_empty() {
                    line = format!("{line} ({address})");
                }
            }
            lines.push(line);
        }
    }
    if let Some(description) = trip.description.as_deref().map(str::trim) {
        if !description.is_empty() {
            lines.push(String::new());
            lines.push(description.to_string());
        }
    }
    lines.push(String::new());
    lines.push("RSVP in the app once you're ready.".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::members::{CreateMemberInput, MemberService};
    use crate::services::SystemClock;
    use crate::store::memory::{MemoryMemberStore, MemoryRsvpStore, MemoryTripStore};
    use chrono::NaiveDate;

    struct Fixture {
        members: MemberService,
        trips: TripService,
    }

    fn fixture() -> Fixture {
        let member_store = Arc::new(MemoryMemberStore::new());
        let trip_store = Arc::new(MemoryTripStore::new());
        let rsvp_store = Arc::new(MemoryRsvpStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Fixture {
            members: MemberService::new(member_store.clone(), clock.clone()),
            trips: TripService::new(
                trip_store,
                member_store,
                rsvp_store,
                Arc::new(TripLocks::new()),
                clock,
            ),
        }
    }

    async fn provision(f: &Fixture, subject: &str, name: &str) -> MemberId {
        f.members
            .create_my_member(
                subject,
                CreateMemberInput {
                    display_name: name.to_string(),
                    email: format!("{subject}@x.io"),
                    group_alias_email: Patch::Unspecified,
                    vehicle_profile: None,
                },
            )
            .await
            .unwrap()
            .id
    }

    fn ready_patch() -> TripPatch {
        TripPatch {
            description: Patch::Value("Three days on granite".to_string()),
            start_date: Patch::Value(NaiveDate::from_ymd_opt(2026, 9, 12).unwrap()),
            end_date: Patch::Value(NaiveDate::from_ymd_opt(2026, 9, 14).unwrap()),
            capacity_rigs: Patch::Value(8),
            difficulty_text: Patch::Value("Hard; 35s and lockers".to_string()),
            meeting_location: Patch::Value(LocationPatch {
                label: Patch::Value("Loon Lake staging".to_string()),
                ..Default::default()
            }),
            comms_requirements_text: Patch::Value("GMRS 17".to_string()),
            recommended_requirements_text: Patch::Value("Full-size spare".to_string()),
            ..Default::default()
        }
    }

    async fn published_trip(f: &Fixture, creator: MemberId) -> TripId {
        let created = f
            .trips
            .create_draft(
                creator,
                CreateTripDraftInput {
                    name: "Rubicon".to_string(),
                },
            )
            .await
            .unwrap();
        f.trips
            .update_trip(creator, created.trip_id, ready_patch())
            .await
            .unwrap();
        f.trips
            .set_draft_visibility(creator, created.trip_id, DraftVisibility::Public)
            .await
            .unwrap();
        f.trips.publish(creator, created.trip_id).await.unwrap();
        created.trip_id
    }

    #[tokio::test]
    async fn create_draft_normalizes_name_and_sets_private() {
        let f = fixture();
        let alice = provision(&f, "sub-a", "Alice").await;
        let created = f
            .trips
            .create_draft(
                alice,
                CreateTripDraftInput {
                    name: "  Snow   Run  ".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(created.status, TripStatus::Draft);
        assert_eq!(created.draft_visibility, DraftVisibility::Private);

        let details = f.trips.details(alice, created.trip_id).await.unwrap();
        assert_eq!(details.summary.name.as_deref(), Some("Snow Run"));
        assert_eq!(details.organizers.len(), 1);
        assert!(!details.rsvp_actions_enabled);
        assert!(details.rsvp_summary.is_none());
    }

    #[tokio::test]
    async fn private_draft_collapses_to_not_found_for_others() {
        let f = fixture();
        let alice = provision(&f, "sub-a", "Alice").await;
        let bob = provision(&f, "sub-b", "Bob").await;
        let created = f
            .trips
            .create_draft(
                alice,
                CreateTripDraftInput {
                    name: "Secret".to_string(),
                },
            )
            .await
            .unwrap();
        let err = f.trips.details(bob, created.trip_id).await.unwrap_err();
        assert!(matches!(err, AppError::TripNotFound));
        let err = f
            .trips
            .update_trip(bob, created.trip_id, TripPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TripNotFound));
    }

    #[tokio::test]
    async fn publish_requires_public_draft_and_all_fields() {
        let f = fixture();
        let alice = provision(&f, "sub-a", "Alice").await;
        let created = f
            .trips
            .create_draft(
                alice,
                CreateTripDraftInput {
                    name: "Rubicon".to_string(),
                },
            )
            .await
            .unwrap();

        // A PRIVATE draft fails on the visibility gate before field checks.
        let err = f.trips.publish(alice, created.trip_id).await.unwrap_err();
        assert!(matches!(err, AppError::TripPrivateDraft));

        f.trips
            .set_draft_visibility(alice, created.trip_id, DraftVisibility::Public)
            .await
            .unwrap();
        let err = f.trips.publish(alice, created.trip_id).await.unwrap_err();
        match err {
            AppError::TripNotReadyToPublish { missing } => {
                assert!(missing.contains(&"description"));
                assert!(missing.contains(&"capacityRigs"));
            }
            other => panic!("unexpected error: {other}"),
        }

        f.trips
            .update_trip(alice, created.trip_id, ready_patch())
            .await
            .unwrap();
        let (details, copy) = f.trips.publish(alice, created.trip_id).await.unwrap();
        assert_eq!(details.summary.status, TripStatus::Published);
        assert_eq!(details.summary.attending_rigs, Some(0));
        assert_eq!(details.summary.draft_visibility, None);
        assert!(copy.starts_with("Trip: Rubicon\nDates: 2026-09-12 to 2026-09-14"));
        assert!(copy.ends_with("RSVP in the app once you're ready."));

        // Idempotent republish returns identical copy.
        let (_, copy2) = f.trips.publish(alice, created.trip_id).await.unwrap();
        assert_eq!(copy, copy2);
    }

    #[tokio::test]
    async fn missing_single_field_is_named() {
        let f = fixture();
        let alice = provision(&f, "sub-a", "Alice").await;
        let created = f
            .trips
            .create_draft(
                alice,
                CreateTripDraftInput {
                    name: "Rubicon".to_string(),
                },
            )
            .await
            .unwrap();
        let mut patch = ready_patch();
        patch.difficulty_text = Patch::Unspecified;
        f.trips
            .update_trip(alice, created.trip_id, patch)
            .await
            .unwrap();
        f.trips
            .set_draft_visibility(alice, created.trip_id, DraftVisibility::Public)
            .await
            .unwrap();
        match f.trips.publish(alice, created.trip_id).await.unwrap_err() {
            AppError::TripNotReadyToPublish { missing } => {
                assert_eq!(missing, vec!["difficultyText"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn organizer_add_remove_and_last_organizer_guard() {
        let f = fixture();
        let alice = provision(&f, "sub-a", "Alice").await;
        let bob = provision(&f, "sub-b", "Bob").await;
        let trip_id = published_trip(&f, alice).await;

        let details = f.trips.add_organizer(alice, trip_id, bob).await.unwrap();
        assert_eq!(details.organizers.len(), 2);

        // Adding again is a no-op.
        let details = f.trips.add_organizer(alice, trip_id, bob).await.unwrap();
        assert_eq!(details.organizers.len(), 2);

        // Unknown target member is a validation error.
        let err = f
            .trips
            .add_organizer(alice, trip_id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let details = f.trips.remove_organizer(alice, trip_id, bob).await.unwrap();
        assert_eq!(details.organizers.len(), 1);

        // Removing an absent target is a no-op.
        let details = f.trips.remove_organizer(alice, trip_id, bob).await.unwrap();
        assert_eq!(details.organizers.len(), 1);

        // The last organizer cannot be removed.
        let err = f
            .trips
            .remove_organizer(alice, trip_id, alice)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LastOrganizer));
    }

    #[tokio::test]
    async fn cancel_is_terminal_and_idempotent() {
        let f = fixture();
        let alice = provision(&f, "sub-a", "Alice").await;
        let trip_id = published_trip(&f, alice).await;

        let details = f.trips.cancel(alice, trip_id).await.unwrap();
        assert_eq!(details.summary.status, TripStatus::Canceled);

        // Idempotent repeat.
        let details = f.trips.cancel(alice, trip_id).await.unwrap();
        assert_eq!(details.summary.status, TripStatus::Canceled);

        // No mutations after cancel.
        let err = f
            .trips
            .update_trip(alice, trip_id, TripPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TripCanceled));
        let err = f.trips.publish(alice, trip_id).await.unwrap_err();
        assert!(matches!(err, AppError::TripCanceled));
    }

    #[tokio::test]
    async fn visibility_flip_is_creator_and_draft_only() {
        let f = fixture();
        let alice = provision(&f, "sub-a", "Alice").await;
        let bob = provision(&f, "sub-b", "Bob").await;
        let created = f
            .trips
            .create_draft(
                alice,
                CreateTripDraftInput {
                    name: "Dunes".to_string(),
                },
            )
            .await
            .unwrap();

        // Bob cannot even see the private draft.
        let err = f
            .trips
            .set_draft_visibility(bob, created.trip_id, DraftVisibility::Public)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TripNotFound));

        f.trips
            .set_draft_visibility(alice, created.trip_id, DraftVisibility::Public)
            .await
            .unwrap();

        // A co-organizer who is not the creator cannot flip visibility.
        f.trips.add_organizer(alice, created.trip_id, bob).await.unwrap();
        let err = f
            .trips
            .set_draft_visibility(bob, created.trip_id, DraftVisibility::Private)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TripNotFound));

        // Non-draft rejects the flip.
        let published = published_trip(&f, alice).await;
        let err = f
            .trips
            .set_draft_visibility(alice, published, DraftVisibility::Public)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TripNotDraft));
    }

    #[tokio::test]
    async fn capacity_cannot_drop_below_attendance() {
        let f = fixture();
        let alice = provision(&f, "sub-a", "Alice").await;
        let trip_id = published_trip(&f, alice).await;

        // Simulate two attending rigs.
        let mut trip = f.trips.trips.get_by_id(trip_id).await.unwrap();
        trip.attending_rigs = Some(2);
        f.trips.trips.save(&trip).await.unwrap();

        let err = f
            .trips
            .update_trip(
                alice,
                trip_id,
                TripPatch {
                    capacity_rigs: Patch::Value(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::CapacityBelowAttendance { attending_rigs: 2 }
        ));
    }

    #[tokio::test]
    async fn date_range_is_validated() {
        let f = fixture();
        let alice = provision(&f, "sub-a", "Alice").await;
        let created = f
            .trips
            .create_draft(
                alice,
                CreateTripDraftInput {
                    name: "Backwards".to_string(),
                },
            )
            .await
            .unwrap();
        let err = f
            .trips
            .update_trip(
                alice,
                created.trip_id,
                TripPatch {
                    start_date: Patch::Value(NaiveDate::from_ymd_opt(2026, 9, 14).unwrap()),
                    end_date: Patch::Value(NaiveDate::from_ymd_opt(2026, 9, 12).unwrap()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn announcement_copy_formats_optional_lines() {
        let f = fixture();
        let alice = provision(&f, "sub-a", "Alice").await;
        let trip_id = published_trip(&f, alice).await;
        let trip = f.trips.trips.get_by_id(trip_id).await.unwrap();
        let copy = announcement_copy(&trip);
        assert_eq!(
            copy,
            "Trip: Rubicon\n\
             Dates: 2026-09-12 to 2026-09-14\n\
             Capacity: 8 rigs\n\
             Meet: Loon Lake staging\n\
             \n\
             Three days on granite\n\
             \n\
             RSVP in the app once you're ready."
        );
    }
}
