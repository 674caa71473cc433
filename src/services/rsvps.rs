//! RSVP engine: set/get a member's RSVP and compute the trip summary, with
//! capacity enforcement serialized per trip.

use std::sync::Arc;

use crate::domain::{MemberId, Rsvp, RsvpResponse, RsvpSummary, Trip, TripId, TripStatus};
use crate::errors::AppError;
use crate::store::{RsvpStore, StoreError, TripStore};

use super::trips::TripService;
use super::{Clock, TripLocks};

pub struct RsvpService {
    trips: Arc<dyn TripStore>,
    rsvps: Arc<dyn RsvpStore>,
    locks: Arc<TripLocks>,
    clock: Arc<dyn Clock>,
    /// Summary assembly is shared with the trip details projection.
    trip_service: Arc<TripService>,
}

impl RsvpService {
    pub fn new(
        trips: Arc<dyn TripStore>,
        rsvps: Arc<dyn RsvpStore>,
        locks: Arc<TripLocks>,
        clock: Arc<dyn Clock>,
        trip_service: Arc<TripService>,
    ) -> Self {
        Self {
            trips,
            rsvps,
            locks,
            clock,
            trip_service,
        }
    }

    /// Set the caller's RSVP on a published trip.
    ///
    /// Runs under the trip's lock. Attendance is recounted from RSVP records
    /// rather than trusting the cached trip counter, so the cached value can
    /// never drift into oversubscription.
    pub async fn set_my_rsvp(
        &self,
        caller: MemberId,
        trip_id: TripId,
        target: RsvpResponse,
    ) -> Result<Rsvp, AppError> {
        let _guard = self.locks.acquire(trip_id).await;
        let mut trip = self.load_visible(trip_id, caller).await?;
        if trip.status != TripStatus::Published {
            return Err(AppError::TripNotPublished);
        }
        let capacity = match trip.capacity_rigs {
            Some(c) if c >= 1 => c,
            _ => return Err(AppError::TripMissingCapacity),
        };

        let existing = match self.rsvps.get(trip_id, caller).await {
            Ok(r) => Some(r),
            Err(StoreError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        // Setting the same value again is a no-op; UpdatedAt is preserved.
        if let Some(existing) = &existing {
            if existing.response == target {
                return Ok(existing.clone());
            }
        }

        let current_attending = self.rsvps.count_yes_by_trip(trip_id).await? as i64;
        let was_yes = existing
            .as_ref()
            .is_some_and(|r| r.response == RsvpResponse::Yes);
        let delta: i64 = match (was_yes, target == RsvpResponse::Yes) {
            (true, false) => -1,
            (false, true) => 1,
            _ => 0,
        };
        let new_attending = (current_attending + delta).max(0) as u32;
        if target == RsvpResponse::Yes && new_attending > capacity {
            return Err(AppError::TripAtCapacity);
        }

        let now = self.clock.now();
        trip.attending_rigs = Some(new_attending);
        trip.updated_at = now;
        self.trips.save(&trip).await?;

        let record = Rsvp {
            trip_id,
            member_id: caller,
            response: target,
            updated_at: now,
        };
        self.rsvps.upsert(&record).await?;
        Ok(record)
    }

    pub async fn get_my_rsvp(&self, caller: MemberId, trip_id: TripId) -> Result<Rsvp, AppError> {
        let trip = self.load_visible(trip_id, caller).await?;
        if trip.status == TripStatus::Draft {
            return Err(AppError::RsvpNotAvailable);
        }
        match self.rsvps.get(trip_id, caller).await {
            Ok(r) => Ok(r),
            Err(StoreError::NotFound) => Err(AppError::RsvpNotFound),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn summary(
        &self,
        caller: MemberId,
        trip_id: TripId,
    ) -> Result<RsvpSummary, AppError> {
        let trip = self.load_visible(trip_id, caller).await?;
        if trip.status == TripStatus::Draft {
            return Err(AppError::RsvpNotAvailable);
        }
        self.trip_service.rsvp_summary_for(&trip).await
    }

    async fn load_visible(&self, trip_id: TripId, caller: MemberId) -> Result<Trip, AppError> {
        let trip = match self.trips.get_by_id(trip_id).await {
            Ok(t) => t,
            Err(StoreError::NotFound) => return Err(AppError::TripNotFound),
            Err(e) => return Err(e.into()),
        };
        if !trip.is_visible_to(caller) {
            return Err(AppError::TripNotFound);
        }
        Ok(trip)
    }
}
