//! In-memory storage backend.
//!
//! Backs the `STORAGE_BACKEND=memory` mode and the test suite. Safe for
//! concurrent use; aggregate-level serialization is provided by the service
//! layer's per-trip locks.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::{
    sort_members_by_display_name, sort_trips_for_listing, Member, MemberId, Rsvp, Trip, TripId,
};
use crate::idempotency::{Fingerprint, IdempotencyRecord};

use super::{IdempotencyStore, MemberStore, RsvpStore, StoreError, TripStore};

#[derive(Default)]
struct MemberMaps {
    by_id: HashMap<MemberId, Member>,
    id_by_subject: HashMap<String, MemberId>,
}

pub struct MemoryMemberStore {
    inner: RwLock<MemberMaps>,
}

impl MemoryMemberStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemberMaps::default()),
        }
    }
}

impl Default for MemoryMemberStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemberStore for MemoryMemberStore {
    async fn create(&self, member: &Member) -> Result<(), StoreError> {
        let mut maps = self.inner.write()?;
        if maps.by_id.contains_key(&member.id) {
            return Err(StoreError::AlreadyExists);
        }
        if maps.id_by_subject.contains_key(&member.subject) {
            return Err(StoreError::SubjectAlreadyBound);
        }
        maps.id_by_subject.insert(member.subject.clone(), member.id);
        maps.by_id.insert(member.id, member.clone());
        Ok(())
    }

    async fn update(&self, member: &Member) -> Result<(), StoreError> {
        let mut maps = self.inner.write()?;
        let existing = maps.by_id.get(&member.id).ok_or(StoreError::NotFound)?;
        if existing.subject != member.subject {
            return Err(StoreError::SubjectAlreadyBound);
        }
        maps.by_id.insert(member.id, member.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: MemberId) -> Result<Member, StoreError> {
        let maps = self.inner.read()?;
        maps.by_id.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_by_subject(&self, subject: &str) -> Result<Member, StoreError> {
        let maps = self.inner.read()?;
        let id = maps.id_by_subject.get(subject).ok_or(StoreError::NotFound)?;
        maps.by_id.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn list(&self, include_inactive: bool) -> Result<Vec<Member>, StoreError> {
        let maps = self.inner.read()?;
        let mut out: Vec<Member> = maps
            .by_id
            .values()
            .filter(|m| include_inactive || m.is_active)
            .cloned()
            .collect();
        sort_members_by_display_name(&mut out);
        Ok(out)
    }

    async fn search_active_by_display_name(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Member>, StoreError> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let maps = self.inner.read()?;
        let mut out: Vec<Member> = maps
            .by_id
            .values()
            .filter(|m| m.is_active && matches_all_tokens(&m.display_name, &tokens))
            .cloned()
            .collect();
        sort_members_by_display_name(&mut out);
        out.truncate(limit);
        Ok(out)
    }
}

fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn matches_all_tokens(display_name: &str, tokens: &[String]) -> bool {
    let hay = display_name.to_lowercase();
    tokens.iter().all(|t| hay.contains(t.as_str()))
}

pub struct MemoryTripStore {
    inner: RwLock<HashMap<TripId, Trip>>,
}

impl MemoryTripStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryTripStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TripStore for MemoryTripStore {
    async fn create(&self, trip: &Trip) -> Result<(), StoreError> {
        let mut trips = self.inner.write()?;
        if trips.contains_key(&trip.id) {
            return Err(StoreError::AlreadyExists);
        }
        trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn save(&self, trip: &Trip) -> Result<(), StoreError> {
        let mut trips = self.inner.write()?;
        if !trips.contains_key(&trip.id) {
            return Err(StoreError::NotFound);
        }
        trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: TripId) -> Result<Trip, StoreError> {
        let trips = self.inner.read()?;
        trips.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn list_published_and_canceled(&self) -> Result<Vec<Trip>, StoreError> {
        let trips = self.inner.read()?;
        let mut out: Vec<Trip> = trips
            .values()
            .filter(|t| {
                matches!(
                    t.status,
                    crate::domain::TripStatus::Published | crate::domain::TripStatus::Canceled
                )
            })
            .cloned()
            .collect();
        sort_trips_for_listing(&mut out);
        Ok(out)
    }

    async fn list_drafts_visible_to(&self, caller: MemberId) -> Result<Vec<Trip>, StoreError> {
        let trips = self.inner.read()?;
        let mut out: Vec<Trip> = trips
            .values()
            .filter(|t| t.is_draft_visible_to(caller))
            .cloned()
            .collect();
        sort_trips_for_listing(&mut out);
        Ok(out)
    }
}

pub struct MemoryRsvpStore {
    inner: RwLock<HashMap<(TripId, MemberId), Rsvp>>,
}

impl MemoryRsvpStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRsvpStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RsvpStore for MemoryRsvpStore {
    async fn get(&self, trip_id: TripId, member_id: MemberId) -> Result<Rsvp, StoreError> {
        let map = self.inner.read()?;
        map.get(&(trip_id, member_id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn upsert(&self, rsvp: &Rsvp) -> Result<(), StoreError> {
        let mut map = self.inner.write()?;
        map.insert((rsvp.trip_id, rsvp.member_id), rsvp.clone());
        Ok(())
    }

    async fn list_by_trip(&self, trip_id: TripId) -> Result<Vec<Rsvp>, StoreError> {
        let map = self.inner.read()?;
        let mut out: Vec<Rsvp> = map
            .values()
            .filter(|r| r.trip_id == trip_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.member_id.cmp(&b.member_id));
        Ok(out)
    }

    async fn count_yes_by_trip(&self, trip_id: TripId) -> Result<u32, StoreError> {
        let map = self.inner.read()?;
        let n = map
            .values()
            .filter(|r| r.trip_id == trip_id && r.response == crate::domain::RsvpResponse::Yes)
            .count();
        Ok(n as u32)
    }
}

pub struct MemoryIdempotencyStore {
    inner: RwLock<HashMap<Fingerprint, IdempotencyRecord>>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryIdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn get(&self, fp: &Fingerprint) -> Result<Option<IdempotencyRecord>, StoreError> {
        let map = self.inner.read()?;
        Ok(map.get(fp).cloned())
    }

    async fn put(&self, fp: &Fingerprint, record: IdempotencyRecord) -> Result<(), StoreError> {
        let mut map = self.inner.write()?;
        map.insert(fp.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DraftVisibility, RsvpResponse, TripStatus};
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn member(name: &str, subject: &str) -> Member {
        Member {
            id: Uuid::new_v4(),
            subject: subject.to_string(),
            display_name: name.to_string(),
            email: format!("{subject}@x.io"),
            group_alias_email: None,
            vehicle_profile: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn draft(creator: MemberId) -> Trip {
        Trip {
            id: Uuid::new_v4(),
            status: TripStatus::Draft,
            name: Some("Rubicon Weekend".to_string()),
            description: None,
            creator_member_id: creator,
            organizer_member_ids: vec![creator],
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
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn member_subject_binding_is_unique_and_immutable() {
        let store = MemoryMemberStore::new();
        let m1 = member("Alice", "sub-1");
        store.create(&m1).await.unwrap();

        // Same subject, new id.
        let mut m2 = member("Alice Again", "sub-1");
        m2.id = Uuid::new_v4();
        assert!(matches!(
            store.create(&m2).await,
            Err(StoreError::SubjectAlreadyBound)
        ));

        // Rebinding on update is rejected.
        let mut changed = m1.clone();
        changed.subject = "sub-other".to_string();
        assert!(matches!(
            store.update(&changed).await,
            Err(StoreError::SubjectAlreadyBound)
        ));
    }

    #[tokio::test]
    async fn member_list_is_sorted_and_filters_inactive() {
        let store = MemoryMemberStore::new();
        let mut zed = member("zed", "s-z");
        zed.is_active = false;
        store.create(&zed).await.unwrap();
        store.create(&member("Bob", "s-b")).await.unwrap();
        store.create(&member("alice", "s-a")).await.unwrap();

        let active = store.list(false).await.unwrap();
        let names: Vec<_> = active.iter().map(|m| m.display_name.as_str()).collect();
        assert_eq!(names, vec!["alice", "Bob"]);

        let all = store.list(true).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn search_requires_all_tokens() {
        let store = MemoryMemberStore::new();
        store.create(&member("Alice Smith", "s-1")).await.unwrap();
        store.create(&member("Alice Jones", "s-2")).await.unwrap();
        store.create(&member("Bob Smith", "s-3")).await.unwrap();

        let hits = store
            .search_active_by_display_name("alice smith", 50)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].display_name, "Alice Smith");

        let hits = store
            .search_active_by_display_name("smith", 50)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);

        let hits = store.search_active_by_display_name("smith", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn trip_create_conflicts_on_same_id() {
        let store = MemoryTripStore::new();
        let t = draft(Uuid::new_v4());
        store.create(&t).await.unwrap();
        assert!(matches!(
            store.create(&t).await,
            Err(StoreError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn draft_listing_respects_visibility() {
        let store = MemoryTripStore::new();
        let creator = Uuid::new_v4();
        let organizer = Uuid::new_v4();
        let outsider = Uuid::new_v4();

        let private = draft(creator);
        store.create(&private).await.unwrap();

        let mut public = draft(creator);
        public.draft_visibility = Some(DraftVisibility::Public);
        public.organizer_member_ids.push(organizer);
        store.create(&public).await.unwrap();

        assert_eq!(store.list_drafts_visible_to(creator).await.unwrap().len(), 2);
        let for_org = store.list_drafts_visible_to(organizer).await.unwrap();
        assert_eq!(for_org.len(), 1);
        assert_eq!(for_org[0].id, public.id);
        assert!(store
            .list_drafts_visible_to(outsider)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn published_listing_sorted_with_dated_first() {
        let store = MemoryTripStore::new();
        let creator = Uuid::new_v4();

        let mut undated = draft(creator);
        undated.status = TripStatus::Published;
        undated.draft_visibility = None;
        store.create(&undated).await.unwrap();

        let mut dated = draft(creator);
        dated.status = TripStatus::Canceled;
        dated.draft_visibility = None;
        dated.start_date = NaiveDate::from_ymd_opt(2026, 10, 3);
        store.create(&dated).await.unwrap();

        let listed = store.list_published_and_canceled().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, dated.id);
        assert_eq!(listed[1].id, undated.id);
    }

    #[tokio::test]
    async fn rsvp_upsert_is_last_write_wins() {
        let store = MemoryRsvpStore::new();
        let (trip_id, member_id) = (Uuid::new_v4(), Uuid::new_v4());
        let mut r = Rsvp {
            trip_id,
            member_id,
            response: RsvpResponse::Yes,
            updated_at: Utc::now(),
        };
        store.upsert(&r).await.unwrap();
        assert_eq!(store.count_yes_by_trip(trip_id).await.unwrap(), 1);

        r.response = RsvpResponse::No;
        store.upsert(&r).await.unwrap();
        assert_eq!(store.count_yes_by_trip(trip_id).await.unwrap(), 0);
        assert_eq!(
            store.get(trip_id, member_id).await.unwrap().response,
            RsvpResponse::No
        );
        assert_eq!(store.list_by_trip(trip_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unset_records_count_as_not_yes() {
        let store = MemoryRsvpStore::new();
        let trip_id = Uuid::new_v4();
        store
            .upsert(&Rsvp {
                trip_id,
                member_id: Uuid::new_v4(),
                response: RsvpResponse::Unset,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(store.count_yes_by_trip(trip_id).await.unwrap(), 0);
        assert_eq!(store.list_by_trip(trip_id).await.unwrap().len(), 1);
    }
}
