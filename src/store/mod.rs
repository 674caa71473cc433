//! Storage ports.
//!
//! Each port is a capability interface with two conforming backends: an
//! in-memory one (`memory`) and a relational one (`postgres`). Both must
//! behave identically with respect to these contracts; the contract tests in
//! `memory.rs` encode the shared expectations.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Member, MemberId, Rsvp, Trip, TripId};
use crate::idempotency::{Fingerprint, IdempotencyRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    AlreadyExists,
    #[error("subject already bound to a member")]
    SubjectAlreadyBound,
    #[error("backend error: {0}")]
    Backend(String),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        StoreError::Backend(format!("lock poisoned: {err}"))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Persisted members. Ordering contract: list/search results come back
/// sorted by `lower(display_name)` ascending, then id.
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Fails with `AlreadyExists` on id collision and `SubjectAlreadyBound`
    /// when the subject is already bound to a member.
    async fn create(&self, member: &Member) -> Result<(), StoreError>;

    /// Full-record update. The subject binding is immutable; an attempt to
    /// change it fails with `SubjectAlreadyBound`.
    async fn update(&self, member: &Member) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: MemberId) -> Result<Member, StoreError>;

    async fn get_by_subject(&self, subject: &str) -> Result<Member, StoreError>;

    async fn list(&self, include_inactive: bool) -> Result<Vec<Member>, StoreError>;

    /// Tokenized, case-insensitive substring match on display name over
    /// active members. Query validation (minimum length) happens at the
    /// service layer.
    async fn search_active_by_display_name(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Member>, StoreError>;
}

/// Persisted trips. List results come back in the canonical listing order
/// (startDate ascending, dated first, then createdAt, then id).
#[async_trait]
pub trait TripStore: Send + Sync {
    async fn create(&self, trip: &Trip) -> Result<(), StoreError>;

    /// Full-object update of an existing trip.
    async fn save(&self, trip: &Trip) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: TripId) -> Result<Trip, StoreError>;

    async fn list_published_and_canceled(&self) -> Result<Vec<Trip>, StoreError>;

    /// Draft trips visible to the caller: PUBLIC drafts where the caller is
    /// an organizer, PRIVATE drafts the caller created. The predicate is
    /// evaluated at the store but must match the domain visibility rule.
    async fn list_drafts_visible_to(&self, caller: MemberId) -> Result<Vec<Trip>, StoreError>;
}

#[async_trait]
pub trait RsvpStore: Send + Sync {
    async fn get(&self, trip_id: TripId, member_id: MemberId) -> Result<Rsvp, StoreError>;

    /// Last-write-wins upsert keyed by (trip, member).
    async fn upsert(&self, rsvp: &Rsvp) -> Result<(), StoreError>;

    async fn list_by_trip(&self, trip_id: TripId) -> Result<Vec<Rsvp>, StoreError>;

    async fn count_yes_by_trip(&self, trip_id: TripId) -> Result<u32, StoreError>;
}

/// Opaque key-value store with overwrite-on-put semantics. Retention is the
/// store's concern; the core never expires records.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get(&self, fp: &Fingerprint) -> Result<Option<IdempotencyRecord>, StoreError>;

    async fn put(&self, fp: &Fingerprint, record: IdempotencyRecord) -> Result<(), StoreError>;
}

/// The bundle of ports a running backend hands to the services.
#[derive(Clone)]
pub struct Storage {
    pub members: Arc<dyn MemberStore>,
    pub trips: Arc<dyn TripStore>,
    pub rsvps: Arc<dyn RsvpStore>,
    pub idempotency: Arc<dyn IdempotencyStore>,
}

impl Storage {
    pub fn memory() -> Self {
        Self {
            members: Arc::new(memory::MemoryMemberStore::new()),
            trips: Arc::new(memory::MemoryTripStore::new()),
            rsvps: Arc::new(memory::MemoryRsvpStore::new()),
            idempotency: Arc::new(memory::MemoryIdempotencyStore::new()),
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            members: Arc::new(postgres::PostgresMemberStore::new(pool.clone())),
            trips: Arc::new(postgres::PostgresTripStore::new(pool.clone())),
            rsvps: Arc::new(postgres::PostgresRsvpStore::new(pool.clone())),
            idempotency: Arc::new(postgres::PostgresIdempotencyStore::new(pool)),
        }
    }
}
