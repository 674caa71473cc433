//! Application services: the use-case layer between the HTTP adapter and the
//! storage ports.

pub mod members;
pub mod rsvps;
pub mod trips;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::TripId;

/// Time source for the services. An interface so tests can pin the clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Per-trip mutual exclusion for counting and set-cardinality invariants
/// (RSVP capacity, last-organizer). Every trip-mutating use case serializes
/// on the trip's lock; reads go lock-free.
///
/// Entries are never reclaimed. A community's trip count is small and each
/// entry is one `Arc<Mutex>`.
pub struct TripLocks {
    inner: Mutex<HashMap<TripId, Arc<Mutex<()>>>>,
}

impl TripLocks {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, trip_id: TripId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.inner.lock().await;
            table
                .entry(trip_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl Default for TripLocks {
    fn default() -> Self {
        Self::new()
    }
}
