//! Replay-safe idempotency for mutating requests.
//!
//! A request carrying an `Idempotency-Key` header is identified by a
//! fingerprint of (key, subject, method, route pattern, canonical body
//! hash). The protocol:
//!
//! 1. Look up the meta fingerprint (empty body hash). A hit with a different
//!    stored body hash means the key was reused for a different payload →
//!    `IDEMPOTENCY_KEY_REUSE`.
//! 2. Look up the full fingerprint. A recorded response (status ≥ 200) is
//!    replayed verbatim.
//! 3. Otherwise record the meta marker, execute the use case, and persist
//!    the successful response for later replay.
//!
//! The body hash is computed over the *canonicalized* body (names
//! normalized, emails trimmed) so syntactically different bodies that mean
//! the same thing share a fingerprint.

use axum::http::{header, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::{Subject, TripId};
use crate::errors::AppError;
use crate::store::IdempotencyStore;

/// Uniquely identifies a retryable operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub key: String,
    pub subject: Subject,
    pub method: String,
    /// Normalized route pattern, e.g. `PUT /trips/{tripId}/rsvp` uses
    /// `/trips/{tripId}/rsvp`.
    pub route: String,
    pub body_hash: String,
}

impl Fingerprint {
    pub fn new(key: &str, subject: &str, method: &str, route: &str, body_hash: &str) -> Self {
        Self {
            key: key.to_string(),
            subject: subject.to_string(),
            method: method.to_string(),
            route: route.to_string(),
            body_hash: body_hash.to_string(),
        }
    }

    /// The key-scoped fingerprint with the body hash blanked, used to detect
    /// key reuse across different payloads.
    pub fn meta(&self) -> Fingerprint {
        Fingerprint {
            body_hash: String::new(),
            ..self.clone()
        }
    }
}

/// The stored response we can replay for a duplicate request.
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    pub status_code: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash a canonicalized body. Callers apply semantic normalization to the
/// value before passing it here.
pub fn canonical_body_hash<T: Serialize>(body: &T) -> Result<String, AppError> {
    let raw = serde_json::to_vec(body)
        .map_err(|e| AppError::Internal(format!("canonicalize body: {e}")))?;
    Ok(sha256_hex(&raw))
}

/// Wrapper hashed for trip-scoped routes so the same body against different
/// trips never collides.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripScoped<'a, T: Serialize> {
    pub trip_id: TripId,
    pub body: &'a T,
}

/// Outcome of the pre-execution check.
#[derive(Debug)]
pub enum Precheck {
    /// A stored response exists for this exact fingerprint; replay it.
    Replay(IdempotencyRecord),
    /// No stored response; execute the use case.
    Execute,
}

/// Run steps 1–2 of the protocol and record the meta marker when this is the
/// first sighting of the key.
pub async fn precheck(store: &dyn IdempotencyStore, fp: &Fingerprint) -> Result<Precheck, AppError> {
    let meta = fp.meta();
    match store.get(&meta).await? {
        Some(marker) => {
            if marker.body != fp.body_hash.as_bytes() {
                return Err(AppError::IdempotencyKeyReuse);
            }
        }
        None => {
            let marker = IdempotencyRecord {
                status_code: 0,
                content_type: "text/plain".to_string(),
                body: fp.body_hash.clone().into_bytes(),
                created_at: Utc::now(),
            };
            store.put(&meta, marker).await?;
        }
    }

    match store.get(fp).await? {
        Some(rec) if rec.status_code >= 200 => Ok(Precheck::Replay(rec)),
        _ => Ok(Precheck::Execute),
    }
}

/// Persist a successful response for replay (step 4).
pub async fn record_response(
    store: &dyn IdempotencyStore,
    fp: &Fingerprint,
    status: StatusCode,
    body: Vec<u8>,
) -> Result<(), AppError> {
    let rec = IdempotencyRecord {
        status_code: status.as_u16(),
        content_type: "application/json".to_string(),
        body,
        created_at: Utc::now(),
    };
    store.put(fp, rec).await?;
    Ok(())
}

/// Rebuild the stored response verbatim.
pub fn replay_response(rec: IdempotencyRecord) -> Response {
    let mut resp = Response::new(axum::body::Body::from(rec.body));
    *resp.status_mut() = StatusCode::from_u16(rec.status_code).unwrap_or(StatusCode::OK);
    if let Ok(value) = header::HeaderValue::from_str(&rec.content_type) {
        resp.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryIdempotencyStore;

    fn fp(hash: &str) -> Fingerprint {
        Fingerprint::new("k1", "sub-1", "POST", "/trips", hash)
    }

    #[test]
    fn canonical_hash_is_stable() {
        #[derive(Serialize)]
        struct Body {
            name: String,
        }
        let a = canonical_body_hash(&Body {
            name: "Snow Run".into(),
        })
        .unwrap();
        let b = canonical_body_hash(&Body {
            name: "Snow Run".into(),
        })
        .unwrap();
        assert_eq!(a, b);
        let c = canonical_body_hash(&Body {
            name: "Other".into(),
        })
        .unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn first_sighting_records_marker_and_executes() {
        let store = MemoryIdempotencyStore::new();
        let fp = fp("abc");
        match precheck(&store, &fp).await.unwrap() {
            Precheck::Execute => {}
            Precheck::Replay(_) => panic!("expected execute"),
        }
        // Marker is in place for the meta fingerprint.
        let marker = store.get(&fp.meta()).await.unwrap().unwrap();
        assert_eq!(marker.body, b"abc");
        assert_eq!(marker.status_code, 0);
    }

    #[tokio::test]
    async fn key_reuse_with_different_payload_is_rejected() {
        let store = MemoryIdempotencyStore::new();
        precheck(&store, &fp("abc")).await.unwrap();
        let err = precheck(&store, &fp("zzz")).await.unwrap_err();
        assert!(matches!(err, AppError::IdempotencyKeyReuse));
    }

    #[tokio::test]
    async fn recorded_response_replays() {
        let store = MemoryIdempotencyStore::new();
        let fp = fp("abc");
        precheck(&store, &fp).await.unwrap();
        record_response(&store, &fp, StatusCode::CREATED, b"{\"tripId\":\"t\"}".to_vec())
            .await
            .unwrap();
        match precheck(&store, &fp).await.unwrap() {
            Precheck::Replay(rec) => {
                assert_eq!(rec.status_code, 201);
                assert_eq!(rec.body, b"{\"tripId\":\"t\"}");
            }
            Precheck::Execute => panic!("expected replay"),
        }
    }
}
