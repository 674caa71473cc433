//! Postgres storage backend.
//!
//! Uses runtime queries against a `PgPool`; the schema (including the
//! database-level invariants from the domain model) is embedded and applied
//! at startup. Multi-statement writes run inside transactions, and `save`
//! takes a row lock on the trip for the duration of its transaction.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use crate::domain::{
    ArtifactType, DraftVisibility, Location, Member, MemberId, Rsvp, RsvpResponse, Trip,
    TripArtifact, TripId, TripStatus, VehicleProfile,
};
use crate::idempotency::{Fingerprint, IdempotencyRecord};

use super::{IdempotencyStore, MemberStore, RsvpStore, StoreError, TripStore};

/// Initialize the connection pool and apply the embedded schema.
pub async fn init_database(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    apply_schema(&pool).await?;
    Ok(pool)
}

/// Apply the schema. Idempotent; constraints mirror the domain invariants:
/// unique subject, unique case-insensitive email, status-consistent draft
/// visibility, positive capacity, ordered dates, paired coordinates,
/// at-least-one-organizer (before-delete trigger), and RSVP writes only
/// while published (trigger).
async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            id UUID PRIMARY KEY,
            subject TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            email TEXT NOT NULL,
            group_alias_email TEXT,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_members_email_lower ON members (lower(email));
        CREATE INDEX IF NOT EXISTS idx_members_display_name ON members (lower(display_name));

        CREATE TABLE IF NOT EXISTS vehicle_profiles (
            member_id UUID PRIMARY KEY REFERENCES members(id) ON DELETE CASCADE,
            make TEXT,
            model TEXT,
            tire_size TEXT,
            lift_lockers TEXT,
            fuel_range TEXT,
            recovery_gear TEXT,
            ham_radio_call_sign TEXT,
            notes TEXT
        );

        CREATE TABLE IF NOT EXISTS trips (
            id UUID PRIMARY KEY,
            status TEXT NOT NULL CHECK (status IN ('DRAFT','PUBLISHED','CANCELED')),
            name TEXT,
            description TEXT,
            creator_member_id UUID NOT NULL REFERENCES members(id),
            draft_visibility TEXT CHECK (draft_visibility IN ('PRIVATE','PUBLIC')),
            start_date DATE,
            end_date DATE,
            capacity_rigs INTEGER CHECK (capacity_rigs >= 1),
            attending_rigs INTEGER CHECK (attending_rigs >= 0),
            difficulty_text TEXT,
            meeting_location_label TEXT,
            meeting_location_address TEXT,
            meeting_location_latitude DOUBLE PRECISION,
            meeting_location_longitude DOUBLE PRECISION,
            comms_requirements_text TEXT,
            recommended_requirements_text TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            CHECK ((status = 'DRAFT') = (draft_visibility IS NOT NULL)),
            CHECK (start_date IS NULL OR end_date IS NULL OR start_date <= end_date),
            CHECK ((meeting_location_latitude IS NULL) = (meeting_location_longitude IS NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_trips_status ON trips (status);
        CREATE INDEX IF NOT EXISTS idx_trips_start_date ON trips (start_date);

        CREATE TABLE IF NOT EXISTS trip_organizers (
            trip_id UUID NOT NULL REFERENCES trips(id) ON DELETE CASCADE,
            member_id UUID NOT NULL REFERENCES members(id),
            position INTEGER NOT NULL,
            PRIMARY KEY (trip_id, member_id)
        );

        CREATE OR REPLACE FUNCTION trip_organizers_guard_last() RETURNS TRIGGER AS $$
        BEGIN
            IF (SELECT count(*) FROM trip_organizers WHERE trip_id = OLD.trip_id) <= 1 THEN
                RAISE EXCEPTION 'cannot remove the last organizer for trip %', OLD.trip_id;
            END IF;
            RETURN OLD;
        END;
        $$ LANGUAGE plpgsql;

        DROP TRIGGER IF EXISTS trg_trip_organizers_last ON trip_organizers;
        CREATE TRIGGER trg_trip_organizers_last
            BEFORE DELETE ON trip_organizers
            FOR EACH ROW EXECUTE FUNCTION trip_organizers_guard_last();

        CREATE TABLE IF NOT EXISTS trip_artifacts (
            trip_id UUID NOT NULL REFERENCES trips(id) ON DELETE CASCADE,
            artifact_id TEXT NOT NULL,
            artifact_type TEXT NOT NULL CHECK (artifact_type IN ('GPX','SCHEDULE','DOCUMENT','OTHER')),
            title TEXT NOT NULL,
            url TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (trip_id, artifact_id)
        );

        CREATE TABLE IF NOT EXISTS trip_rsvps (
            trip_id UUID NOT NULL REFERENCES trips(id) ON DELETE CASCADE,
            member_id UUID NOT NULL REFERENCES members(id),
            response TEXT NOT NULL CHECK (response IN ('YES','NO','UNSET')),
            updated_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (trip_id, member_id)
        );

        CREATE OR REPLACE FUNCTION trip_rsvps_guard_published() RETURNS TRIGGER AS $$
        BEGIN
            IF (SELECT status FROM trips WHERE id = NEW.trip_id) <> 'PUBLISHED' THEN
                RAISE EXCEPTION 'rsvp changes are only allowed while trip % is published', NEW.trip_id;
            END IF;
            RETURN NEW;
        END;
        $$ LANGUAGE plpgsql;

        DROP TRIGGER IF EXISTS trg_trip_rsvps_published ON trip_rsvps;
        CREATE TRIGGER trg_trip_rsvps_published
            BEFORE INSERT OR UPDATE ON trip_rsvps
            FOR EACH ROW EXECUTE FUNCTION trip_rsvps_guard_published();

        CREATE TABLE IF NOT EXISTS idempotency_keys (
            idempotency_key TEXT NOT NULL,
            subject TEXT NOT NULL,
            method TEXT NOT NULL,
            route TEXT NOT NULL,
            body_hash TEXT NOT NULL,
            status_code INTEGER NOT NULL,
            content_type TEXT NOT NULL,
            body BYTEA NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (idempotency_key, subject, method, route, body_hash)
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

fn map_unique_violation(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            return match db.constraint() {
                Some("members_subject_key") => StoreError::SubjectAlreadyBound,
                _ => StoreError::AlreadyExists,
            };
        }
    }
    err.into()
}

const MEMBER_COLUMNS: &str = "m.id, m.subject, m.display_name, m.email, m.group_alias_email, \
     m.is_active, m.created_at, m.updated_at, \
     v.member_id AS vp_member_id, v.make, v.model, v.tire_size, v.lift_lockers, \
     v.fuel_range, v.recovery_gear, v.ham_radio_call_sign, v.notes";

fn member_from_row(row: &PgRow) -> Member {
    let vehicle_profile = row
        .get::<Option<Uuid>, _>("vp_member_id")
        .map(|_| VehicleProfile {
            make: row.get("make"),
            model: row.get("model"),
            tire_size: row.get("tire_size"),
            lift_lockers: row.get("lift_lockers"),
            fuel_range: row.get("fuel_range"),
            recovery_gear: row.get("recovery_gear"),
            ham_radio_call_sign: row.get("ham_radio_call_sign"),
            notes: row.get("notes"),
        });
    Member {
        id: row.get("id"),
        subject: row.get("subject"),
        display_name: row.get("display_name"),
        email: row.get("email"),
        group_alias_email: row.get("group_alias_email"),
        vehicle_profile,
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub struct PostgresMemberStore {
    pool: PgPool,
}

impl PostgresMemberStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemberStore for PostgresMemberStore {
    async fn create(&self, member: &Member) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO members (id, subject, display_name, email, group_alias_email, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(member.id)
        .bind(&member.subject)
        .bind(&member.display_name)
        .bind(&member.email)
        .bind(&member.group_alias_email)
        .bind(member.is_active)
        .bind(member.created_at)
        .bind(member.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        if let Some(vp) = &member.vehicle_profile {
            insert_vehicle_profile(&mut tx, member.id, vp).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, member: &Member) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT subject FROM members WHERE id = $1 FOR UPDATE")
            .bind(member.id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;
        let existing_subject: String = row.get("subject");
        if existing_subject != member.subject {
            return Err(StoreError::SubjectAlreadyBound);
        }

        sqlx::query(
            "UPDATE members SET display_name = $2, email = $3, group_alias_email = $4, \
             is_active = $5, updated_at = $6 WHERE id = $1",
        )
        .bind(member.id)
        .bind(&member.display_name)
        .bind(&member.email)
        .bind(&member.group_alias_email)
        .bind(member.is_active)
        .bind(member.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        sqlx::query("DELETE FROM vehicle_profiles WHERE member_id = $1")
            .bind(member.id)
            .execute(&mut *tx)
            .await?;
        if let Some(vp) = &member.vehicle_profile {
            insert_vehicle_profile(&mut tx, member.id, vp).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_by_id(&self, id: MemberId) -> Result<Member, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members m \
             LEFT JOIN vehicle_profiles v ON v.member_id = m.id WHERE m.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(member_from_row(&row))
    }

    async fn get_by_subject(&self, subject: &str) -> Result<Member, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members m \
             LEFT JOIN vehicle_profiles v ON v.member_id = m.id WHERE m.subject = $1"
        ))
        .bind(subject)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(member_from_row(&row))
    }

    async fn list(&self, include_inactive: bool) -> Result<Vec<Member>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members m \
             LEFT JOIN vehicle_profiles v ON v.member_id = m.id \
             WHERE $1 OR m.is_active \
             ORDER BY lower(m.display_name) ASC, m.id ASC"
        ))
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(member_from_row).collect())
    }

    async fn search_active_by_display_name(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Member>, StoreError> {
        let tokens: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {MEMBER_COLUMNS} FROM members m \
             LEFT JOIN vehicle_profiles v ON v.member_id = m.id WHERE m.is_active"
        ));
        for token in &tokens {
            qb.push(" AND lower(m.display_name) LIKE ");
            qb.push_bind(format!("%{}%", escape_like(token)));
        }
        qb.push(" ORDER BY lower(m.display_name) ASC, m.id ASC LIMIT ");
        qb.push_bind(limit as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(member_from_row).collect())
    }
}

async fn insert_vehicle_profile(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    member_id: MemberId,
    vp: &VehicleProfile,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO vehicle_profiles (member_id, make, model, tire_size, lift_lockers, \
         fuel_range, recovery_gear, ham_radio_call_sign, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(member_id)
    .bind(&vp.make)
    .bind(&vp.model)
    .bind(&vp.tire_size)
    .bind(&vp.lift_lockers)
    .bind(&vp.fuel_range)
    .bind(&vp.recovery_gear)
    .bind(&vp.ham_radio_call_sign)
    .bind(&vp.notes)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn escape_like(token: &str) -> String {
    token
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

const TRIP_COLUMNS: &str = "id, status, name, description, creator_member_id, draft_visibility, \
     start_date, end_date, capacity_rigs, attending_rigs, difficulty_text, \
     meeting_location_label, meeting_location_address, meeting_location_latitude, \
     meeting_location_longitude, comms_requirements_text, recommended_requirements_text, \
     created_at, updated_at";

fn trip_from_row(row: &PgRow) -> Result<Trip, StoreError> {
    let status_raw: String = row.get("status");
    let status = TripStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Backend(format!("unknown trip status: {status_raw}")))?;
    let draft_visibility = row
        .get::<Option<String>, _>("draft_visibility")
        .map(|raw| {
            DraftVisibility::parse(&raw)
                .ok_or_else(|| StoreError::Backend(format!("unknown draft visibility: {raw}")))
        })
        .transpose()?;
    let meeting_location = row
        .get::<Option<String>, _>("meeting_location_label")
        .map(|label| Location {
            label,
            address: row.get("meeting_location_address"),
            latitude: row.get("meeting_location_latitude"),
            longitude: row.get("meeting_location_longitude"),
        });

    Ok(Trip {
        id: row.get("id"),
        status,
        name: row.get("name"),
        description: row.get("description"),
        creator_member_id: row.get("creator_member_id"),
        organizer_member_ids: Vec::new(),
        draft_visibility,
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        capacity_rigs: row.get::<Option<i32>, _>("capacity_rigs").map(|v| v as u32),
        attending_rigs: row
            .get::<Option<i32>, _>("attending_rigs")
            .map(|v| v as u32),
        difficulty_text: row.get("difficulty_text"),
        meeting_location,
        comms_requirements_text: row.get("comms_requirements_text"),
        recommended_requirements_text: row.get("recommended_requirements_text"),
        artifacts: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

pub struct PostgresTripStore {
    pool: PgPool,
}

impl PostgresTripStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, mut trip: Trip) -> Result<Trip, StoreError> {
        let organizer_rows = sqlx::query(
            "SELECT member_id FROM trip_organizers WHERE trip_id = $1 ORDER BY position ASC",
        )
        .bind(trip.id)
        .fetch_all(&self.pool)
        .await?;
        trip.organizer_member_ids = organizer_rows
            .iter()
            .map(|r| r.get::<Uuid, _>("member_id"))
            .collect();

        let artifact_rows = sqlx::query(
            "SELECT artifact_id, artifact_type, title, url FROM trip_artifacts \
             WHERE trip_id = $1 ORDER BY position ASC",
        )
        .bind(trip.id)
        .fetch_all(&self.pool)
        .await?;
        trip.artifacts = artifact_rows
            .iter()
            .map(|r| {
                let type_raw: String = r.get("artifact_type");
                let artifact_type = ArtifactType::parse(&type_raw).ok_or_else(|| {
                    StoreError::Backend(format!("unknown artifact type: {type_raw}"))
                })?;
                Ok(TripArtifact {
                    artifact_id: r.get("artifact_id"),
                    artifact_type,
                    title: r.get("title"),
                    url: r.get("url"),
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(trip)
    }

    async fn hydrate_all(&self, trips: Vec<Trip>) -> Result<Vec<Trip>, StoreError> {
        let mut out = Vec::with_capacity(trips.len());
        for trip in trips {
            out.push(self.hydrate(trip).await?);
        }
        Ok(out)
    }
}

#[async_trait]
impl TripStore for PostgresTripStore {
    async fn create(&self, trip: &Trip) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "INSERT INTO trips ({TRIP_COLUMNS}) VALUES \
             ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)"
        ))
        .bind(trip.id)
        .bind(trip.status.as_str())
        .bind(&trip.name)
        .bind(&trip.description)
        .bind(trip.creator_member_id)
        .bind(trip.draft_visibility.map(|v| v.as_str()))
        .bind(trip.start_date)
        .bind(trip.end_date)
        .bind(trip.capacity_rigs.map(|v| v as i32))
        .bind(trip.attending_rigs.map(|v| v as i32))
        .bind(&trip.difficulty_text)
        .bind(trip.meeting_location.as_ref().map(|l| l.label.clone()))
        .bind(trip.meeting_location.as_ref().and_then(|l| l.address.clone()))
        .bind(trip.meeting_location.as_ref().and_then(|l| l.latitude))
        .bind(trip.meeting_location.as_ref().and_then(|l| l.longitude))
        .bind(&trip.comms_requirements_text)
        .bind(&trip.recommended_requirements_text)
        .bind(trip.created_at)
        .bind(trip.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        sync_organizers(&mut tx, trip.id, &trip.organizer_member_ids).await?;
        sync_artifacts(&mut tx, trip.id, &trip.artifacts).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save(&self, trip: &Trip) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        // Row lock for the duration of the transaction.
        sqlx::query("SELECT id FROM trips WHERE id = $1 FOR UPDATE")
            .bind(trip.id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;

        sqlx::query(
            "UPDATE trips SET status = $2, name = $3, description = $4, draft_visibility = $5, \
             start_date = $6, end_date = $7, capacity_rigs = $8, attending_rigs = $9, \
             difficulty_text = $10, meeting_location_label = $11, meeting_location_address = $12, \
             meeting_location_latitude = $13, meeting_location_longitude = $14, \
             comms_requirements_text = $15, recommended_requirements_text = $16, updated_at = $17 \
             WHERE id = $1",
        )
        .bind(trip.id)
        .bind(trip.status.as_str())
        .bind(&trip.name)
        .bind(&trip.description)
        .bind(trip.draft_visibility.map(|v| v.as_str()))
        .bind(trip.start_date)
        .bind(trip.end_date)
        .bind(trip.capacity_rigs.map(|v| v as i32))
        .bind(trip.attending_rigs.map(|v| v as i32))
        .bind(&trip.difficulty_text)
        .bind(trip.meeting_location.as_ref().map(|l| l.label.clone()))
        .bind(trip.meeting_location.as_ref().and_then(|l| l.address.clone()))
        .bind(trip.meeting_location.as_ref().and_then(|l| l.latitude))
        .bind(trip.meeting_location.as_ref().and_then(|l| l.longitude))
        .bind(&trip.comms_requirements_text)
        .bind(&trip.recommended_requirements_text)
        .bind(trip.updated_at)
        .execute(&mut *tx)
        .await?;

        sync_organizers(&mut tx, trip.id, &trip.organizer_member_ids).await?;
        sync_artifacts(&mut tx, trip.id, &trip.artifacts).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_by_id(&self, id: TripId) -> Result<Trip, StoreError> {
        let row = sqlx::query(&format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        self.hydrate(trip_from_row(&row)?).await
    }

    async fn list_published_and_canceled(&self) -> Result<Vec<Trip>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE status IN ('PUBLISHED','CANCELED') \
             ORDER BY start_date ASC NULLS LAST, created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        let trips = rows
            .iter()
            .map(trip_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        self.hydrate_all(trips).await
    }

    async fn list_drafts_visible_to(&self, caller: MemberId) -> Result<Vec<Trip>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE status = 'DRAFT' AND ( \
                 (draft_visibility = 'PRIVATE' AND creator_member_id = $1) OR \
                 (draft_visibility = 'PUBLIC' AND EXISTS ( \
                     SELECT 1 FROM trip_organizers o \
                     WHERE o.trip_id = trips.id AND o.member_id = $1)) \
             ) ORDER BY start_date ASC NULLS LAST, created_at ASC, id ASC"
        ))
        .bind(caller)
        .fetch_all(&self.pool)
        .await?;
        let trips = rows
            .iter()
            .map(trip_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        self.hydrate_all(trips).await
    }
}

/// Upsert the new organizer set, then remove rows that fell out of it. The
/// insert-before-delete order keeps the last-organizer trigger satisfied
/// while the set is being replaced.
async fn sync_organizers(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    trip_id: TripId,
    organizer_ids: &[MemberId],
) -> Result<(), StoreError> {
    for (position, member_id) in organizer_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO trip_organizers (trip_id, member_id, position) VALUES ($1, $2, $3) \
             ON CONFLICT (trip_id, member_id) DO UPDATE SET position = EXCLUDED.position",
        )
        .bind(trip_id)
        .bind(member_id)
        .bind(position as i32)
        .execute(&mut **tx)
        .await?;
    }
    sqlx::query("DELETE FROM trip_organizers WHERE trip_id = $1 AND NOT (member_id = ANY($2))")
        .bind(trip_id)
        .bind(organizer_ids)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn sync_artifacts(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    trip_id: TripId,
    artifacts: &[TripArtifact],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM trip_artifacts WHERE trip_id = $1")
        .bind(trip_id)
        .execute(&mut **tx)
        .await?;
    for (position, artifact) in artifacts.iter().enumerate() {
        sqlx::query(
            "INSERT INTO trip_artifacts (trip_id, artifact_id, artifact_type, title, url, position) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(trip_id)
        .bind(&artifact.artifact_id)
        .bind(artifact.artifact_type.as_str())
        .bind(&artifact.title)
        .bind(&artifact.url)
        .bind(position as i32)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub struct PostgresRsvpStore {
    pool: PgPool,
}

impl PostgresRsvpStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn rsvp_from_row(row: &PgRow) -> Result<Rsvp, StoreError> {
    let response_raw: String = row.get("response");
    let response = RsvpResponse::parse(&response_raw)
        .ok_or_else(|| StoreError::Backend(format!("unknown rsvp response: {response_raw}")))?;
    Ok(Rsvp {
        trip_id: row.get("trip_id"),
        member_id: row.get("member_id"),
        response,
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl RsvpStore for PostgresRsvpStore {
    async fn get(&self, trip_id: TripId, member_id: MemberId) -> Result<Rsvp, StoreError> {
        let row = sqlx::query(
            "SELECT trip_id, member_id, response, updated_at FROM trip_rsvps \
             WHERE trip_id = $1 AND member_id = $2",
        )
        .bind(trip_id)
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        rsvp_from_row(&row)
    }

    async fn upsert(&self, rsvp: &Rsvp) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO trip_rsvps (trip_id, member_id, response, updated_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (trip_id, member_id) DO UPDATE SET \
             response = EXCLUDED.response, updated_at = EXCLUDED.updated_at",
        )
        .bind(rsvp.trip_id)
        .bind(rsvp.member_id)
        .bind(rsvp.response.as_str())
        .bind(rsvp.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_trip(&self, trip_id: TripId) -> Result<Vec<Rsvp>, StoreError> {
        let rows = sqlx::query(
            "SELECT trip_id, member_id, response, updated_at FROM trip_rsvps \
             WHERE trip_id = $1 ORDER BY member_id ASC",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(rsvp_from_row).collect()
    }

    async fn count_yes_by_trip(&self, trip_id: TripId) -> Result<u32, StoreError> {
        let row = sqlx::query(
            "SELECT count(*) AS yes_count FROM trip_rsvps WHERE trip_id = $1 AND response = 'YES'",
        )
        .bind(trip_id)
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.get("yes_count");
        Ok(count as u32)
    }
}

pub struct PostgresIdempotencyStore {
    pool: PgPool,
}

impl PostgresIdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyStore for PostgresIdempotencyStore {
    async fn get(&self, fp: &Fingerprint) -> Result<Option<IdempotencyRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT status_code, content_type, body, created_at FROM idempotency_keys \
             WHERE idempotency_key = $1 AND subject = $2 AND method = $3 \
             AND route = $4 AND body_hash = $5",
        )
        .bind(&fp.key)
        .bind(&fp.subject)
        .bind(&fp.method)
        .bind(&fp.route)
        .bind(&fp.body_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| IdempotencyRecord {
            status_code: r.get::<i32, _>("status_code") as u16,
            content_type: r.get("content_type"),
            body: r.get("body"),
            created_at: r.get("created_at"),
        }))
    }

    async fn put(&self, fp: &Fingerprint, record: IdempotencyRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO idempotency_keys \
             (idempotency_key, subject, method, route, body_hash, status_code, content_type, body, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (idempotency_key, subject, method, route, body_hash) DO UPDATE SET \
             status_code = EXCLUDED.status_code, content_type = EXCLUDED.content_type, \
             body = EXCLUDED.body, created_at = EXCLUDED.created_at",
        )
        .bind(&fp.key)
        .bind(&fp.subject)
        .bind(&fp.method)
        .bind(&fp.route)
        .bind(&fp.body_hash)
        .bind(record.status_code as i32)
        .bind(&record.content_type)
        .bind(&record.body)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
