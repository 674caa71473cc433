//! Centralized error types with mapping to HTTP status codes and the JSON
//! error envelope `{"error":{"code","message","details"?,"requestId"?}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const MEMBER_NOT_PROVISIONED: &str = "MEMBER_NOT_PROVISIONED";
    pub const MEMBER_ALREADY_EXISTS: &str = "MEMBER_ALREADY_EXISTS";
    pub const EMAIL_ALREADY_IN_USE: &str = "EMAIL_ALREADY_IN_USE";
    pub const TRIP_NOT_FOUND: &str = "TRIP_NOT_FOUND";
    pub const TRIP_ID_CONFLICT: &str = "TRIP_ID_CONFLICT";
    pub const TRIP_CANCELED: &str = "TRIP_CANCELED";
    pub const TRIP_NOT_DRAFT: &str = "TRIP_NOT_DRAFT";
    pub const TRIP_PRIVATE_DRAFT: &str = "TRIP_PRIVATE_DRAFT";
    pub const TRIP_NOT_READY_TO_PUBLISH: &str = "TRIP_NOT_READY_TO_PUBLISH";
    pub const CAPACITY_BELOW_ATTENDANCE: &str = "CAPACITY_BELOW_ATTENDANCE";
    pub const TRIP_AT_CAPACITY: &str = "TRIP_AT_CAPACITY";
    pub const TRIP_NOT_PUBLISHED: &str = "TRIP_NOT_PUBLISHED";
    pub const TRIP_MISSING_CAPACITY: &str = "TRIP_MISSING_CAPACITY";
    pub const RSVP_NOT_AVAILABLE: &str = "RSVP_NOT_AVAILABLE";
    pub const RSVP_NOT_FOUND: &str = "RSVP_NOT_FOUND";
    pub const LAST_ORGANIZER: &str = "LAST_ORGANIZER";
    pub const IDEMPOTENCY_KEY_REUSE: &str = "IDEMPOTENCY_KEY_REUSE";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Application error. Every variant maps to exactly one HTTP status and one
/// stable code token.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),

    /// The gate form: authenticated but no member bound (401).
    #[error("No member profile exists for the authenticated subject.")]
    CallerNotProvisioned,

    /// The profile-lookup form of the same condition (404 on /members/me).
    #[error("No member profile exists for the authenticated subject.")]
    MemberNotProvisioned,

    #[error("A member profile already exists for the authenticated subject.")]
    MemberAlreadyExists,

    #[error("email address is already in use")]
    EmailAlreadyInUse,

    #[error("trip not found")]
    TripNotFound,

    #[error("trip id conflict")]
    TripIdConflict,

    #[error("trip is canceled and cannot be modified")]
    TripCanceled,

    #[error("trip is not a draft")]
    TripNotDraft,

    #[error("private drafts cannot be published")]
    TripPrivateDraft,

    #[error("trip is missing required fields for publish")]
    TripNotReadyToPublish { missing: Vec<&'static str> },

    #[error("capacity cannot be reduced below current attendance")]
    CapacityBelowAttendance { attending_rigs: u32 },

    #[error("trip is at capacity")]
    TripAtCapacity,

    #[error("rsvp is only allowed for published trips")]
    TripNotPublished,

    #[error("published trip must have capacity to accept rsvps")]
    TripMissingCapacity,

    #[error("rsvp is not available for draft trips")]
    RsvpNotAvailable,

    #[error("rsvp not found")]
    RsvpNotFound,

    #[error("cannot remove the last organizer")]
    LastOrganizer,

    #[error("idempotency key reuse with different payload")]
    IdempotencyKeyReuse,

    #[error("{message}")]
    Validation {
        message: String,
        details: serde_json::Value,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Validation error naming the offending field.
    pub fn validation(message: impl Into<String>, field: &str, reason: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            details: serde_json::json!({ field: reason.into() }),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) | AppError::CallerNotProvisioned => StatusCode::UNAUTHORIZED,
            AppError::MemberNotProvisioned | AppError::TripNotFound | AppError::RsvpNotFound => {
                StatusCode::NOT_FOUND
            }
            AppError::MemberAlreadyExists
            | AppError::EmailAlreadyInUse
            | AppError::TripIdConflict
            | AppError::TripCanceled
            | AppError::TripNotDraft
            | AppError::TripPrivateDraft
            | AppError::TripNotReadyToPublish { .. }
            | AppError::CapacityBelowAttendance { .. }
            | AppError::TripAtCapacity
            | AppError::TripNotPublished
            | AppError::TripMissingCapacity
            | AppError::RsvpNotAvailable
            | AppError::LastOrganizer
            | AppError::IdempotencyKeyReuse => StatusCode::CONFLICT,
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::CallerNotProvisioned | AppError::MemberNotProvisioned => {
                codes::MEMBER_NOT_PROVISIONED
            }
            AppError::MemberAlreadyExists => codes::MEMBER_ALREADY_EXISTS,
            AppError::EmailAlreadyInUse => codes::EMAIL_ALREADY_IN_USE,
            AppError::TripNotFound => codes::TRIP_NOT_FOUND,
            AppError::TripIdConflict => codes::TRIP_ID_CONFLICT,
            AppError::TripCanceled => codes::TRIP_CANCELED,
            AppError::TripNotDraft => codes::TRIP_NOT_DRAFT,
            AppError::TripPrivateDraft => codes::TRIP_PRIVATE_DRAFT,
            AppError::TripNotReadyToPublish { .. } => codes::TRIP_NOT_READY_TO_PUBLISH,
            AppError::CapacityBelowAttendance { .. } => codes::CAPACITY_BELOW_ATTENDANCE,
            AppError::TripAtCapacity => codes::TRIP_AT_CAPACITY,
            AppError::TripNotPublished => codes::TRIP_NOT_PUBLISHED,
            AppError::TripMissingCapacity => codes::TRIP_MISSING_CAPACITY,
            AppError::RsvpNotAvailable => codes::RSVP_NOT_AVAILABLE,
            AppError::RsvpNotFound => codes::RSVP_NOT_FOUND,
            AppError::LastOrganizer => codes::LAST_ORGANIZER,
            AppError::IdempotencyKeyReuse => codes::IDEMPOTENCY_KEY_REUSE,
            AppError::Validation { .. } => codes::VALIDATION_ERROR,
            AppError::Storage(_) | AppError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::TripNotReadyToPublish { missing } => {
                Some(serde_json::json!({ "missing": missing }))
            }
            AppError::CapacityBelowAttendance { attending_rigs } => {
                Some(serde_json::json!({ "attendingRigs": attending_rigs }))
            }
            AppError::Validation { details, .. } => Some(details.clone()),
            _ => None,
        }
    }

    /// Caller-facing message. Internal causes are not surfaced.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Storage(_) | AppError::Internal(_) => "unexpected error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error response envelope.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Wrapper type for errors that carry request-id context.
pub struct ApiError {
    pub error: AppError,
    pub request_id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.error, request_id = ?self.request_id, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorDetails {
                code: self.error.code().to_string(),
                message: self.error.public_message(),
                details: self.error.details(),
                request_id: self.request_id,
            },
        };
        (status, Json(body)).into_response()
    }
}
