//! Member API endpoints.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{fail, idempotency_key, json_response, require_member, ApiResult, ReqId};
use crate::auth::AuthSubject;
use crate::domain::{normalize_human_name, Member, MemberId, VehicleProfile};
use crate::services::members::{CreateMemberInput, UpdateMemberInput};
use crate::AppState;

/// Full own-profile projection. Directory endpoints expose only the
/// directory entry; emails never appear in the directory.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfile {
    pub member_id: MemberId,
    pub display_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_alias_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_profile: Option<VehicleProfile>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemberProfile {
    fn of(m: Member) -> Self {
        Self {
            member_id: m.id,
            display_name: m.display_name,
            email: m.email,
            group_alias_email: m.group_alias_email,
            vehicle_profile: m.vehicle_profile,
            is_active: m.is_active,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDirectoryEntry {
    pub member_id: MemberId,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct MemberEnvelope {
    pub member: MemberProfile,
}

#[derive(Debug, Serialize)]
pub struct MembersEnvelope {
    pub members: Vec<MemberDirectoryEntry>,
}

/// POST /members - Provision a member profile for the caller's subject.
pub async fn create_my_member(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
    Json(input): Json<CreateMemberInput>,
) -> ApiResult {
    let member = state
        .members
        .create_my_member(&subject, input)
        .await
        .map_err(|e| fail(e, &rid))?;
    Ok(json_response(
        StatusCode::CREATED,
        &MemberEnvelope {
            member: MemberProfile::of(member),
        },
    ))
}

/// GET /members/me - The caller's own profile.
pub async fn get_my_member_profile(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
) -> ApiResult {
    let member = state
        .members
        .get_my_profile(&subject)
        .await
        .map_err(|e| fail(e, &rid))?;
    Ok(json_response(
        StatusCode::OK,
        &MemberEnvelope {
            member: MemberProfile::of(member),
        },
    ))
}

/// PATCH /members/me - Update the caller's profile (idempotent).
pub async fn update_my_member_profile(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
    headers: HeaderMap,
    Json(input): Json<UpdateMemberInput>,
) -> ApiResult {
    let canonical = canonicalize_member_update(&input);
    let members = state.members.clone();
    let subject_for_run = subject.clone();
    super::with_idempotency(
        &state,
        &rid,
        idempotency_key(&headers),
        &subject,
        "PATCH",
        "/members/me",
        &canonical,
        StatusCode::OK,
        async move {
            let member = members
                .update_my_profile(&subject_for_run, input)
                .await?;
            Ok(MemberEnvelope {
                member: MemberProfile::of(member),
            })
        },
    )
    .await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMembersQuery {
    #[serde(default)]
    pub include_inactive: Option<bool>,
}

/// GET /members - Directory of active members (caller always included).
pub async fn list_members(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
    Query(query): Query<ListMembersQuery>,
) -> ApiResult {
    require_member(&state, &subject)
        .await
        .map_err(|e| fail(e, &rid))?;
    let members = state
        .members
        .list_members(&subject, query.include_inactive.unwrap_or(false))
        .await
        .map_err(|e| fail(e, &rid))?;
    Ok(json_response(
        StatusCode::OK,
        &MembersEnvelope {
            members: members.into_iter().map(directory_entry).collect(),
        },
    ))
}

#[derive(Debug, Deserialize)]
pub struct SearchMembersQuery {
    #[serde(default)]
    pub q: Option<String>,
}

/// GET /members/search?q= - Search active members by display name.
pub async fn search_members(
    State(state): State<AppState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    rid: ReqId,
    Query(query): Query<SearchMembersQuery>,
) -> ApiResult {
    require_member(&state, &subject)
        .await
        .map_err(|e| fail(e, &rid))?;
    let members = state
        .members
        .search_members(query.q.as_deref().unwrap_or(""))
        .await
        .map_err(|e| fail(e, &rid))?;
    Ok(json_response(
        StatusCode::OK,
        &MembersEnvelope {
            members: members.into_iter().map(directory_entry).collect(),
        },
    ))
}

fn directory_entry(m: Member) -> MemberDirectoryEntry {
    MemberDirectoryEntry {
        member_id: m.id,
        display_name: m.display_name,
    }
}

/// Canonical form of the profile patch for idempotency hashing: normalized
/// display name, trimmed emails. Shared semantics with the service so two
/// bodies that mean the same thing share a fingerprint.
fn canonicalize_member_update(input: &UpdateMemberInput) -> UpdateMemberInput {
    let mut canonical = input.clone();
    canonical.display_name = canonical
        .display_name
        .map(|v| normalize_human_name(&v));
    canonical.email = canonical.email.map(|v| v.trim().to_string());
    canonical.group_alias_email = canonical.group_alias_email.map(|v| v.trim().to_string());
    canonical
}
