//! Member use cases: provision, profile lookup, profile update, directory
//! listing, and search.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    normalize_human_name, sort_members_by_display_name, validate_email, Member, Patch,
    VehicleProfile,
};
use crate::errors::AppError;
use crate::store::{MemberStore, StoreError};

use super::Clock;

pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Field-wise vehicle profile patch. On create, `Null` and `Unspecified`
/// both leave the field unset; on update, `Null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VehicleProfilePatch {
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub make: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub model: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub tire_size: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub lift_lockers: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub fuel_range: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub recovery_gear: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub ham_radio_call_sign: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub notes: Patch<String>,
}

impl VehicleProfilePatch {
    fn apply_to(self, existing: Option<VehicleProfile>) -> VehicleProfile {
        let mut out = existing.unwrap_or_default();
        self.make.apply_to(&mut out.make);
        self.model.apply_to(&mut out.model);
        self.tire_size.apply_to(&mut out.tire_size);
        self.lift_lockers.apply_to(&mut out.lift_lockers);
        self.fuel_range.apply_to(&mut out.fuel_range);
        self.recovery_gear.apply_to(&mut out.recovery_gear);
        self.ham_radio_call_sign
            .apply_to(&mut out.ham_radio_call_sign);
        self.notes.apply_to(&mut out.notes);
        out
    }

    fn into_new_profile(self) -> Option<VehicleProfile> {
        let vp = self.apply_to(None);
        if vp.is_empty() {
            None
        } else {
            Some(vp)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemberInput {
    pub display_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Patch::is_unspecified")]
    pub group_alias_email: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_profile: Option<VehicleProfilePatch>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateMemberInput {
    /// Cannot be null.
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub display_name: Patch<String>,
    /// Cannot be null.
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub email: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub group_alias_email: Patch<String>,
    /// Null clears the whole profile; a value patches field-wise.
    #[serde(skip_serializing_if = "Patch::is_unspecified")]
    pub vehicle_profile: Patch<VehicleProfilePatch>,
}

pub struct MemberService {
    members: Arc<dyn MemberStore>,
    clock: Arc<dyn Clock>,
    pub search_limit: usize,
}

impl MemberService {
    pub fn new(members: Arc<dyn MemberStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            members,
            clock,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    /// Provision a member profile for the authenticated subject. The binding
    /// is irrevocable.
    pub async fn create_my_member(
        &self,
        subject: &str,
        input: CreateMemberInput,
    ) -> Result<Member, AppError> {
        match self.members.get_by_subject(subject).await {
            Ok(_) => return Err(AppError::MemberAlreadyExists),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        let display_name = normalize_human_name(&input.display_name);
        if display_name.is_empty() {
            return Err(AppError::validation(
                "invalid displayName",
                "displayName",
                "must be non-empty",
            ));
        }
        let email = input.email.trim().to_string();
        if let Err(reason) = validate_email(&email) {
            return Err(AppError::validation("invalid email", "email", reason));
        }
        let group_alias_email = match input.group_alias_email {
            Patch::Value(v) => {
                let v = v.trim().to_string();
                if let Err(reason) = validate_email(&v) {
                    return Err(AppError::validation(
                        "invalid groupAliasEmail",
                        "groupAliasEmail",
                        reason,
                    ));
                }
                Some(v)
            }
            _ => None,
        };
        self.ensure_email_unique(&email, None).await?;

        let now = self.clock.now();
        let member = Member {
            id: Uuid::new_v4(),
            subject: subject.to_string(),
            display_name,
            email,
            group_alias_email,
            vehicle_profile: input
                .vehicle_profile
                .and_then(VehicleProfilePatch::into_new_profile),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        match self.members.create(&member).await {
            Ok(()) => Ok(member),
            Err(StoreError::SubjectAlreadyBound) => Err(AppError::MemberAlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_my_profile(&self, subject: &str) -> Result<Member, AppError> {
        match self.members.get_by_subject(subject).await {
            Ok(m) => Ok(m),
            Err(StoreError::NotFound) => Err(AppError::MemberNotProvisioned),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update_my_profile(
        &self,
        subject: &str,
        input: UpdateMemberInput,
    ) -> Result<Member, AppError> {
        let mut member = self.get_my_profile(subject).await?;

        match input.display_name {
            Patch::Unspecified => {}
            Patch::Null => {
                return Err(AppError::validation(
                    "invalid displayName",
                    "displayName",
                    "cannot be null",
                ))
            }
            Patch::Value(v) => {
                let display_name = normalize_human_name(&v);
                if display_name.is_empty() {
                    return Err(AppError::validation(
                        "invalid displayName",
                        "displayName",
                        "must be non-empty",
                    ));
                }
                member.display_name = display_name;
            }
        }

        match input.email {
            Patch::Unspecified => {}
            Patch::Null => {
                return Err(AppError::validation(
                    "invalid email",
                    "email",
                    "cannot be null",
                ))
            }
            Patch::Value(v) => {
                let email = v.trim().to_string();
                if let Err(reason) = validate_email(&email) {
                    return Err(AppError::validation("invalid email", "email", reason));
                }
                self.ensure_email_unique(&email, Some(member.id)).await?;
                member.email = email;
            }
        }

        match input.group_alias_email {
            Patch::Unspecified => {}
            Patch::Null => member.group_alias_email = None,
            Patch::Value(v) => {
                let alias = v.trim().to_string();
                if let Err(reason) = validate_email(&alias) {
                    return Err(AppError::validation(
                        "invalid groupAliasEmail",
                        "groupAliasEmail",
                        reason,
                    ));
                }
                member.group_alias_email = Some(alias);
            }
        }

        match input.vehicle_profile {
            Patch::Unspecified => {}
            Patch::Null => member.vehicle_profile = None,
            Patch::Value(patch) => {
                member.vehicle_profile = Some(patch.apply_to(member.vehicle_profile.take()));
            }
        }

        member.updated_at = self.clock.now();
        self.members.update(&member).await?;
        Ok(member)
    }

    /// Directory listing. Active members only by default; the caller is
    /// always included even when inactive.
    pub async fn list_members(
        &self,
        subject: &str,
        include_inactive: bool,
    ) -> Result<Vec<Member>, AppError> {
        let mut out = self.members.list(include_inactive).await?;

        if !include_inactive {
            if let Ok(me) = self.members.get_by_subject(subject).await {
                if !me.is_active && !out.iter().any(|m| m.id == me.id) {
                    out.push(me);
                    sort_members_by_display_name(&mut out);
                }
            }
        }
        Ok(out)
    }

    /// Search active members by display name. All whitespace-separated
    /// tokens must match as substrings; the query needs at least three code
    /// points.
    pub async fn search_members(&self, query: &str) -> Result<Vec<Member>, AppError> {
        let q = query.trim();
        if q.chars().count() < 3 {
            return Err(AppError::validation(
                "invalid search query",
                "q",
                "must be at least 3 characters",
            ));
        }
        Ok(self
            .members
            .search_active_by_display_name(q, self.search_limit)
            .await?)
    }

    async fn ensure_email_unique(
        &self,
        email: &str,
        exclude: Option<Uuid>,
    ) -> Result<(), AppError> {
        let all = self.members.list(true).await?;
        for m in all {
            if Some(m.id) == exclude {
                continue;
            }
            if m.email.eq_ignore_ascii_case(email) {
                return Err(AppError::EmailAlreadyInUse);
            }
        }
        Ok(())
    }
}
