//! Member entity and projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MemberId, Subject};

/// Optional informational metadata about a member's rig/setup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tire_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lift_lockers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_gear: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ham_radio_call_sign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl VehicleProfile {
    pub fn is_empty(&self) -> bool {
        *self == VehicleProfile::default()
    }
}

/// A community member. Created on first provisioning for a subject; never
/// destroyed, only deactivated.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: MemberId,
    pub subject: Subject,
    pub display_name: String,
    pub email: String,
    pub group_alias_email: Option<String>,
    pub vehicle_profile: Option<VehicleProfile>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact member projection used in organizer lists and RSVP summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub member_id: MemberId,
    pub display_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_alias_email: Option<String>,
}

impl MemberSummary {
    pub fn of(m: &Member) -> Self {
        Self {
            member_id: m.id,
            display_name: m.display_name.clone(),
            email: m.email.clone(),
            group_alias_email: m.group_alias_email.clone(),
        }
    }
}

/// Sort members by `lower(displayName)` ascending, then id. The deterministic
/// ordering every member listing uses.
pub fn sort_members_by_display_name(members: &mut [Member]) {
    members.sort_by(|a, b| {
        let da = a.display_name.to_lowercase();
        let db = b.display_name.to_lowercase();
        da.cmp(&db).then_with(|| a.id.cmp(&b.id))
    });
}

/// Same ordering for summaries.
pub fn sort_member_summaries(members: &mut [MemberSummary]) {
    members.sort_by(|a, b| {
        let da = a.display_name.to_lowercase();
        let db = b.display_name.to_lowercase();
        da.cmp(&db).then_with(|| a.member_id.cmp(&b.member_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn member(name: &str) -> Member {
        Member {
            id: Uuid::new_v4(),
            subject: format!("sub-{name}"),
            display_name: name.to_string(),
            email: format!("{name}@x.io"),
            group_alias_email: None,
            vehicle_profile: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn ordering_is_case_insensitive() {
        let mut ms = vec![member("zed"), member("Alice"), member("bob")];
        sort_members_by_display_name(&mut ms);
        let names: Vec<_> = ms.iter().map(|m| m.display_name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "bob", "zed"]);
    }

    #[test]
    fn ties_break_on_id() {
        let mut a = member("Same");
        let mut b = member("same");
        a.id = Uuid::from_u128(2);
        b.id = Uuid::from_u128(1);
        let mut ms = vec![a.clone(), b.clone()];
        sort_members_by_display_name(&mut ms);
        assert_eq!(ms[0].id, b.id);
        assert_eq!(ms[1].id, a.id);
    }
}
