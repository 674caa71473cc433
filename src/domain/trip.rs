//! Trip aggregate: entity, value enums, projections, and visibility rules.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{MemberId, MemberSummary, TripId};

/// Trip lifecycle status. `DRAFT → PUBLISHED` is one-way; any non-canceled
/// status may move to `CANCELED`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TripStatus {
    #[serde(rename = "DRAFT")]
    Draft,
    #[serde(rename = "PUBLISHED")]
    Published,
    #[serde(rename = "CANCELED")]
    Canceled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Draft => "DRAFT",
            TripStatus::Published => "PUBLISHED",
            TripStatus::Canceled => "CANCELED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(TripStatus::Draft),
            "PUBLISHED" => Some(TripStatus::Published),
            "CANCELED" => Some(TripStatus::Canceled),
            _ => None,
        }
    }
}

/// Visibility of a DRAFT trip. Meaningless (and absent) for other statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftVisibility {
    #[serde(rename = "PRIVATE")]
    Private,
    #[serde(rename = "PUBLIC")]
    Public,
}

impl DraftVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftVisibility::Private => "PRIVATE",
            DraftVisibility::Public => "PUBLIC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PRIVATE" => Some(DraftVisibility::Private),
            "PUBLIC" => Some(DraftVisibility::Public),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactType {
    #[serde(rename = "GPX")]
    Gpx,
    #[serde(rename = "SCHEDULE")]
    Schedule,
    #[serde(rename = "DOCUMENT")]
    Document,
    #[serde(rename = "OTHER")]
    Other,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Gpx => "GPX",
            ArtifactType::Schedule => "SCHEDULE",
            ArtifactType::Document => "DOCUMENT",
            ArtifactType::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GPX" => Some(ArtifactType::Gpx),
            "SCHEDULE" => Some(ArtifactType::Schedule),
            "DOCUMENT" => Some(ArtifactType::Document),
            "OTHER" => Some(ArtifactType::Other),
            _ => None,
        }
    }
}

/// A member's RSVP response. `UNSET` is recordable but collapses to "no
/// record" in summary projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsvpResponse {
    #[serde(rename = "YES")]
    Yes,
    #[serde(rename = "NO")]
    No,
    #[serde(rename = "UNSET")]
    Unset,
}

impl RsvpResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpResponse::Yes => "YES",
            RsvpResponse::No => "NO",
            RsvpResponse::Unset => "UNSET",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "YES" => Some(RsvpResponse::Yes),
            "NO" => Some(RsvpResponse::No),
            "UNSET" => Some(RsvpResponse::Unset),
            _ => None,
        }
    }
}

/// Meeting location. Label is required when the location exists; coordinates
/// are present together or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// External URL reference attached to a trip, in caller-controlled order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripArtifact {
    pub artifact_id: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub title: String,
    pub url: String,
}

/// The trip aggregate root as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Trip {
    pub id: TripId,
    pub status: TripStatus,
    pub name: Option<String>,
    pub description: Option<String>,
    pub creator_member_id: MemberId,
    /// Non-empty ordered set; duplicates disallowed.
    pub organizer_member_ids: Vec<MemberId>,
    /// `Some` iff `status == Draft`.
    pub draft_visibility: Option<DraftVisibility>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub capacity_rigs: Option<u32>,
    /// Maintained only while published.
    pub attending_rigs: Option<u32>,
    pub difficulty_text: Option<String>,
    pub meeting_location: Option<Location>,
    pub comms_requirements_text: Option<String>,
    pub recommended_requirements_text: Option<String>,
    pub artifacts: Vec<TripArtifact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn is_organizer(&self, caller: MemberId) -> bool {
        self.organizer_member_ids.contains(&caller)
    }

    /// Visibility rule: published/canceled trips are visible to every
    /// authenticated member; PUBLIC drafts to organizers; PRIVATE drafts to
    /// the creator only.
    pub fn is_visible_to(&self, caller: MemberId) -> bool {
        match self.status {
            TripStatus::Published | TripStatus::Canceled => true,
            TripStatus::Draft => match self.draft_visibility {
                Some(DraftVisibility::Public) => self.is_organizer(caller),
                Some(DraftVisibility::Private) => self.creator_member_id == caller,
                None => false,
            },
        }
    }

    pub fn is_draft_visible_to(&self, caller: MemberId) -> bool {
        self.status == TripStatus::Draft && self.is_visible_to(caller)
    }
}

/// Fields that must be present before a draft can be published, in the order
/// they are reported in `TRIP_NOT_READY_TO_PUBLISH` details.
pub fn required_publish_fields_missing(t: &Trip) -> Vec<&'static str> {
    let has_text = |p: &Option<String>| p.as_deref().is_some_and(|s| !s.trim().is_empty());

    let mut missing = Vec::new();
    if !has_text(&t.name) {
        missing.push("name");
    }
    if !has_text(&t.description) {
        missing.push("description");
    }
    if t.start_date.is_none() {
        missing.push("startDate");
    }
    if t.end_date.is_none() {
        missing.push("endDate");
    }
    if !t.capacity_rigs.is_some_and(|c| c >= 1) {
        missing.push("capacityRigs");
    }
    if !has_text(&t.difficulty_text) {
        missing.push("difficultyText");
    }
    if !t
        .meeting_location
        .as_ref()
        .is_some_and(|l| !l.label.trim().is_empty())
    {
        missing.push("meetingLocation");
    }
    if !has_text(&t.comms_requirements_text) {
        missing.push("commsRequirementsText");
    }
    if !has_text(&t.recommended_requirements_text) {
        missing.push("recommendedRequirementsText");
    }
    if t.organizer_member_ids.is_empty() {
        missing.push("organizers");
    }
    missing
}

/// Reorder artifacts to match the caller-supplied id list. The list must be
/// a permutation of a subset of the current artifact ids; an unknown id is a
/// validation failure, reported by value.
pub fn reorder_artifacts_by_id(
    existing: &[TripArtifact],
    ids: &[String],
) -> Result<Vec<TripArtifact>, String> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        match existing.iter().find(|a| &a.artifact_id == id) {
            Some(a) => out.push(a.clone()),
            None => return Err(format!("unknown artifactId: {id}")),
        }
    }
    Ok(out)
}

/// Listing order: `startDate` ascending with dated trips first, undated at
/// the end; ties broken by `createdAt` ascending, then trip id.
pub fn sort_trips_for_listing(trips: &mut [Trip]) {
    trips.sort_by(|a, b| match (a.start_date, b.start_date) {
        (Some(ad), Some(bd)) => ad
            .cmp(&bd)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a
            .created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id)),
    });
}

/// Compact trip projection used by listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSummary {
    pub trip_id: TripId,
    pub name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: TripStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_visibility: Option<DraftVisibility>,
    pub capacity_rigs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attending_rigs: Option<u32>,
}

impl TripSummary {
    pub fn of(t: &Trip) -> Self {
        Self {
            trip_id: t.id,
            name: t.name.clone(),
            start_date: t.start_date,
            end_date: t.end_date,
            status: t.status,
            // Present only for drafts.
            draft_visibility: if t.status == TripStatus::Draft {
                t.draft_visibility
            } else {
                None
            },
            capacity_rigs: t.capacity_rigs,
            // Present only for published trips.
            attending_rigs: if t.status == TripStatus::Published {
                t.attending_rigs
            } else {
                None
            },
        }
    }
}

/// Full trip projection with organizers expanded and RSVP state attached for
/// published/canceled trips.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDetails {
    #[serde(flatten)]
    pub summary: TripSummary,
    pub description: Option<String>,
    pub difficulty_text: Option<String>,
    pub meeting_location: Option<Location>,
    pub comms_requirements_text: Option<String>,
    pub recommended_requirements_text: Option<String>,
    pub organizers: Vec<MemberSummary>,
    pub artifacts: Vec<TripArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsvp_summary: Option<RsvpSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_rsvp: Option<Rsvp>,
    pub rsvp_actions_enabled: bool,
}

/// A member's RSVP record for a trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rsvp {
    pub trip_id: TripId,
    pub member_id: MemberId,
    pub response: RsvpResponse,
    pub updated_at: DateTime<Utc>,
}

/// RSVP roll-up for a trip. `UNSET` records are omitted from both lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpSummary {
    pub capacity_rigs: Option<u32>,
    pub attending_rigs: u32,
    pub attending_members: Vec<MemberSummary>,
    pub not_attending_members: Vec<MemberSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn base_trip(creator: MemberId) -> Trip {
        Trip {
            id: Uuid::new_v4(),
            status: TripStatus::Draft,
            name: Some("Snow Run".to_string()),
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

    #[test]
    fn private_draft_visible_to_creator_only() {
        let creator = Uuid::new_v4();
        let other = Uuid::new_v4();
        let t = base_trip(creator);
        assert!(t.is_visible_to(creator));
        assert!(!t.is_visible_to(other));
    }

    #[test]
    fn public_draft_visible_to_organizers() {
        let creator = Uuid::new_v4();
        let organizer = Uuid::new_v4();
        let outsider = Uuid::new_v4();
        let mut t = base_trip(creator);
        t.draft_visibility = Some(DraftVisibility::Public);
        t.organizer_member_ids.push(organizer);
        assert!(t.is_visible_to(creator));
        assert!(t.is_visible_to(organizer));
        assert!(!t.is_visible_to(outsider));
    }

    #[test]
    fn published_and_canceled_visible_to_all() {
        let creator = Uuid::new_v4();
        let anyone = Uuid::new_v4();
        let mut t = base_trip(creator);
        t.status = TripStatus::Published;
        t.draft_visibility = None;
        assert!(t.is_visible_to(anyone));
        t.status = TripStatus::Canceled;
        assert!(t.is_visible_to(anyone));
    }

    #[test]
    fn publish_readiness_reports_each_missing_field() {
        let t = base_trip(Uuid::new_v4());
        let missing = required_publish_fields_missing(&t);
        assert!(missing.contains(&"description"));
        assert!(missing.contains(&"startDate"));
        assert!(missing.contains(&"endDate"));
        assert!(missing.contains(&"capacityRigs"));
        assert!(missing.contains(&"difficultyText"));
        assert!(missing.contains(&"meetingLocation"));
        assert!(missing.contains(&"commsRequirementsText"));
        assert!(missing.contains(&"recommendedRequirementsText"));
        // Name is set, organizers non-empty.
        assert!(!missing.contains(&"name"));
        assert!(!missing.contains(&"organizers"));
    }

    #[test]
    fn blank_text_counts_as_missing() {
        let mut t = base_trip(Uuid::new_v4());
        t.name = Some("   ".to_string());
        assert!(required_publish_fields_missing(&t).contains(&"name"));
    }

    #[test]
    fn artifact_reorder_validates_ids() {
        let arts = vec![
            TripArtifact {
                artifact_id: "a1".into(),
                artifact_type: ArtifactType::Gpx,
                title: "route".into(),
                url: "https://x/route.gpx".into(),
            },
            TripArtifact {
                artifact_id: "a2".into(),
                artifact_type: ArtifactType::Document,
                title: "notes".into(),
                url: "https://x/notes".into(),
            },
        ];
        let reordered =
            reorder_artifacts_by_id(&arts, &["a2".to_string(), "a1".to_string()]).unwrap();
        assert_eq!(reordered[0].artifact_id, "a2");
        // Subset is allowed.
        let subset = reorder_artifacts_by_id(&arts, &["a2".to_string()]).unwrap();
        assert_eq!(subset.len(), 1);
        // Unknown id fails.
        assert!(reorder_artifacts_by_id(&arts, &["zz".to_string()]).is_err());
    }

    #[test]
    fn listing_order_puts_dated_trips_first() {
        let creator = Uuid::new_v4();
        let mut a = base_trip(creator);
        let mut b = base_trip(creator);
        let mut c = base_trip(creator);
        a.start_date = NaiveDate::from_ymd_opt(2026, 9, 12);
        b.start_date = None;
        c.start_date = NaiveDate::from_ymd_opt(2026, 8, 1);
        let mut trips = vec![a.clone(), b.clone(), c.clone()];
        sort_trips_for_listing(&mut trips);
        assert_eq!(trips[0].id, c.id);
        assert_eq!(trips[1].id, a.id);
        assert_eq!(trips[2].id, b.id);
    }

    #[test]
    fn summary_hides_status_dependent_fields() {
        let creator = Uuid::new_v4();
        let mut t = base_trip(creator);
        t.attending_rigs = Some(3);
        let s = TripSummary::of(&t);
        assert_eq!(s.draft_visibility, Some(DraftVisibility::Private));
        assert_eq!(s.attending_rigs, None);

        t.status = TripStatus::Published;
        t.draft_visibility = None;
        let s = TripSummary::of(&t);
        assert_eq!(s.draft_visibility, None);
        assert_eq!(s.attending_rigs, Some(3));
    }
}
