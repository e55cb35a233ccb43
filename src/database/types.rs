use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::TeamMemberProfile;

// Row shape of team_member_profiles; ranked positions live in three columns
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TeamMemberProfileRow {
    pub member_id: Uuid,
    pub is_fee_exempt: bool,
    pub is_on_hiatus: bool,
    pub hiatus_started_at: Option<DateTime<Utc>>,
    pub hiatus_ends_at: Option<DateTime<Utc>>,
    pub hiatus_count: i32,
    pub last_hiatus_started_at: Option<DateTime<Utc>>,
    pub position_1: Option<String>,
    pub position_2: Option<String>,
    pub position_3: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<TeamMemberProfileRow> for TeamMemberProfile {
    fn from(row: TeamMemberProfileRow) -> Self {
        Self {
            member_id: row.member_id,
            is_fee_exempt: row.is_fee_exempt,
            is_on_hiatus: row.is_on_hiatus,
            hiatus_started_at: row.hiatus_started_at,
            hiatus_ends_at: row.hiatus_ends_at,
            hiatus_count: row.hiatus_count,
            last_hiatus_started_at: row.last_hiatus_started_at,
            position_preferences: [row.position_1, row.position_2, row.position_3]
                .into_iter()
                .flatten()
                .collect(),
            updated_at: row.updated_at,
        }
    }
}

impl From<&TeamMemberProfile> for TeamMemberProfileRow {
    fn from(profile: &TeamMemberProfile) -> Self {
        let mut positions = profile.position_preferences.iter().cloned();
        Self {
            member_id: profile.member_id,
            is_fee_exempt: profile.is_fee_exempt,
            is_on_hiatus: profile.is_on_hiatus,
            hiatus_started_at: profile.hiatus_started_at,
            hiatus_ends_at: profile.hiatus_ends_at,
            hiatus_count: profile.hiatus_count,
            last_hiatus_started_at: profile.last_hiatus_started_at,
            position_1: positions.next(),
            position_2: positions.next(),
            position_3: positions.next(),
            updated_at: profile.updated_at,
        }
    }
}
