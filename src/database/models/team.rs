use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::macros::string_enum;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>, // TIMESTAMPTZ
    pub updated_at: DateTime<Utc>, // TIMESTAMPTZ
}

impl Team {
    pub fn new(owner_id: Uuid, name: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamInput {
    pub name: String,
}

string_enum! {
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
    #[serde(rename_all = "snake_case")]
    pub enum TeamRole {
        User => "user",
        Moderator => "moderator",
        Admin => "admin",
    }
}

string_enum! {
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "snake_case")]
    pub enum MemberStatus {
        Pending => "pending",
        Active => "active",
        Removed => "removed",
        Banned => "banned",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: Uuid,
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub role: TeamRole,
    pub status: MemberStatus,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TeamMember {
    pub fn new_active(team_id: Uuid, user_id: Uuid, role: TeamRole, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            team_id,
            user_id,
            role,
            status: MemberStatus::Active,
            joined_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }

    pub fn is_banned(&self) -> bool {
        self.status == MemberStatus::Banned
    }

    /// Team role, counted only while the membership is active.
    pub fn active_role(&self) -> Option<TeamRole> {
        self.is_active().then_some(self.role)
    }
}

/// Most position preferences a profile keeps, in rank order.
pub const MAX_POSITION_PREFERENCES: usize = 3;

/// Per-membership extension, created lazily on first write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMemberProfile {
    pub member_id: Uuid,
    pub is_fee_exempt: bool,
    pub is_on_hiatus: bool,
    pub hiatus_started_at: Option<DateTime<Utc>>,
    pub hiatus_ends_at: Option<DateTime<Utc>>,
    /// Hiatus starts inside the current rolling window.
    pub hiatus_count: i32,
    pub last_hiatus_started_at: Option<DateTime<Utc>>,
    pub position_preferences: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl TeamMemberProfile {
    pub fn new(member_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            member_id,
            is_fee_exempt: false,
            is_on_hiatus: false,
            hiatus_started_at: None,
            hiatus_ends_at: None,
            hiatus_count: 0,
            last_hiatus_started_at: None,
            position_preferences: Vec::new(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    pub is_fee_exempt: Option<bool>,
    /// `Some(true)` starts (or keeps) a hiatus, `Some(false)` ends it.
    pub is_on_hiatus: Option<bool>,
    pub hiatus_ends_at: Option<DateTime<Utc>>,
    pub position_preferences: Option<Vec<String>>,
}
