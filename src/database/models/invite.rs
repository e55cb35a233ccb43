use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::macros::string_enum;
use super::status::LifecycleStatus;

string_enum! {
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "snake_case")]
    pub enum InviteChannel {
        Email => "email",
        ShareLink => "share_link",
        QrCode => "qr_code",
    }
}

string_enum! {
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "snake_case")]
    pub enum InviteStatus {
        Pending => "pending",
        Accepted => "accepted",
        Declined => "declined",
        Expired => "expired",
        Revoked => "revoked",
    }
}

impl LifecycleStatus for InviteStatus {
    const ENTITY: &'static str = "invite";

    fn is_pending(&self) -> bool {
        matches!(self, InviteStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TeamInvite {
    pub id: Uuid,
    pub team_id: Uuid,
    pub created_by: Uuid,
    pub target_user_id: Option<Uuid>,
    pub target_email: Option<String>,
    pub channel: InviteChannel,
    pub status: InviteStatus,
    pub is_pre_approved: bool,
    pub max_uses: Option<i32>,
    pub use_count: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub token: String,
}

impl TeamInvite {
    /// True once the expiry has elapsed, whatever the stored status says.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn uses_exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.use_count >= max)
    }

    /// An invite naming a target user may only be used by that user.
    pub fn is_usable_by(&self, user_id: Uuid) -> bool {
        self.target_user_id.is_none_or(|target| target == user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInviteInput {
    pub team_id: Uuid,
    pub channel: InviteChannel,
    pub target_user_id: Option<Uuid>,
    pub target_email: Option<String>,
    pub max_uses: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

impl CreateInviteInput {
    pub fn new(team_id: Uuid, channel: InviteChannel) -> Self {
        Self {
            team_id,
            channel,
            target_user_id: None,
            target_email: None,
            max_uses: None,
            expires_at: None,
            message: None,
        }
    }
}
