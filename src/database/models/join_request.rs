use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::invite::InviteChannel;
use super::macros::string_enum;
use super::status::LifecycleStatus;

string_enum! {
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "snake_case")]
    pub enum JoinRequestStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Cancelled => "cancelled",
    }
}

impl LifecycleStatus for JoinRequestStatus {
    const ENTITY: &'static str = "join request";

    fn is_pending(&self) -> bool {
        matches!(self, JoinRequestStatus::Pending)
    }
}

string_enum! {
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
    #[serde(rename_all = "snake_case")]
    pub enum JoinRequestSource {
        #[default]
        ProximitySearch => "proximity_search",
        ShareLink => "share_link",
        QrCode => "qr_code",
        DirectInvite => "direct_invite",
        AdminLink => "admin_link",
    }
}

impl From<InviteChannel> for JoinRequestSource {
    fn from(channel: InviteChannel) -> Self {
        match channel {
            InviteChannel::ShareLink => JoinRequestSource::ShareLink,
            InviteChannel::QrCode => JoinRequestSource::QrCode,
            InviteChannel::Email => JoinRequestSource::DirectInvite,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TeamJoinRequest {
    pub id: Uuid,
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub invite_id: Option<Uuid>,
    pub reviewed_by: Option<Uuid>,
    pub status: JoinRequestStatus,
    pub source: JoinRequestSource,
    pub is_auto_approved: bool,
    pub message: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJoinRequestInput {
    pub team_id: Uuid,
    pub source: Option<JoinRequestSource>,
    pub invite_id: Option<Uuid>,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_follows_invite_channel() {
        assert_eq!(
            JoinRequestSource::from(InviteChannel::ShareLink),
            JoinRequestSource::ShareLink
        );
        assert_eq!(
            JoinRequestSource::from(InviteChannel::QrCode),
            JoinRequestSource::QrCode
        );
        assert_eq!(
            JoinRequestSource::from(InviteChannel::Email),
            JoinRequestSource::DirectInvite
        );
    }

    #[test]
    fn test_cancelled_is_terminal() {
        let status = JoinRequestStatus::Pending
            .transition_to(JoinRequestStatus::Cancelled)
            .unwrap();
        assert!(status.is_terminal());
        assert!(status.transition_to(JoinRequestStatus::Approved).is_err());
    }

    #[test]
    fn test_default_source_is_proximity_search() {
        assert_eq!(JoinRequestSource::default(), JoinRequestSource::ProximitySearch);
        assert_eq!(
            "direct_invite".parse::<JoinRequestSource>(),
            Ok(JoinRequestSource::DirectInvite)
        );
    }
}
