use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::models::{
    JoinRequestSource, JoinRequestStatus, LifecycleStatus, TeamInvite, TeamJoinRequest,
};
use crate::error::AppError;

pub fn new_direct_request(
    team_id: Uuid,
    user_id: Uuid,
    source: Option<JoinRequestSource>,
    message: Option<String>,
    now: DateTime<Utc>,
) -> TeamJoinRequest {
    TeamJoinRequest {
        id: Uuid::new_v4(),
        team_id,
        user_id,
        invite_id: None,
        reviewed_by: None,
        status: JoinRequestStatus::Pending,
        source: source.unwrap_or_default(),
        is_auto_approved: false,
        message,
        requested_at: now,
        reviewed_at: None,
    }
}

/// Join request produced by acting on an invite.
///
/// A pre-approved invite yields an already approved request attributed to
/// the invite's creator; any other invite yields a pending request whose
/// source follows the invite channel.
pub fn new_request_from_invite(
    invite: &TeamInvite,
    user_id: Uuid,
    message: Option<String>,
    now: DateTime<Utc>,
) -> TeamJoinRequest {
    let (status, source, reviewed_by, reviewed_at) = if invite.is_pre_approved {
        (
            JoinRequestStatus::Approved,
            JoinRequestSource::AdminLink,
            Some(invite.created_by),
            Some(now),
        )
    } else {
        (
            JoinRequestStatus::Pending,
            JoinRequestSource::from(invite.channel),
            None,
            None,
        )
    };

    TeamJoinRequest {
        id: Uuid::new_v4(),
        team_id: invite.team_id,
        user_id,
        invite_id: Some(invite.id),
        reviewed_by,
        status,
        source,
        is_auto_approved: invite.is_pre_approved,
        message: message.or_else(|| invite.message.clone()),
        requested_at: now,
        reviewed_at,
    }
}

/// Moves a pending request to `next` and stamps who decided and when.
pub fn review(
    request: &mut TeamJoinRequest,
    next: JoinRequestStatus,
    reviewer: Uuid,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    request.status = request.status.transition_to(next)?;
    request.reviewed_by = Some(reviewer);
    request.reviewed_at = Some(now);
    Ok(())
}

/// Requester withdrawal; no reviewer is recorded.
pub fn cancel(request: &mut TeamJoinRequest, now: DateTime<Utc>) -> Result<(), AppError> {
    request.status = request.status.transition_to(JoinRequestStatus::Cancelled)?;
    request.reviewed_at = Some(now);
    Ok(())
}
