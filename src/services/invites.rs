//! Invite construction, usability checks and state changes.
//!
//! Storage and permission checks live in the engine; everything here works
//! on a single [`TeamInvite`] value.

use std::sync::LazyLock;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use regex::Regex;
use uuid::Uuid;

use crate::database::models::{
    CreateInviteInput, InviteChannel, InviteStatus, LifecycleStatus, TeamInvite,
};
use crate::error::AppError;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles"));

/// Opaque URL-safe token carrying `bytes` bytes of randomness.
pub fn generate_token(bytes: usize) -> String {
    let mut buffer = vec![0u8; bytes.max(16)];
    rand::rng().fill_bytes(&mut buffer);
    URL_SAFE_NO_PAD.encode(buffer)
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email.trim())
}

/// Shape checks that need no storage access.
pub fn input_is_valid(input: &CreateInviteInput, now: DateTime<Utc>) -> bool {
    if input.channel == InviteChannel::Email
        && input.target_user_id.is_none()
        && input.target_email.is_none()
    {
        return false;
    }
    if input.max_uses.is_some_and(|max| max <= 0) {
        return false;
    }
    if input
        .target_email
        .as_deref()
        .is_some_and(|email| !is_valid_email(email))
    {
        return false;
    }
    if input.expires_at.is_some_and(|expires_at| expires_at <= now) {
        return false;
    }
    true
}

pub fn new_invite(
    input: CreateInviteInput,
    created_by: Uuid,
    is_pre_approved: bool,
    token: String,
    default_expiry: Option<Duration>,
    now: DateTime<Utc>,
) -> TeamInvite {
    let expires_at = input
        .expires_at
        .or_else(|| default_expiry.map(|expiry| now + expiry));

    TeamInvite {
        id: Uuid::new_v4(),
        team_id: input.team_id,
        created_by,
        target_user_id: input.target_user_id,
        target_email: input.target_email.map(|email| email.trim().to_lowercase()),
        channel: input.channel,
        status: InviteStatus::Pending,
        is_pre_approved,
        max_uses: input.max_uses,
        use_count: 0,
        expires_at,
        message: input.message,
        created_at: now,
        accepted_at: None,
        token,
    }
}

/// Result of checking whether a user may act on an invite right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteCheck {
    Usable,
    /// Targeted at another user.
    WrongUser,
    /// Still pending but past its expiry; the caller must persist `Expired`.
    Lapsed,
    AlreadyProcessed,
    MaxUsesReached,
}

pub fn check_usable(invite: &TeamInvite, user_id: Uuid, now: DateTime<Utc>) -> InviteCheck {
    if !invite.is_usable_by(user_id) {
        return InviteCheck::WrongUser;
    }
    if invite.status.is_pending() && invite.is_expired_at(now) {
        return InviteCheck::Lapsed;
    }
    if !invite.status.is_pending() {
        return InviteCheck::AlreadyProcessed;
    }
    if invite.uses_exhausted() {
        return InviteCheck::MaxUsesReached;
    }
    InviteCheck::Usable
}

/// Spends one use of the invite and moves it to `Accepted`.
pub fn mark_accepted(invite: &mut TeamInvite, now: DateTime<Utc>) -> Result<(), AppError> {
    if invite.uses_exhausted() {
        return Err(AppError::internal_server_error_message(format!(
            "invite {} has no uses left",
            invite.id
        )));
    }
    invite.status = invite.status.transition_to(InviteStatus::Accepted)?;
    invite.use_count += 1;
    invite.accepted_at = Some(now);
    Ok(())
}

/// Moves a pending invite to a terminal state other than `Accepted`.
pub fn close(invite: &mut TeamInvite, next: InviteStatus) -> Result<(), AppError> {
    invite.status = invite.status.transition_to(next)?;
    Ok(())
}
