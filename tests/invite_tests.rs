use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use pretty_assertions::assert_eq;
use uuid::Uuid;

use roster::database::models::*;
use roster::database::{Store, StoreTx};
use roster::error::AppError;
use roster::services::{AdmissionEngine, AdmissionStatus, Notification, Notifier, keys};

mod common;

#[tokio::test]
async fn test_admin_invite_is_pre_approved_and_notifies_target() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();
    let guest = ctx.create_user();

    // Act
    let mut input = CreateInviteInput::new(team.id(), InviteChannel::Email);
    input.target_user_id = Some(guest.user_id);
    let outcome = ctx.engine.create_invite(&team.owner, input).await.unwrap();

    // Assert
    assert_eq!(outcome.status, AdmissionStatus::Success);
    let invite = outcome.data.unwrap();
    assert!(invite.is_pre_approved);
    assert_eq!(invite.status, InviteStatus::Pending);
    assert_eq!(invite.use_count, 0);
    assert_eq!(invite.created_by, team.owner.user_id);
    assert_eq!(
        invite.expires_at,
        Some(ctx.now() + Duration::days(ctx.config.default_invite_expiry_days))
    );
    assert!(!invite.token.is_empty());
    assert!(ctx.notifier.sent().contains(&Notification::InviteCreated {
        invite_id: invite.id,
        team_id: team.id(),
        target_user_id: Some(guest.user_id),
        target_email: None,
    }));
}

#[tokio::test]
async fn test_moderator_cannot_invite_without_setting() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();
    let moderator = ctx.add_moderator(&team).await.unwrap();
    ctx.set_setting(&team, keys::MODERATORS_MAY_INVITE, false)
        .await
        .unwrap();

    // Act
    let outcome = ctx
        .engine
        .create_invite(
            &moderator,
            CreateInviteInput::new(team.id(), InviteChannel::ShareLink),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(outcome.status, AdmissionStatus::Forbidden);
    assert!(outcome.data.is_none());
    let invites = ctx.store.snapshot().await.invites;
    assert!(invites.values().all(|invite| invite.created_by != moderator.user_id));
}

#[tokio::test]
async fn test_moderator_invite_is_not_pre_approved() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();
    let moderator = ctx.add_moderator(&team).await.unwrap();
    ctx.set_setting(&team, keys::MODERATORS_MAY_INVITE, true)
        .await
        .unwrap();

    // Act
    let invite = ctx.share_link(&team, &moderator).await.unwrap();

    // Assert
    assert!(!invite.is_pre_approved);
    assert_eq!(invite.channel, InviteChannel::ShareLink);
}

#[tokio::test]
async fn test_create_invite_rejects_bad_input() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();

    // Act
    let untargeted_email = ctx
        .engine
        .create_invite(
            &team.owner,
            CreateInviteInput::new(team.id(), InviteChannel::Email),
        )
        .await
        .unwrap();

    let mut zero_uses = CreateInviteInput::new(team.id(), InviteChannel::ShareLink);
    zero_uses.max_uses = Some(0);
    let zero_uses = ctx.engine.create_invite(&team.owner, zero_uses).await.unwrap();

    let mut unknown_target = CreateInviteInput::new(team.id(), InviteChannel::Email);
    unknown_target.target_user_id = Some(Uuid::new_v4());
    let unknown_target = ctx
        .engine
        .create_invite(&team.owner, unknown_target)
        .await
        .unwrap();

    let unknown_team = ctx
        .engine
        .create_invite(
            &team.owner,
            CreateInviteInput::new(Uuid::new_v4(), InviteChannel::QrCode),
        )
        .await
        .unwrap();

    let mut by_email = CreateInviteInput::new(team.id(), InviteChannel::Email);
    by_email.target_email = Some(common::fake_email());
    let by_email = ctx.engine.create_invite(&team.owner, by_email).await.unwrap();

    // Assert
    assert_eq!(untargeted_email.status, AdmissionStatus::InvalidData);
    assert_eq!(zero_uses.status, AdmissionStatus::InvalidData);
    assert_eq!(unknown_target.status, AdmissionStatus::UserNotFound);
    assert_eq!(unknown_team.status, AdmissionStatus::TeamNotFound);
    assert_eq!(by_email.status, AdmissionStatus::Success);
}

#[tokio::test]
async fn test_pre_approved_acceptance_admits_exactly_once() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();
    let guest = ctx.create_user();
    let invite = ctx.share_link(&team, &team.owner).await.unwrap();

    // Act
    let outcome = ctx.engine.accept_invite(&guest, invite.id).await.unwrap();

    // Assert
    assert_eq!(outcome.status, AdmissionStatus::Success);
    let acceptance = outcome.data.unwrap();
    assert_eq!(acceptance.invite.status, InviteStatus::Accepted);
    assert_eq!(acceptance.invite.use_count, 1);
    assert_eq!(acceptance.invite.accepted_at, Some(ctx.now()));

    let request = acceptance.join_request.unwrap();
    assert_eq!(request.status, JoinRequestStatus::Approved);
    assert_eq!(request.source, JoinRequestSource::AdminLink);
    assert!(request.is_auto_approved);

    let member = acceptance.member.unwrap();
    assert_eq!(member.role, TeamRole::User);
    assert_eq!(member.status, MemberStatus::Active);

    let state = ctx.store.snapshot().await;
    let guest_rows: Vec<_> = state
        .members_of(team.id())
        .into_iter()
        .filter(|member| member.user_id == guest.user_id)
        .collect();
    assert_eq!(guest_rows.len(), 1);
    let approved: Vec<_> = state
        .join_requests_of(team.id())
        .into_iter()
        .filter(|request| request.user_id == guest.user_id)
        .collect();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].status, JoinRequestStatus::Approved);
    assert_eq!(ctx.notifier.admitted_users(), vec![guest.user_id]);
}

#[tokio::test]
async fn test_pre_approved_acceptance_at_capacity_changes_nothing() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();
    ctx.set_max_players(&team, 1).await.unwrap();
    let guest = ctx.create_user();
    let invite = ctx.share_link(&team, &team.owner).await.unwrap();
    assert!(invite.is_pre_approved);

    // Act
    let outcome = ctx.engine.accept_invite(&guest, invite.id).await.unwrap();

    // Assert
    assert_eq!(outcome.status, AdmissionStatus::InvalidData);
    assert_eq!(ctx.active_members(&team).await, 1);
    let stored = ctx.invite(invite.id).await.unwrap();
    assert_eq!(stored.status, InviteStatus::Pending);
    assert_eq!(stored.use_count, 0);
    assert!(ctx.store.snapshot().await.join_requests_of(team.id()).is_empty());
}

#[tokio::test]
async fn test_exhausted_invite_reports_max_uses() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();
    let mut input = CreateInviteInput::new(team.id(), InviteChannel::QrCode);
    input.max_uses = Some(1);
    let mut invite = common::expect_data(ctx.engine.create_invite(&team.owner, input).await.unwrap())
        .unwrap();

    invite.use_count = 1;
    let mut tx = ctx.store.begin().await.unwrap();
    tx.update_invite(&invite).await.unwrap();
    tx.commit().await.unwrap();

    // Act
    let guest = ctx.create_user();
    let outcome = ctx.engine.accept_invite(&guest, invite.id).await.unwrap();

    // Assert
    assert_eq!(outcome.status, AdmissionStatus::MaxUsesReached);
    assert_eq!(ctx.invite(invite.id).await.unwrap().use_count, 1);
    assert_eq!(ctx.active_members(&team).await, 1);
}

#[tokio::test]
async fn test_use_count_never_exceeds_max_uses() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();
    let mut input = CreateInviteInput::new(team.id(), InviteChannel::ShareLink);
    input.max_uses = Some(1);
    let invite = common::expect_data(ctx.engine.create_invite(&team.owner, input).await.unwrap())
        .unwrap();

    // Act
    let mut statuses = Vec::new();
    for _ in 0..4 {
        let guest = ctx.create_user();
        statuses.push(ctx.engine.accept_invite(&guest, invite.id).await.unwrap().status);
    }

    // Assert
    assert_eq!(
        statuses,
        vec![
            AdmissionStatus::Success,
            AdmissionStatus::AlreadyProcessed,
            AdmissionStatus::AlreadyProcessed,
            AdmissionStatus::AlreadyProcessed,
        ]
    );
    let stored = ctx.invite(invite.id).await.unwrap();
    assert_eq!(stored.use_count, 1);
    assert_eq!(ctx.active_members(&team).await, 2);
}

#[tokio::test]
async fn test_expired_invite_expires_exactly_once() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();
    let mut input = CreateInviteInput::new(team.id(), InviteChannel::ShareLink);
    input.expires_at = Some(ctx.now() + Duration::days(1));
    let invite = common::expect_data(ctx.engine.create_invite(&team.owner, input).await.unwrap())
        .unwrap();
    ctx.clock.advance(Duration::days(2));
    let guest = ctx.create_user();

    // Act
    let first = ctx.engine.accept_invite(&guest, invite.id).await.unwrap();
    let second = ctx.engine.accept_invite(&guest, invite.id).await.unwrap();

    // Assert
    assert_eq!(first.status, AdmissionStatus::InviteExpired);
    assert_eq!(first.data.unwrap().invite.status, InviteStatus::Expired);
    assert_eq!(second.status, AdmissionStatus::AlreadyProcessed);
    assert_eq!(second.data.unwrap().invite.status, InviteStatus::Expired);

    let stored = ctx.invite(invite.id).await.unwrap();
    assert_eq!(stored.status, InviteStatus::Expired);
    assert_eq!(stored.use_count, 0);
    assert_eq!(ctx.active_members(&team).await, 1);
    assert!(ctx.notifier.admitted_users().is_empty());
}

#[tokio::test]
async fn test_targeted_invite_refuses_other_users() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();
    let target = ctx.create_user();
    let intruder = ctx.create_user();
    let mut input = CreateInviteInput::new(team.id(), InviteChannel::Email);
    input.target_user_id = Some(target.user_id);
    let invite = common::expect_data(ctx.engine.create_invite(&team.owner, input).await.unwrap())
        .unwrap();

    // Act
    let outcome = ctx.engine.accept_invite(&intruder, invite.id).await.unwrap();

    // Assert
    assert_eq!(outcome.status, AdmissionStatus::Forbidden);
    assert_eq!(
        ctx.invite(invite.id).await.unwrap().status,
        InviteStatus::Pending
    );
}

#[tokio::test]
async fn test_plain_invite_leaves_join_request_pending() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();
    let member = ctx.add_member(&team).await.unwrap();
    ctx.set_setting(&team, keys::PLAYERS_MAY_INVITE, true)
        .await
        .unwrap();
    let invite = ctx.share_link(&team, &member).await.unwrap();
    let guest = ctx.create_user();

    // Act
    let outcome = ctx.engine.accept_invite(&guest, invite.id).await.unwrap();

    // Assert
    assert_eq!(outcome.status, AdmissionStatus::Success);
    let acceptance = outcome.data.unwrap();
    assert_eq!(acceptance.invite.status, InviteStatus::Accepted);
    assert_eq!(acceptance.invite.use_count, 1);
    assert!(acceptance.member.is_none());

    let request = acceptance.join_request.unwrap();
    assert_eq!(request.status, JoinRequestStatus::Pending);
    assert_eq!(request.source, JoinRequestSource::ShareLink);
    assert_eq!(request.invite_id, Some(invite.id));
    assert_eq!(ctx.active_members(&team).await, 2);
}

#[tokio::test]
async fn test_accept_by_token_and_already_member() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();
    let member = ctx.add_member(&team).await.unwrap();
    let guest = ctx.create_user();
    let for_guest = ctx.share_link(&team, &team.owner).await.unwrap();
    let for_member = ctx.share_link(&team, &team.owner).await.unwrap();

    // Act
    let accepted = ctx
        .engine
        .accept_invite_by_token(&guest, &for_guest.token)
        .await
        .unwrap();
    let already = ctx
        .engine
        .accept_invite_by_token(&member, &for_member.token)
        .await
        .unwrap();
    let unknown = ctx
        .engine
        .accept_invite_by_token(&guest, "no-such-token")
        .await
        .unwrap();

    // Assert
    assert_eq!(accepted.status, AdmissionStatus::Success);
    assert_eq!(already.status, AdmissionStatus::AlreadyMember);
    assert_eq!(unknown.status, AdmissionStatus::NotFound);
    assert_eq!(
        ctx.invite(for_member.id).await.unwrap().status,
        InviteStatus::Pending
    );
}

#[tokio::test]
async fn test_banned_user_cannot_accept() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();
    let member = ctx.add_member(&team).await.unwrap();

    let mut tx = ctx.store.begin().await.unwrap();
    let mut row = tx.find_member(team.id(), member.user_id).await.unwrap().unwrap();
    row.status = MemberStatus::Banned;
    tx.update_member(&row).await.unwrap();
    tx.commit().await.unwrap();

    let invite = ctx.share_link(&team, &team.owner).await.unwrap();

    // Act
    let outcome = ctx.engine.accept_invite(&member, invite.id).await.unwrap();

    // Assert
    assert_eq!(outcome.status, AdmissionStatus::Forbidden);
    assert_eq!(ctx.active_members(&team).await, 1);
}

#[tokio::test]
async fn test_failed_member_insert_rolls_back_acceptance() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();
    let invite = ctx.share_link(&team, &team.owner).await.unwrap();
    let guest = ctx.create_user();
    ctx.store.inject_member_insert_failure(true);

    // Act
    let result = ctx.engine.accept_invite(&guest, invite.id).await;

    // Assert
    assert!(result.is_err());
    let stored = ctx.invite(invite.id).await.unwrap();
    assert_eq!(stored.status, InviteStatus::Pending);
    assert_eq!(stored.use_count, 0);
    assert!(ctx.store.snapshot().await.join_requests_of(team.id()).is_empty());
    assert!(ctx.notifier.admitted_users().is_empty());

    ctx.store.inject_member_insert_failure(false);
    let retried = ctx.engine.accept_invite(&guest, invite.id).await.unwrap();
    assert_eq!(retried.status, AdmissionStatus::Success);
}

#[tokio::test]
async fn test_decline_and_revoke() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();
    let target = ctx.create_user();
    let stranger = ctx.create_user();

    let mut input = CreateInviteInput::new(team.id(), InviteChannel::Email);
    input.target_user_id = Some(target.user_id);
    let targeted = common::expect_data(
        ctx.engine
            .create_invite(&team.owner, input)
            .await
            .unwrap(),
    )
    .unwrap();
    let link = ctx.share_link(&team, &team.owner).await.unwrap();

    // Act
    let declined_by_stranger = ctx.engine.decline_invite(&stranger, targeted.id).await.unwrap();
    let declined = ctx.engine.decline_invite(&target, targeted.id).await.unwrap();
    let declined_link = ctx.engine.decline_invite(&stranger, link.id).await.unwrap();
    let revoked_by_stranger = ctx.engine.revoke_invite(&stranger, link.id).await.unwrap();
    let revoked = ctx.engine.revoke_invite(&team.owner, link.id).await.unwrap();
    let revoked_again = ctx.engine.revoke_invite(&team.owner, link.id).await.unwrap();
    let accepted_after_revoke = ctx.engine.accept_invite(&stranger, link.id).await.unwrap();

    // Assert
    assert_eq!(declined_by_stranger.status, AdmissionStatus::Forbidden);
    assert_eq!(declined.status, AdmissionStatus::Success);
    assert_eq!(declined.data.unwrap().status, InviteStatus::Declined);
    assert_eq!(declined_link.status, AdmissionStatus::InvalidData);
    assert_eq!(revoked_by_stranger.status, AdmissionStatus::Forbidden);
    assert_eq!(revoked.data.unwrap().status, InviteStatus::Revoked);
    assert_eq!(revoked_again.status, AdmissionStatus::AlreadyProcessed);
    assert_eq!(accepted_after_revoke.status, AdmissionStatus::AlreadyProcessed);
}

#[tokio::test]
async fn test_sweep_expires_only_lapsed_pending_invites() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();

    let mut short = CreateInviteInput::new(team.id(), InviteChannel::ShareLink);
    short.expires_at = Some(ctx.now() + Duration::hours(1));
    let short = common::expect_data(ctx.engine.create_invite(&team.owner, short).await.unwrap())
        .unwrap();
    let long = ctx.share_link(&team, &team.owner).await.unwrap();
    ctx.clock.advance(Duration::hours(2));

    // Act
    let expired = ctx.engine.expire_stale_invites().await.unwrap();
    let expired_again = ctx.engine.expire_stale_invites().await.unwrap();

    // Assert
    assert_eq!(expired, 1);
    assert_eq!(expired_again, 0);
    assert_eq!(ctx.invite(short.id).await.unwrap().status, InviteStatus::Expired);
    assert_eq!(ctx.invite(long.id).await.unwrap().status, InviteStatus::Pending);
}

#[tokio::test]
async fn test_list_invites_requires_invite_permission() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let team = ctx.create_team().await.unwrap();
    let member = ctx.add_member(&team).await.unwrap();
    ctx.share_link(&team, &team.owner).await.unwrap();

    // Act
    let as_owner = ctx.engine.list_invites(&team.owner, team.id()).await.unwrap();
    let as_member = ctx.engine.list_invites(&member, team.id()).await.unwrap();

    // Assert
    assert_eq!(as_owner.data.unwrap().len(), 2);
    assert_eq!(as_member.status, AdmissionStatus::Forbidden);
}

struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<(), AppError> {
        Err(AppError::internal_server_error_message("smtp unreachable"))
    }
}

#[tokio::test]
async fn test_notification_failure_does_not_undo_admission() {
    // Arrange
    common::setup_test_env();
    let ctx = common::TestContext::new().await.unwrap();
    let engine = AdmissionEngine::new(
        ctx.config.clone(),
        Arc::new(ctx.store.clone()),
        Arc::new(ctx.users.clone()),
        Arc::new(BrokenNotifier),
    );
    let owner = ctx.create_user();
    let guest = ctx.create_user();
    let team = common::expect_data(
        engine
            .create_team(
                &owner,
                CreateTeamInput {
                    name: "Night Owls".to_string(),
                },
            )
            .await
            .unwrap(),
    )
    .unwrap();
    let invite = common::expect_data(
        engine
            .create_invite(
                &owner,
                CreateInviteInput::new(team.id, InviteChannel::ShareLink),
            )
            .await
            .unwrap(),
    )
    .unwrap();

    // Act
    let outcome = engine
        .accept_invite(&guest, invite.id)
        .await
        .unwrap();

    // Assert
    assert_eq!(outcome.status, AdmissionStatus::Success);
    assert_eq!(ctx.store.snapshot().await.active_member_count(team.id), 2);
}
