//! The admission engine.
//!
//! Every public operation opens one store transaction, runs its checks
//! before any write, performs its writes on the same transaction and hands
//! the transaction to [`DatabaseTransaction::finish`]. Notifications are
//! collected while the transaction runs and dispatched after it commits.
//!
//! Operations that can add an active member lock the team row first, which
//! serializes admissions per team.
//!
//! The user directory is never consulted while a transaction is open: user
//! existence is resolved before `begin` and display names after the commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::database::models::{
    CreateInviteInput, CreateJoinRequestInput, CreateRuleInput, CreateTeamInput, InviteStatus,
    JoinRequestStatus, LifecycleStatus, MAX_POSITION_PREFERENCES, MemberStatus,
    SettingValueType, Team, TeamInvite, TeamJoinRequest, TeamMember, TeamMemberProfile,
    TeamRole, TeamRule, TeamRuleParameter, TeamSettingEntry, TeamSettings, TeamSettingsView,
    UpdateProfileInput, UpsertSettingInput,
};
use crate::database::store::{Store, StoreTx, UserDirectory};
use crate::database::transaction::DatabaseTransaction;
use crate::error::AppError;
use crate::services::capacity;
use crate::services::clock::{Clock, SystemClock};
use crate::services::hiatus::{self, HiatusLimits};
use crate::services::invites::{self, InviteCheck};
use crate::services::join_requests;
use crate::services::notifier::{self, Notification, Notifier};
use crate::services::outcome::{AdmissionStatus, Outcome};
use crate::services::policy::{self, Caller, PolicyAction};
use crate::services::settings::{SettingsStore, TeamSettingsSnapshot};

/// Invite after an acceptance attempt, with whatever the attempt produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteAcceptance {
    pub invite: TeamInvite,
    pub join_request: Option<TeamJoinRequest>,
    pub member: Option<TeamMember>,
}

impl InviteAcceptance {
    fn invite_only(invite: TeamInvite) -> Self {
        Self {
            invite,
            join_request: None,
            member: None,
        }
    }
}

/// Who is using an invite, checked against the directory before the
/// transaction opened.
struct InviteAdmission {
    user_id: Uuid,
    user_known: bool,
    message: Option<String>,
    now: DateTime<Utc>,
}

/// Membership as seen by a role change or removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Standing {
    SystemAdmin,
    Role(TeamRole),
    Outsider,
}

impl Standing {
    fn is_team_admin(&self) -> bool {
        matches!(self, Standing::SystemAdmin | Standing::Role(TeamRole::Admin))
    }
}

pub struct AdmissionEngine {
    config: Config,
    store: Arc<dyn Store>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    settings: SettingsStore,
    clock: Arc<dyn Clock>,
}

impl AdmissionEngine {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let settings = SettingsStore::new(&config);
        Self {
            config,
            store,
            users,
            notifier,
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn complete<T>(
        &self,
        tx: Box<dyn StoreTx>,
        result: Result<T, AppError>,
        notifications: Vec<Notification>,
    ) -> Result<T, AppError> {
        let value = DatabaseTransaction::finish(tx, result).await?;
        let notifications = self.with_display_names(notifications).await;
        notifier::dispatch(self.notifier.as_ref(), notifications).await;
        Ok(value)
    }

    /// Fills in the display name of admitted members. A failed lookup only
    /// leaves the name out.
    async fn with_display_names(&self, mut notifications: Vec<Notification>) -> Vec<Notification> {
        for notification in &mut notifications {
            let Notification::MemberAdmitted {
                user_id,
                display_name,
                ..
            } = notification
            else {
                continue;
            };
            if display_name.is_some() {
                continue;
            }
            match self.users.user_display_name(*user_id).await {
                Ok(name) => *display_name = name,
                Err(e) => log::warn!("Could not resolve display name of {}: {}", user_id, e),
            }
        }
        notifications
    }

    async fn active_role(
        &self,
        tx: &mut dyn StoreTx,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamRole>, AppError> {
        Ok(tx
            .find_member(team_id, user_id)
            .await?
            .and_then(|member| member.active_role()))
    }

    async fn standing(
        &self,
        tx: &mut dyn StoreTx,
        team_id: Uuid,
        caller: &Caller,
    ) -> Result<Standing, AppError> {
        if caller.is_system_admin() {
            return Ok(Standing::SystemAdmin);
        }
        Ok(match self.active_role(tx, team_id, caller.user_id).await? {
            Some(role) => Standing::Role(role),
            None => Standing::Outsider,
        })
    }

    async fn permits(
        &self,
        tx: &mut dyn StoreTx,
        team_id: Uuid,
        caller: &Caller,
        action: PolicyAction,
    ) -> Result<bool, AppError> {
        let role = self.active_role(tx, team_id, caller.user_id).await?;
        let settings = SettingsStore::load(tx, team_id).await?;
        Ok(policy::evaluate(caller, role, action, &settings).is_allowed())
    }

    /// Makes `user_id` an active `User` of the team, reusing a previous
    /// membership row when there is one.
    async fn admit_member(
        &self,
        tx: &mut dyn StoreTx,
        team_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
        notifications: &mut Vec<Notification>,
    ) -> Result<TeamMember, AppError> {
        let member = match tx.find_member(team_id, user_id).await? {
            Some(mut member) => {
                member.role = TeamRole::User;
                member.status = MemberStatus::Active;
                member.joined_at = now;
                member.updated_at = now;
                tx.update_member(&member).await?;
                member
            }
            None => {
                let member = TeamMember::new_active(team_id, user_id, TeamRole::User, now);
                tx.insert_member(&member).await?;
                member
            }
        };

        log::info!("User {} admitted to team {}", user_id, team_id);
        notifications.push(Notification::MemberAdmitted {
            member_id: member.id,
            team_id,
            user_id,
            display_name: None,
        });

        Ok(member)
    }

    // ------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------

    /// Creates a team owned by the caller, its settings record and the
    /// owner's `Admin` membership.
    pub async fn create_team(
        &self,
        caller: &Caller,
        input: CreateTeamInput,
    ) -> Result<Outcome<Team>, AppError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Ok(Outcome::invalid_data());
        }
        if !self.users.user_exists(caller.user_id).await? {
            return Ok(Outcome::status(AdmissionStatus::UserNotFound));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            if tx
                .find_team_by_owner_and_name(caller.user_id, &name)
                .await?
                .is_some()
            {
                return Ok(Outcome::invalid_data());
            }

            let team = Team::new(caller.user_id, name, now);
            tx.insert_team(&team).await?;
            tx.insert_settings(&TeamSettings::new(team.id, now)).await?;
            tx.insert_member(&TeamMember::new_active(
                team.id,
                caller.user_id,
                TeamRole::Admin,
                now,
            ))
            .await?;

            log::info!("Team {} ({}) created by {}", team.id, team.name, caller.user_id);
            Ok(Outcome::success(team))
        }
        .await;

        self.complete(tx, result, Vec::new()).await
    }

    pub async fn list_members(
        &self,
        caller: &Caller,
        team_id: Uuid,
    ) -> Result<Outcome<Vec<TeamMember>>, AppError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            if tx.find_team(team_id).await?.is_none() {
                return Ok(Outcome::status(AdmissionStatus::TeamNotFound));
            }
            if self.standing(tx, team_id, caller).await? == Standing::Outsider {
                return Ok(Outcome::forbidden());
            }
            Ok(Outcome::success(tx.list_members(team_id).await?))
        }
        .await;

        self.complete(tx, result, Vec::new()).await
    }

    /// Whether the team could take one more active member right now.
    pub async fn can_admit_one_more(&self, team_id: Uuid) -> Result<Outcome<bool>, AppError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            if tx.find_team(team_id).await?.is_none() {
                return Ok(Outcome::status(AdmissionStatus::TeamNotFound));
            }
            let settings = self.settings.snapshot(tx, team_id).await?;
            let admit = capacity::can_admit_one_more(tx, team_id, &settings).await?;
            Ok(Outcome::success(admit))
        }
        .await;

        self.complete(tx, result, Vec::new()).await
    }

    /// Policy decision for `caller` on `action` in the team, without acting.
    pub async fn is_permitted(
        &self,
        caller: &Caller,
        team_id: Uuid,
        action: PolicyAction,
    ) -> Result<bool, AppError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            let role = self.active_role(tx, team_id, caller.user_id).await?;
            let settings = self.settings.snapshot(tx, team_id).await?;
            Ok(policy::evaluate(caller, role, action, &settings).is_allowed())
        }
        .await;
        self.complete(tx, result, Vec::new()).await
    }

    // ------------------------------------------------------------------
    // Invites
    // ------------------------------------------------------------------

    pub async fn create_invite(
        &self,
        caller: &Caller,
        input: CreateInviteInput,
    ) -> Result<Outcome<TeamInvite>, AppError> {
        let now = self.clock.now();
        let target_known = match input.target_user_id {
            Some(target) => self.users.user_exists(target).await?,
            None => true,
        };
        let mut notifications = Vec::new();
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            if tx.find_team(input.team_id).await?.is_none() {
                return Ok(Outcome::status(AdmissionStatus::TeamNotFound));
            }
            if !self
                .permits(tx, input.team_id, caller, PolicyAction::CreateInvite)
                .await?
            {
                return Ok(Outcome::forbidden());
            }
            if !invites::input_is_valid(&input, now) {
                return Ok(Outcome::invalid_data());
            }
            if !target_known {
                return Ok(Outcome::status(AdmissionStatus::UserNotFound));
            }

            let is_pre_approved = self.standing(tx, input.team_id, caller).await?.is_team_admin();
            let token = invites::generate_token(self.config.invite_token_bytes);
            let invite = invites::new_invite(
                input,
                caller.user_id,
                is_pre_approved,
                token,
                self.config.default_invite_expiry(),
                now,
            );
            tx.insert_invite(&invite).await?;

            log::info!(
                "Invite {} created for team {} by {} (pre-approved: {})",
                invite.id,
                invite.team_id,
                caller.user_id,
                invite.is_pre_approved
            );
            notifications.push(Notification::InviteCreated {
                invite_id: invite.id,
                team_id: invite.team_id,
                target_user_id: invite.target_user_id,
                target_email: invite.target_email.clone(),
            });
            Ok(Outcome::success(invite))
        }
        .await;

        self.complete(tx, result, notifications).await
    }

    pub async fn list_invites(
        &self,
        caller: &Caller,
        team_id: Uuid,
    ) -> Result<Outcome<Vec<TeamInvite>>, AppError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            if tx.find_team(team_id).await?.is_none() {
                return Ok(Outcome::status(AdmissionStatus::TeamNotFound));
            }
            if !self
                .permits(tx, team_id, caller, PolicyAction::CreateInvite)
                .await?
            {
                return Ok(Outcome::forbidden());
            }
            Ok(Outcome::success(tx.list_invites(team_id).await?))
        }
        .await;

        self.complete(tx, result, Vec::new()).await
    }

    pub async fn accept_invite(
        &self,
        caller: &Caller,
        invite_id: Uuid,
    ) -> Result<Outcome<InviteAcceptance>, AppError> {
        let now = self.clock.now();
        let user_known = self.users.user_exists(caller.user_id).await?;
        let mut notifications = Vec::new();
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            let Some(invite) = tx.find_invite(invite_id).await? else {
                return Ok(Outcome::not_found());
            };
            let admission = InviteAdmission {
                user_id: caller.user_id,
                user_known,
                message: None,
                now,
            };
            self.admit_through_invite(tx, invite, admission, &mut notifications)
                .await
        }
        .await;

        self.complete(tx, result, notifications).await
    }

    /// Accepts the invite behind a share link or QR code.
    pub async fn accept_invite_by_token(
        &self,
        caller: &Caller,
        token: &str,
    ) -> Result<Outcome<InviteAcceptance>, AppError> {
        let now = self.clock.now();
        let user_known = self.users.user_exists(caller.user_id).await?;
        let mut notifications = Vec::new();
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            let Some(invite) = tx.find_invite_by_token(token.trim()).await? else {
                return Ok(Outcome::not_found());
            };
            let admission = InviteAdmission {
                user_id: caller.user_id,
                user_known,
                message: None,
                now,
            };
            self.admit_through_invite(tx, invite, admission, &mut notifications)
                .await
        }
        .await;

        self.complete(tx, result, notifications).await
    }

    /// Shared by invite acceptance and invite-driven join requests.
    async fn admit_through_invite(
        &self,
        tx: &mut dyn StoreTx,
        mut invite: TeamInvite,
        admission: InviteAdmission,
        notifications: &mut Vec<Notification>,
    ) -> Result<Outcome<InviteAcceptance>, AppError> {
        let InviteAdmission {
            user_id,
            user_known,
            message,
            now,
        } = admission;
        match invites::check_usable(&invite, user_id, now) {
            InviteCheck::Usable => {}
            InviteCheck::WrongUser => return Ok(Outcome::forbidden()),
            InviteCheck::Lapsed => {
                invites::close(&mut invite, InviteStatus::Expired)?;
                tx.update_invite(&invite).await?;
                log::info!("Invite {} expired on use", invite.id);
                return Ok(Outcome::with_data(
                    AdmissionStatus::InviteExpired,
                    InviteAcceptance::invite_only(invite),
                ));
            }
            InviteCheck::AlreadyProcessed => {
                return Ok(Outcome::with_data(
                    AdmissionStatus::AlreadyProcessed,
                    InviteAcceptance::invite_only(invite),
                ));
            }
            InviteCheck::MaxUsesReached => {
                return Ok(Outcome::status(AdmissionStatus::MaxUsesReached));
            }
        }

        let team_id = invite.team_id;
        if tx.lock_team(team_id).await?.is_none() {
            return Ok(Outcome::status(AdmissionStatus::TeamNotFound));
        }
        if !user_known {
            return Ok(Outcome::status(AdmissionStatus::UserNotFound));
        }
        if let Some(member) = tx.find_member(team_id, user_id).await? {
            if member.is_banned() {
                return Ok(Outcome::forbidden());
            }
            if member.is_active() {
                return Ok(Outcome::status(AdmissionStatus::AlreadyMember));
            }
        }
        if let Some(pending) = tx.find_pending_join_request(team_id, user_id).await? {
            return Ok(Outcome::with_data(
                AdmissionStatus::AlreadyProcessed,
                InviteAcceptance {
                    invite,
                    join_request: Some(pending),
                    member: None,
                },
            ));
        }
        if invite.is_pre_approved {
            let settings = SettingsStore::load(tx, team_id).await?;
            if !capacity::can_admit_one_more(tx, team_id, &settings).await? {
                return Ok(Outcome::invalid_data());
            }
        }

        let request = join_requests::new_request_from_invite(&invite, user_id, message, now);
        tx.insert_join_request(&request).await?;

        let member = if request.status == JoinRequestStatus::Approved {
            Some(
                self.admit_member(tx, team_id, user_id, now, notifications)
                    .await?,
            )
        } else {
            notifications.push(Notification::JoinRequestSubmitted {
                request_id: request.id,
                team_id,
                user_id,
            });
            None
        };

        invites::mark_accepted(&mut invite, now)?;
        tx.update_invite(&invite).await?;

        log::info!(
            "Invite {} accepted by {} (join request {} is {})",
            invite.id,
            user_id,
            request.id,
            request.status
        );
        Ok(Outcome::success(InviteAcceptance {
            invite,
            join_request: Some(request),
            member,
        }))
    }

    /// The invited user turns a targeted invite down.
    pub async fn decline_invite(
        &self,
        caller: &Caller,
        invite_id: Uuid,
    ) -> Result<Outcome<TeamInvite>, AppError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            let Some(mut invite) = tx.find_invite(invite_id).await? else {
                return Ok(Outcome::not_found());
            };
            match invite.target_user_id {
                None => return Ok(Outcome::invalid_data()),
                Some(target) if target != caller.user_id => return Ok(Outcome::forbidden()),
                Some(_) => {}
            }
            match invites::check_usable(&invite, caller.user_id, now) {
                InviteCheck::Lapsed => {
                    invites::close(&mut invite, InviteStatus::Expired)?;
                    tx.update_invite(&invite).await?;
                    return Ok(Outcome::with_data(AdmissionStatus::InviteExpired, invite));
                }
                InviteCheck::AlreadyProcessed => {
                    return Ok(Outcome::with_data(AdmissionStatus::AlreadyProcessed, invite));
                }
                InviteCheck::Usable | InviteCheck::MaxUsesReached | InviteCheck::WrongUser => {}
            }

            invites::close(&mut invite, InviteStatus::Declined)?;
            tx.update_invite(&invite).await?;
            log::info!("Invite {} declined by {}", invite.id, caller.user_id);
            Ok(Outcome::success(invite))
        }
        .await;

        self.complete(tx, result, Vec::new()).await
    }

    /// Withdraws a pending invite. Allowed to its creator and team admins.
    pub async fn revoke_invite(
        &self,
        caller: &Caller,
        invite_id: Uuid,
    ) -> Result<Outcome<TeamInvite>, AppError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            let Some(mut invite) = tx.find_invite(invite_id).await? else {
                return Ok(Outcome::not_found());
            };
            let is_creator = invite.created_by == caller.user_id;
            if !is_creator && !self.standing(tx, invite.team_id, caller).await?.is_team_admin() {
                return Ok(Outcome::forbidden());
            }
            if !invite.status.is_pending() {
                return Ok(Outcome::with_data(AdmissionStatus::AlreadyProcessed, invite));
            }

            invites::close(&mut invite, InviteStatus::Revoked)?;
            tx.update_invite(&invite).await?;
            log::info!("Invite {} revoked by {}", invite.id, caller.user_id);
            Ok(Outcome::success(invite))
        }
        .await;

        self.complete(tx, result, Vec::new()).await
    }

    /// Moves every pending invite past its expiry to `Expired`.
    pub async fn expire_stale_invites(&self) -> Result<usize, AppError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            let stale = tx.list_expired_pending_invites(now).await?;
            let count = stale.len();
            for mut invite in stale {
                invites::close(&mut invite, InviteStatus::Expired)?;
                tx.update_invite(&invite).await?;
            }
            Ok(count)
        }
        .await;

        let count = self.complete(tx, result, Vec::new()).await?;
        if count > 0 {
            log::info!("Expired {} stale invites", count);
        }
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Join requests
    // ------------------------------------------------------------------

    /// Self-service request to join a team, optionally through an invite.
    pub async fn create_join_request(
        &self,
        caller: &Caller,
        input: CreateJoinRequestInput,
    ) -> Result<Outcome<TeamJoinRequest>, AppError> {
        let now = self.clock.now();
        let user_known = self.users.user_exists(caller.user_id).await?;
        let mut notifications = Vec::new();
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            let team_id = input.team_id;
            let user_id = caller.user_id;

            if tx.lock_team(team_id).await?.is_none() {
                return Ok(Outcome::status(AdmissionStatus::TeamNotFound));
            }
            if !user_known {
                return Ok(Outcome::status(AdmissionStatus::UserNotFound));
            }
            if !self
                .permits(tx, team_id, caller, PolicyAction::CreateJoinRequest)
                .await?
            {
                return Ok(Outcome::forbidden());
            }

            if let Some(invite_id) = input.invite_id {
                let Some(invite) = tx.find_invite(invite_id).await? else {
                    return Ok(Outcome::not_found());
                };
                if invite.team_id != team_id {
                    return Ok(Outcome::invalid_data());
                }
                let admission = InviteAdmission {
                    user_id,
                    user_known,
                    message: input.message,
                    now,
                };
                let outcome = self
                    .admit_through_invite(tx, invite, admission, &mut notifications)
                    .await?;
                return Ok(Outcome {
                    status: outcome.status,
                    data: outcome.data.and_then(|acceptance| acceptance.join_request),
                });
            }

            if let Some(member) = tx.find_member(team_id, user_id).await? {
                if member.is_banned() {
                    return Ok(Outcome::forbidden());
                }
                if member.is_active() {
                    return Ok(Outcome::status(AdmissionStatus::AlreadyMember));
                }
            }
            if let Some(pending) = tx.find_pending_join_request(team_id, user_id).await? {
                return Ok(Outcome::with_data(AdmissionStatus::AlreadyProcessed, pending));
            }

            let request =
                join_requests::new_direct_request(team_id, user_id, input.source, input.message, now);
            tx.insert_join_request(&request).await?;

            log::info!(
                "Join request {} from {} to team {} ({})",
                request.id,
                user_id,
                team_id,
                request.source
            );
            notifications.push(Notification::JoinRequestSubmitted {
                request_id: request.id,
                team_id,
                user_id,
            });
            Ok(Outcome::success(request))
        }
        .await;

        self.complete(tx, result, notifications).await
    }

    /// Approves or rejects a pending join request.
    pub async fn review_join_request(
        &self,
        caller: &Caller,
        request_id: Uuid,
        approve: bool,
    ) -> Result<Outcome<TeamJoinRequest>, AppError> {
        let now = self.clock.now();
        let mut notifications = Vec::new();
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            let Some(mut request) = tx.find_join_request(request_id).await? else {
                return Ok(Outcome::not_found());
            };
            let team_id = request.team_id;
            if tx.lock_team(team_id).await?.is_none() {
                return Ok(Outcome::status(AdmissionStatus::TeamNotFound));
            }

            let action = if approve {
                PolicyAction::ApproveRequest
            } else {
                PolicyAction::RejectRequest
            };
            if !self.permits(tx, team_id, caller, action).await? {
                return Ok(Outcome::forbidden());
            }
            if !request.status.is_pending() {
                return Ok(Outcome::with_data(AdmissionStatus::AlreadyProcessed, request));
            }

            if !approve {
                join_requests::review(&mut request, JoinRequestStatus::Rejected, caller.user_id, now)?;
                tx.update_join_request(&request).await?;
            } else {
                let existing = tx.find_member(team_id, request.user_id).await?;
                if existing.as_ref().is_some_and(TeamMember::is_banned) {
                    return Ok(Outcome::forbidden());
                }
                let settings = SettingsStore::load(tx, team_id).await?;
                if !capacity::can_admit_one_more(tx, team_id, &settings).await? {
                    return Ok(Outcome::invalid_data());
                }
                let already_active = existing.as_ref().is_some_and(TeamMember::is_active);

                join_requests::review(&mut request, JoinRequestStatus::Approved, caller.user_id, now)?;
                tx.update_join_request(&request).await?;
                if !already_active {
                    self.admit_member(tx, team_id, request.user_id, now, &mut notifications)
                        .await?;
                }
            }

            log::info!(
                "Join request {} {} by {}",
                request.id,
                request.status,
                caller.user_id
            );
            notifications.push(Notification::JoinRequestReviewed {
                request_id: request.id,
                team_id,
                user_id: request.user_id,
                status: request.status,
            });
            Ok(Outcome::success(request))
        }
        .await;

        self.complete(tx, result, notifications).await
    }

    /// The requester withdraws their pending request.
    pub async fn cancel_join_request(
        &self,
        caller: &Caller,
        request_id: Uuid,
    ) -> Result<Outcome<TeamJoinRequest>, AppError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            let Some(mut request) = tx.find_join_request(request_id).await? else {
                return Ok(Outcome::not_found());
            };
            if request.user_id != caller.user_id && !caller.is_system_admin() {
                return Ok(Outcome::forbidden());
            }
            if !request.status.is_pending() {
                return Ok(Outcome::with_data(AdmissionStatus::AlreadyProcessed, request));
            }

            join_requests::cancel(&mut request, now)?;
            tx.update_join_request(&request).await?;
            log::info!("Join request {} cancelled", request.id);
            Ok(Outcome::success(request))
        }
        .await;

        self.complete(tx, result, Vec::new()).await
    }

    /// Requests of a team, for callers who may approve or reject them.
    pub async fn list_join_requests(
        &self,
        caller: &Caller,
        team_id: Uuid,
        status: Option<JoinRequestStatus>,
    ) -> Result<Outcome<Vec<TeamJoinRequest>>, AppError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            if tx.find_team(team_id).await?.is_none() {
                return Ok(Outcome::status(AdmissionStatus::TeamNotFound));
            }
            let may_review = self
                .permits(tx, team_id, caller, PolicyAction::ApproveRequest)
                .await?
                || self
                    .permits(tx, team_id, caller, PolicyAction::RejectRequest)
                    .await?;
            if !may_review {
                return Ok(Outcome::forbidden());
            }
            Ok(Outcome::success(tx.list_join_requests(team_id, status).await?))
        }
        .await;

        self.complete(tx, result, Vec::new()).await
    }

    // ------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------

    pub async fn assign_moderator(
        &self,
        caller: &Caller,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Outcome<TeamMember>, AppError> {
        self.change_role(caller, team_id, user_id, TeamRole::Moderator)
            .await
    }

    pub async fn remove_moderator(
        &self,
        caller: &Caller,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Outcome<TeamMember>, AppError> {
        self.change_role(caller, team_id, user_id, TeamRole::User)
            .await
    }

    async fn change_role(
        &self,
        caller: &Caller,
        team_id: Uuid,
        user_id: Uuid,
        role: TeamRole,
    ) -> Result<Outcome<TeamMember>, AppError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            if tx.lock_team(team_id).await?.is_none() {
                return Ok(Outcome::status(AdmissionStatus::TeamNotFound));
            }
            if !self
                .permits(tx, team_id, caller, PolicyAction::AssignModerator)
                .await?
            {
                return Ok(Outcome::forbidden());
            }
            let Some(mut member) = tx
                .find_member(team_id, user_id)
                .await?
                .filter(TeamMember::is_active)
            else {
                return Ok(Outcome::not_found());
            };
            if member.role == TeamRole::Admin {
                return Ok(Outcome::invalid_data());
            }
            if member.role == role {
                return Ok(Outcome::with_data(AdmissionStatus::AlreadyProcessed, member));
            }

            member.role = role;
            member.updated_at = now;
            tx.update_member(&member).await?;
            log::info!(
                "Member {} of team {} is now {} (by {})",
                user_id,
                team_id,
                role,
                caller.user_id
            );
            Ok(Outcome::success(member))
        }
        .await;

        self.complete(tx, result, Vec::new()).await
    }

    /// Moves an active member to `Removed`.
    pub async fn remove_player(
        &self,
        caller: &Caller,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Outcome<TeamMember>, AppError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            let Some(team) = tx.lock_team(team_id).await? else {
                return Ok(Outcome::status(AdmissionStatus::TeamNotFound));
            };
            if !self
                .permits(tx, team_id, caller, PolicyAction::RemovePlayer)
                .await?
            {
                return Ok(Outcome::forbidden());
            }
            let Some(mut member) = tx
                .find_member(team_id, user_id)
                .await?
                .filter(TeamMember::is_active)
            else {
                return Ok(Outcome::not_found());
            };
            if team.owner_id == user_id {
                return Ok(Outcome::invalid_data());
            }
            if member.role != TeamRole::User
                && !self.standing(tx, team_id, caller).await?.is_team_admin()
            {
                return Ok(Outcome::forbidden());
            }

            member.status = MemberStatus::Removed;
            member.updated_at = now;
            tx.update_member(&member).await?;
            log::info!(
                "Member {} removed from team {} by {}",
                user_id,
                team_id,
                caller.user_id
            );
            Ok(Outcome::success(member))
        }
        .await;

        self.complete(tx, result, Vec::new()).await
    }

    /// Edits fee exemption, position preferences and hiatus of a member.
    pub async fn update_player_profile(
        &self,
        caller: &Caller,
        team_id: Uuid,
        user_id: Uuid,
        input: UpdateProfileInput,
    ) -> Result<Outcome<TeamMemberProfile>, AppError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            if tx.lock_team(team_id).await?.is_none() {
                return Ok(Outcome::status(AdmissionStatus::TeamNotFound));
            }
            let Some(member) = tx
                .find_member(team_id, user_id)
                .await?
                .filter(TeamMember::is_active)
            else {
                return Ok(Outcome::not_found());
            };

            let is_admin = self.standing(tx, team_id, caller).await?.is_team_admin();
            if caller.user_id != user_id && !is_admin {
                return Ok(Outcome::forbidden());
            }
            if input.is_fee_exempt.is_some() && !is_admin {
                return Ok(Outcome::forbidden());
            }
            if let Some(positions) = &input.position_preferences {
                if positions.len() > MAX_POSITION_PREFERENCES
                    || positions.iter().any(|position| position.trim().is_empty())
                {
                    return Ok(Outcome::invalid_data());
                }
            }

            let mut profile = match tx.find_profile(member.id).await? {
                Some(profile) => profile,
                None => TeamMemberProfile::new(member.id, now),
            };

            let hiatus_change = match (input.is_on_hiatus, input.hiatus_ends_at) {
                (Some(true), ends_at) => {
                    let limits = self.hiatus_limits(tx, team_id).await?;
                    hiatus::start(
                        &mut profile,
                        ends_at,
                        limits,
                        now,
                        self.config.hiatus_window_months,
                    )
                }
                (Some(false), _) => {
                    hiatus::end(&mut profile);
                    Ok(())
                }
                (None, Some(ends_at)) => {
                    let limits = self.hiatus_limits(tx, team_id).await?;
                    hiatus::adjust_end(&mut profile, Some(ends_at), limits)
                }
                (None, None) => Ok(()),
            };
            if let Err(rejection) = hiatus_change {
                log::info!("Hiatus change for member {} rejected: {}", member.id, rejection);
                return Ok(Outcome::invalid_data());
            }

            if let Some(is_fee_exempt) = input.is_fee_exempt {
                profile.is_fee_exempt = is_fee_exempt;
            }
            if let Some(positions) = input.position_preferences {
                profile.position_preferences = positions
                    .into_iter()
                    .map(|position| position.trim().to_string())
                    .collect();
            }
            profile.updated_at = now;
            tx.save_profile(&profile).await?;

            Ok(Outcome::success(profile))
        }
        .await;

        self.complete(tx, result, Vec::new()).await
    }

    async fn hiatus_limits(
        &self,
        tx: &mut dyn StoreTx,
        team_id: Uuid,
    ) -> Result<HiatusLimits, AppError> {
        let settings = SettingsStore::load(tx, team_id).await?;
        Ok(HiatusLimits::from_settings(&settings))
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Enabled settings of a team as the policy and capacity checks see them.
    pub async fn team_settings(
        &self,
        team_id: Uuid,
    ) -> Result<Arc<TeamSettingsSnapshot>, AppError> {
        let mut tx = self.store.begin().await?;
        let result = self.settings.snapshot(tx.as_mut(), team_id).await;
        self.complete(tx, result, Vec::new()).await
    }

    async fn settings_record(
        &self,
        tx: &mut dyn StoreTx,
        team_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<TeamSettings, AppError> {
        if let Some(settings) = tx.find_settings(team_id).await? {
            return Ok(settings);
        }
        let settings = TeamSettings::new(team_id, now);
        tx.insert_settings(&settings).await?;
        Ok(settings)
    }

    pub async fn upsert_setting(
        &self,
        caller: &Caller,
        team_id: Uuid,
        input: UpsertSettingInput,
    ) -> Result<Outcome<TeamSettingEntry>, AppError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            if tx.lock_team(team_id).await?.is_none() {
                return Ok(Outcome::status(AdmissionStatus::TeamNotFound));
            }
            if !self
                .permits(tx, team_id, caller, PolicyAction::ManageSettings)
                .await?
            {
                return Ok(Outcome::forbidden());
            }
            let key = input.key.trim().to_string();
            if key.is_empty() || !value_matches_type(&input.value, input.value_type) {
                return Ok(Outcome::invalid_data());
            }

            let settings = self.settings_record(tx, team_id, now).await?;
            let existing = tx
                .list_setting_entries(settings.id)
                .await?
                .into_iter()
                .find(|entry| entry.key == key);
            let entry = TeamSettingEntry {
                id: existing.map_or_else(Uuid::new_v4, |entry| entry.id),
                settings_id: settings.id,
                key,
                value: input.value,
                value_type: input.value_type,
                is_enabled: input.is_enabled,
                description: input.description,
                updated_at: now,
            };
            tx.save_setting_entry(&entry).await?;

            log::info!(
                "Setting {} of team {} set to {:?} (enabled: {})",
                entry.key,
                team_id,
                entry.value,
                entry.is_enabled
            );
            Ok(Outcome::success(entry))
        }
        .await;

        let outcome = self.complete(tx, result, Vec::new()).await?;
        if outcome.is_success() {
            self.settings.invalidate(team_id).await;
        }
        Ok(outcome)
    }

    /// Settings record with all entries (enabled or not) and rules.
    pub async fn get_settings(
        &self,
        caller: &Caller,
        team_id: Uuid,
    ) -> Result<Outcome<TeamSettingsView>, AppError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            if tx.find_team(team_id).await?.is_none() {
                return Ok(Outcome::status(AdmissionStatus::TeamNotFound));
            }
            if self.standing(tx, team_id, caller).await? == Standing::Outsider {
                return Ok(Outcome::forbidden());
            }
            let Some(settings) = tx.find_settings(team_id).await? else {
                return Ok(Outcome::not_found());
            };
            let entries = tx.list_setting_entries(settings.id).await?;
            let rules = tx.list_rules(settings.id).await?;
            Ok(Outcome::success(TeamSettingsView {
                settings,
                entries,
                rules,
            }))
        }
        .await;

        self.complete(tx, result, Vec::new()).await
    }

    pub async fn add_rule(
        &self,
        caller: &Caller,
        team_id: Uuid,
        input: CreateRuleInput,
    ) -> Result<Outcome<TeamRule>, AppError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            if tx.lock_team(team_id).await?.is_none() {
                return Ok(Outcome::status(AdmissionStatus::TeamNotFound));
            }
            if !self
                .permits(tx, team_id, caller, PolicyAction::ManageSettings)
                .await?
            {
                return Ok(Outcome::forbidden());
            }
            let name = input.name.trim().to_string();
            let bad_window = matches!(
                (input.starts_at, input.ends_at),
                (Some(starts_at), Some(ends_at)) if ends_at <= starts_at
            );
            let bad_parameter = input
                .parameters
                .iter()
                .any(|parameter| parameter.key.trim().is_empty());
            if name.is_empty() || bad_window || bad_parameter {
                return Ok(Outcome::invalid_data());
            }

            let settings = self.settings_record(tx, team_id, now).await?;
            let rule_id = Uuid::new_v4();
            let rule = TeamRule {
                id: rule_id,
                settings_id: settings.id,
                name,
                starts_at: input.starts_at,
                ends_at: input.ends_at,
                created_at: now,
                parameters: input
                    .parameters
                    .into_iter()
                    .map(|parameter| TeamRuleParameter {
                        id: Uuid::new_v4(),
                        rule_id,
                        key: parameter.key.trim().to_string(),
                        value: parameter.value,
                    })
                    .collect(),
            };
            tx.insert_rule(&rule).await?;

            log::info!("Rule {} ({}) added to team {}", rule.id, rule.name, team_id);
            Ok(Outcome::success(rule))
        }
        .await;

        self.complete(tx, result, Vec::new()).await
    }

    /// Rules of a team; with `active_at`, only those in effect at that time.
    pub async fn list_rules(
        &self,
        caller: &Caller,
        team_id: Uuid,
        active_at: Option<DateTime<Utc>>,
    ) -> Result<Outcome<Vec<TeamRule>>, AppError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let tx = tx.as_mut();
            if tx.find_team(team_id).await?.is_none() {
                return Ok(Outcome::status(AdmissionStatus::TeamNotFound));
            }
            if self.standing(tx, team_id, caller).await? == Standing::Outsider {
                return Ok(Outcome::forbidden());
            }
            let rules = match tx.find_settings(team_id).await? {
                Some(settings) => tx.list_rules(settings.id).await?,
                None => Vec::new(),
            };
            let rules = match active_at {
                Some(at) => rules.into_iter().filter(|rule| rule.is_active_at(at)).collect(),
                None => rules,
            };
            Ok(Outcome::success(rules))
        }
        .await;

        self.complete(tx, result, Vec::new()).await
    }
}

/// Typed entries must hold a value their accessor can read.
fn value_matches_type(value: &str, value_type: Option<SettingValueType>) -> bool {
    match value_type {
        Some(SettingValueType::Boolean) => {
            let value = value.trim();
            value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")
        }
        Some(SettingValueType::Integer) => value.trim().parse::<i64>().is_ok(),
        Some(SettingValueType::Text) | None => true,
    }
}
