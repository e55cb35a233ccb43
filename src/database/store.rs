//! Repository boundary of the admission engine.
//!
//! The engine never talks to a database directly. It opens a [`StoreTx`]
//! through a [`Store`], performs its reads and writes on it, and finishes it
//! with [`crate::database::transaction::DatabaseTransaction::finish`], which
//! commits every enclosed write or none of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::models::{
    JoinRequestStatus, Team, TeamInvite, TeamJoinRequest, TeamMember, TeamMemberProfile,
    TeamRule, TeamSettingEntry, TeamSettings,
};
use crate::error::AppError;

/// One open unit of work.
///
/// Implementations must make all writes performed through the same `StoreTx`
/// visible to later reads on it, and invisible to other transactions until
/// [`StoreTx::commit`] succeeds.
#[async_trait]
pub trait StoreTx: Send {
    async fn find_team(&mut self, team_id: Uuid) -> Result<Option<Team>, AppError>;

    /// Reads the team and holds it for update until the transaction ends.
    ///
    /// Admissions that may grow a team take this lock first, so the
    /// capacity check and the member insert of one admission are never
    /// interleaved with another admission on the same team.
    async fn lock_team(&mut self, team_id: Uuid) -> Result<Option<Team>, AppError>;

    async fn find_team_by_owner_and_name(
        &mut self,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Option<Team>, AppError>;

    async fn insert_team(&mut self, team: &Team) -> Result<(), AppError>;

    async fn find_member(
        &mut self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamMember>, AppError>;

    async fn count_active_members(&mut self, team_id: Uuid) -> Result<i64, AppError>;

    async fn list_members(&mut self, team_id: Uuid) -> Result<Vec<TeamMember>, AppError>;

    async fn insert_member(&mut self, member: &TeamMember) -> Result<(), AppError>;

    async fn update_member(&mut self, member: &TeamMember) -> Result<(), AppError>;

    async fn find_profile(&mut self, member_id: Uuid)
        -> Result<Option<TeamMemberProfile>, AppError>;

    /// Inserts or replaces the profile of `profile.member_id`.
    async fn save_profile(&mut self, profile: &TeamMemberProfile) -> Result<(), AppError>;

    async fn find_invite(&mut self, invite_id: Uuid) -> Result<Option<TeamInvite>, AppError>;

    async fn find_invite_by_token(&mut self, token: &str)
        -> Result<Option<TeamInvite>, AppError>;

    async fn list_invites(&mut self, team_id: Uuid) -> Result<Vec<TeamInvite>, AppError>;

    /// Pending invites whose expiry is at or before `now`.
    async fn list_expired_pending_invites(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TeamInvite>, AppError>;

    async fn insert_invite(&mut self, invite: &TeamInvite) -> Result<(), AppError>;

    async fn update_invite(&mut self, invite: &TeamInvite) -> Result<(), AppError>;

    async fn find_join_request(
        &mut self,
        request_id: Uuid,
    ) -> Result<Option<TeamJoinRequest>, AppError>;

    async fn find_pending_join_request(
        &mut self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamJoinRequest>, AppError>;

    async fn list_join_requests(
        &mut self,
        team_id: Uuid,
        status: Option<JoinRequestStatus>,
    ) -> Result<Vec<TeamJoinRequest>, AppError>;

    async fn insert_join_request(&mut self, request: &TeamJoinRequest) -> Result<(), AppError>;

    async fn update_join_request(&mut self, request: &TeamJoinRequest) -> Result<(), AppError>;

    async fn find_settings(&mut self, team_id: Uuid) -> Result<Option<TeamSettings>, AppError>;

    async fn insert_settings(&mut self, settings: &TeamSettings) -> Result<(), AppError>;

    async fn list_setting_entries(
        &mut self,
        settings_id: Uuid,
    ) -> Result<Vec<TeamSettingEntry>, AppError>;

    /// Inserts the entry, or replaces the one with the same settings id and key.
    async fn save_setting_entry(&mut self, entry: &TeamSettingEntry) -> Result<(), AppError>;

    /// Rules of a settings record, each with its parameters.
    async fn list_rules(&mut self, settings_id: Uuid) -> Result<Vec<TeamRule>, AppError>;

    /// Inserts the rule together with its parameters.
    async fn insert_rule(&mut self, rule: &TeamRule) -> Result<(), AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError>;
}

/// User directory owned by the surrounding system.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, AppError>;

    async fn user_display_name(&self, user_id: Uuid) -> Result<Option<String>, AppError>;
}
