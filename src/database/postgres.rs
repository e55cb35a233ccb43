use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::database::models::{
    JoinRequestStatus, Team, TeamInvite, TeamJoinRequest, TeamMember, TeamMemberProfile,
    TeamRule, TeamSettingEntry, TeamSettings,
};
use crate::database::repositories::{invite, join_request, member, settings, team, user};
use crate::database::store::{Store, StoreTx, UserDirectory};
use crate::error::AppError;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn find_team(&mut self, team_id: Uuid) -> Result<Option<Team>, AppError> {
        Ok(team::get_team_by_id(&mut self.tx, team_id).await?)
    }

    async fn lock_team(&mut self, team_id: Uuid) -> Result<Option<Team>, AppError> {
        Ok(team::lock_team_by_id(&mut self.tx, team_id).await?)
    }

    async fn find_team_by_owner_and_name(
        &mut self,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Option<Team>, AppError> {
        Ok(team::get_team_by_owner_and_name(&mut self.tx, owner_id, name).await?)
    }

    async fn insert_team(&mut self, new_team: &Team) -> Result<(), AppError> {
        Ok(team::create_team(&mut self.tx, new_team).await?)
    }

    async fn find_member(
        &mut self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamMember>, AppError> {
        Ok(member::get_team_member(&mut self.tx, team_id, user_id).await?)
    }

    async fn count_active_members(&mut self, team_id: Uuid) -> Result<i64, AppError> {
        Ok(member::count_active_members(&mut self.tx, team_id).await?)
    }

    async fn list_members(&mut self, team_id: Uuid) -> Result<Vec<TeamMember>, AppError> {
        Ok(member::get_team_members(&mut self.tx, team_id).await?)
    }

    async fn insert_member(&mut self, new_member: &TeamMember) -> Result<(), AppError> {
        Ok(member::add_team_member(&mut self.tx, new_member).await?)
    }

    async fn update_member(&mut self, existing: &TeamMember) -> Result<(), AppError> {
        Ok(member::update_team_member(&mut self.tx, existing).await?)
    }

    async fn find_profile(
        &mut self,
        member_id: Uuid,
    ) -> Result<Option<TeamMemberProfile>, AppError> {
        Ok(member::get_member_profile(&mut self.tx, member_id).await?)
    }

    async fn save_profile(&mut self, profile: &TeamMemberProfile) -> Result<(), AppError> {
        Ok(member::upsert_member_profile(&mut self.tx, profile).await?)
    }

    async fn find_invite(&mut self, invite_id: Uuid) -> Result<Option<TeamInvite>, AppError> {
        Ok(invite::get_invite_by_id(&mut self.tx, invite_id).await?)
    }

    async fn find_invite_by_token(
        &mut self,
        token: &str,
    ) -> Result<Option<TeamInvite>, AppError> {
        Ok(invite::get_invite_by_token(&mut self.tx, token).await?)
    }

    async fn list_invites(&mut self, team_id: Uuid) -> Result<Vec<TeamInvite>, AppError> {
        Ok(invite::get_invites_by_team(&mut self.tx, team_id).await?)
    }

    async fn list_expired_pending_invites(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TeamInvite>, AppError> {
        Ok(invite::get_expired_pending_invites(&mut self.tx, now).await?)
    }

    async fn insert_invite(&mut self, new_invite: &TeamInvite) -> Result<(), AppError> {
        Ok(invite::create_invite(&mut self.tx, new_invite).await?)
    }

    async fn update_invite(&mut self, existing: &TeamInvite) -> Result<(), AppError> {
        Ok(invite::update_invite(&mut self.tx, existing).await?)
    }

    async fn find_join_request(
        &mut self,
        request_id: Uuid,
    ) -> Result<Option<TeamJoinRequest>, AppError> {
        Ok(join_request::get_join_request_by_id(&mut self.tx, request_id).await?)
    }

    async fn find_pending_join_request(
        &mut self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamJoinRequest>, AppError> {
        Ok(join_request::get_pending_join_request(&mut self.tx, team_id, user_id).await?)
    }

    async fn list_join_requests(
        &mut self,
        team_id: Uuid,
        status: Option<JoinRequestStatus>,
    ) -> Result<Vec<TeamJoinRequest>, AppError> {
        Ok(join_request::get_join_requests_by_team(&mut self.tx, team_id, status).await?)
    }

    async fn insert_join_request(&mut self, request: &TeamJoinRequest) -> Result<(), AppError> {
        Ok(join_request::create_join_request(&mut self.tx, request).await?)
    }

    async fn update_join_request(&mut self, request: &TeamJoinRequest) -> Result<(), AppError> {
        Ok(join_request::update_join_request(&mut self.tx, request).await?)
    }

    async fn find_settings(&mut self, team_id: Uuid) -> Result<Option<TeamSettings>, AppError> {
        Ok(team::get_team_settings(&mut self.tx, team_id).await?)
    }

    async fn insert_settings(&mut self, record: &TeamSettings) -> Result<(), AppError> {
        Ok(team::create_team_settings(&mut self.tx, record).await?)
    }

    async fn list_setting_entries(
        &mut self,
        settings_id: Uuid,
    ) -> Result<Vec<TeamSettingEntry>, AppError> {
        Ok(settings::get_setting_entries(&mut self.tx, settings_id).await?)
    }

    async fn save_setting_entry(&mut self, entry: &TeamSettingEntry) -> Result<(), AppError> {
        Ok(settings::upsert_setting_entry(&mut self.tx, entry).await?)
    }

    async fn list_rules(&mut self, settings_id: Uuid) -> Result<Vec<TeamRule>, AppError> {
        Ok(settings::get_rules(&mut self.tx, settings_id).await?)
    }

    async fn insert_rule(&mut self, rule: &TeamRule) -> Result<(), AppError> {
        Ok(settings::create_rule(&mut self.tx, rule).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Reads the `users` table maintained by the account service.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, AppError> {
        Ok(user::user_exists(&self.pool, user_id).await?)
    }

    async fn user_display_name(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        Ok(user::get_user_name(&self.pool, user_id).await?)
    }
}
