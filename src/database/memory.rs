//! In-process store and user directory.
//!
//! Transactions are fully serialized: `begin` takes the store lock and works
//! on a private copy of the state, `commit` swaps the copy in. This gives
//! the per-team serialized admission the engine expects, at whole-store
//! granularity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::database::models::{
    InviteStatus, JoinRequestStatus, MemberStatus, Team, TeamInvite, TeamJoinRequest, TeamMember,
    TeamMemberProfile, TeamRule, TeamSettingEntry, TeamSettings,
};
use crate::database::store::{Store, StoreTx, UserDirectory};
use crate::error::AppError;

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub teams: HashMap<Uuid, Team>,
    pub members: HashMap<Uuid, TeamMember>,
    /// Keyed by member id.
    pub profiles: HashMap<Uuid, TeamMemberProfile>,
    pub invites: HashMap<Uuid, TeamInvite>,
    pub join_requests: HashMap<Uuid, TeamJoinRequest>,
    pub settings: HashMap<Uuid, TeamSettings>,
    pub setting_entries: HashMap<Uuid, TeamSettingEntry>,
    pub rules: HashMap<Uuid, TeamRule>,
}

impl MemoryState {
    pub fn members_of(&self, team_id: Uuid) -> Vec<TeamMember> {
        let mut members: Vec<_> = self
            .members
            .values()
            .filter(|member| member.team_id == team_id)
            .cloned()
            .collect();
        members.sort_by_key(|member| member.joined_at);
        members
    }

    pub fn active_member_count(&self, team_id: Uuid) -> usize {
        self.members
            .values()
            .filter(|member| member.team_id == team_id && member.status == MemberStatus::Active)
            .count()
    }

    pub fn join_requests_of(&self, team_id: Uuid) -> Vec<TeamJoinRequest> {
        let mut requests: Vec<_> = self
            .join_requests
            .values()
            .filter(|request| request.team_id == team_id)
            .cloned()
            .collect();
        requests.sort_by_key(|request| request.requested_at);
        requests
    }

    fn member_by_pair(&self, team_id: Uuid, user_id: Uuid) -> Option<&TeamMember> {
        self.members
            .values()
            .find(|member| member.team_id == team_id && member.user_id == user_id)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_member_inserts: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Whether a transaction currently holds the store.
    pub fn in_transaction(&self) -> bool {
        self.state.try_lock().is_err()
    }

    /// Makes every subsequent member insert fail until switched off.
    pub fn inject_member_insert_failure(&self, enabled: bool) {
        self.fail_member_inserts.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            fail_member_inserts: self.fail_member_inserts.clone(),
        }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_member_inserts: Arc<AtomicBool>,
}

fn sorted_by<T, K: Ord>(mut items: Vec<T>, key: impl FnMut(&T) -> K) -> Vec<T> {
    items.sort_by_key(key);
    items
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_team(&mut self, team_id: Uuid) -> Result<Option<Team>, AppError> {
        Ok(self.working.teams.get(&team_id).cloned())
    }

    async fn lock_team(&mut self, team_id: Uuid) -> Result<Option<Team>, AppError> {
        // the store lock is already held for the whole transaction
        self.find_team(team_id).await
    }

    async fn find_team_by_owner_and_name(
        &mut self,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Option<Team>, AppError> {
        Ok(self
            .working
            .teams
            .values()
            .find(|team| team.owner_id == owner_id && team.name == name)
            .cloned())
    }

    async fn insert_team(&mut self, team: &Team) -> Result<(), AppError> {
        self.working.teams.insert(team.id, team.clone());
        Ok(())
    }

    async fn find_member(
        &mut self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamMember>, AppError> {
        Ok(self.working.member_by_pair(team_id, user_id).cloned())
    }

    async fn count_active_members(&mut self, team_id: Uuid) -> Result<i64, AppError> {
        Ok(self.working.active_member_count(team_id) as i64)
    }

    async fn list_members(&mut self, team_id: Uuid) -> Result<Vec<TeamMember>, AppError> {
        Ok(self.working.members_of(team_id))
    }

    async fn insert_member(&mut self, member: &TeamMember) -> Result<(), AppError> {
        if self.fail_member_inserts.load(Ordering::SeqCst) {
            return Err(AppError::internal_server_error_message(
                "member insert failed",
            ));
        }
        if self
            .working
            .member_by_pair(member.team_id, member.user_id)
            .is_some()
        {
            return Err(AppError::internal_server_error_message(format!(
                "duplicate membership for team {} and user {}",
                member.team_id, member.user_id
            )));
        }
        self.working.members.insert(member.id, member.clone());
        Ok(())
    }

    async fn update_member(&mut self, member: &TeamMember) -> Result<(), AppError> {
        self.working.members.insert(member.id, member.clone());
        Ok(())
    }

    async fn find_profile(
        &mut self,
        member_id: Uuid,
    ) -> Result<Option<TeamMemberProfile>, AppError> {
        Ok(self.working.profiles.get(&member_id).cloned())
    }

    async fn save_profile(&mut self, profile: &TeamMemberProfile) -> Result<(), AppError> {
        self.working
            .profiles
            .insert(profile.member_id, profile.clone());
        Ok(())
    }

    async fn find_invite(&mut self, invite_id: Uuid) -> Result<Option<TeamInvite>, AppError> {
        Ok(self.working.invites.get(&invite_id).cloned())
    }

    async fn find_invite_by_token(
        &mut self,
        token: &str,
    ) -> Result<Option<TeamInvite>, AppError> {
        Ok(self
            .working
            .invites
            .values()
            .find(|invite| invite.token == token)
            .cloned())
    }

    async fn list_invites(&mut self, team_id: Uuid) -> Result<Vec<TeamInvite>, AppError> {
        let invites = self
            .working
            .invites
            .values()
            .filter(|invite| invite.team_id == team_id)
            .cloned()
            .collect();
        Ok(sorted_by(invites, |invite: &TeamInvite| invite.created_at))
    }

    async fn list_expired_pending_invites(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TeamInvite>, AppError> {
        let invites = self
            .working
            .invites
            .values()
            .filter(|invite| invite.status == InviteStatus::Pending && invite.is_expired_at(now))
            .cloned()
            .collect();
        Ok(sorted_by(invites, |invite: &TeamInvite| invite.created_at))
    }

    async fn insert_invite(&mut self, invite: &TeamInvite) -> Result<(), AppError> {
        self.working.invites.insert(invite.id, invite.clone());
        Ok(())
    }

    async fn update_invite(&mut self, invite: &TeamInvite) -> Result<(), AppError> {
        self.working.invites.insert(invite.id, invite.clone());
        Ok(())
    }

    async fn find_join_request(
        &mut self,
        request_id: Uuid,
    ) -> Result<Option<TeamJoinRequest>, AppError> {
        Ok(self.working.join_requests.get(&request_id).cloned())
    }

    async fn find_pending_join_request(
        &mut self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamJoinRequest>, AppError> {
        Ok(self
            .working
            .join_requests
            .values()
            .find(|request| {
                request.team_id == team_id
                    && request.user_id == user_id
                    && request.status == JoinRequestStatus::Pending
            })
            .cloned())
    }

    async fn list_join_requests(
        &mut self,
        team_id: Uuid,
        status: Option<JoinRequestStatus>,
    ) -> Result<Vec<TeamJoinRequest>, AppError> {
        Ok(self
            .working
            .join_requests_of(team_id)
            .into_iter()
            .filter(|request| status.is_none_or(|status| request.status == status))
            .collect())
    }

    async fn insert_join_request(&mut self, request: &TeamJoinRequest) -> Result<(), AppError> {
        if request.status == JoinRequestStatus::Pending {
            let duplicate = self
                .find_pending_join_request(request.team_id, request.user_id)
                .await?;
            if duplicate.is_some() {
                return Err(AppError::internal_server_error_message(format!(
                    "duplicate pending join request for team {} and user {}",
                    request.team_id, request.user_id
                )));
            }
        }
        self.working
            .join_requests
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn update_join_request(&mut self, request: &TeamJoinRequest) -> Result<(), AppError> {
        self.working
            .join_requests
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn find_settings(&mut self, team_id: Uuid) -> Result<Option<TeamSettings>, AppError> {
        Ok(self
            .working
            .settings
            .values()
            .find(|settings| settings.team_id == team_id)
            .cloned())
    }

    async fn insert_settings(&mut self, settings: &TeamSettings) -> Result<(), AppError> {
        self.working.settings.insert(settings.id, settings.clone());
        Ok(())
    }

    async fn list_setting_entries(
        &mut self,
        settings_id: Uuid,
    ) -> Result<Vec<TeamSettingEntry>, AppError> {
        let entries = self
            .working
            .setting_entries
            .values()
            .filter(|entry| entry.settings_id == settings_id)
            .cloned()
            .collect();
        Ok(sorted_by(entries, |entry: &TeamSettingEntry| entry.key.clone()))
    }

    async fn save_setting_entry(&mut self, entry: &TeamSettingEntry) -> Result<(), AppError> {
        self.working
            .setting_entries
            .retain(|_, existing| {
                !(existing.settings_id == entry.settings_id && existing.key == entry.key)
            });
        self.working
            .setting_entries
            .insert(entry.id, entry.clone());
        Ok(())
    }

    async fn list_rules(&mut self, settings_id: Uuid) -> Result<Vec<TeamRule>, AppError> {
        let rules = self
            .working
            .rules
            .values()
            .filter(|rule| rule.settings_id == settings_id)
            .cloned()
            .collect();
        Ok(sorted_by(rules, |rule: &TeamRule| rule.created_at))
    }

    async fn insert_rule(&mut self, rule: &TeamRule) -> Result<(), AppError> {
        self.working.rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }
}

/// User directory backed by a map of user id to display name.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    users: Arc<RwLock<HashMap<Uuid, String>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: Uuid, display_name: impl Into<String>) {
        if let Ok(mut users) = self.users.write() {
            users.insert(user_id, display_name.into());
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, AppError> {
        let users = self
            .users
            .read()
            .map_err(|_| AppError::internal_server_error_message("user directory poisoned"))?;
        Ok(users.contains_key(&user_id))
    }

    async fn user_display_name(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        let users = self
            .users
            .read()
            .map_err(|_| AppError::internal_server_error_message("user directory poisoned"))?;
        Ok(users.get(&user_id).cloned())
    }
}
