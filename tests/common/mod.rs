#![allow(dead_code)]

use std::env;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fake::Fake;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use uuid::Uuid;

use roster::config::Config;
use roster::database::models::*;
use roster::database::store::{Store, UserDirectory};
use roster::database::{MemoryDirectory, MemoryStore};
use roster::error::AppError;
use roster::services::{
    AdmissionEngine, Caller, ManualClock, Notification, Notifier, Outcome, keys,
};

/// Notifier that keeps everything it is given.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn admitted_users(&self) -> Vec<Uuid> {
        self.sent()
            .into_iter()
            .filter_map(|notification| match notification {
                Notification::MemberAdmitted { user_id, .. } => Some(user_id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError> {
        self.sent
            .lock()
            .map_err(|_| AppError::internal_server_error_message("notifier poisoned"))?
            .push(notification.clone());
        Ok(())
    }
}

/// Directory that fails every lookup made while a store transaction is open,
/// like a pool whose only connection is held by that transaction.
#[derive(Clone)]
pub struct OutsideTransactionDirectory {
    store: MemoryStore,
    users: MemoryDirectory,
}

impl OutsideTransactionDirectory {
    fn ensure_idle(&self) -> Result<(), AppError> {
        if self.store.in_transaction() {
            return Err(AppError::internal_server_error_message(
                "user lookup while a transaction is open",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for OutsideTransactionDirectory {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, AppError> {
        self.ensure_idle()?;
        self.users.user_exists(user_id).await
    }

    async fn user_display_name(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        self.ensure_idle()?;
        self.users.user_display_name(user_id).await
    }
}

pub struct TestContext {
    pub config: Config,
    pub store: MemoryStore,
    pub users: MemoryDirectory,
    pub notifier: RecordingNotifier,
    pub clock: ManualClock,
    pub engine: AdmissionEngine,
}

/// A created team with its owner.
pub struct TestTeam {
    pub team: Team,
    pub owner: Caller,
}

impl TestTeam {
    pub fn id(&self) -> Uuid {
        self.team.id
    }
}

impl TestContext {
    pub async fn new() -> Result<Self> {
        Self::build(false)
    }

    /// Context whose directory rejects lookups made inside a transaction.
    pub async fn with_outside_transaction_directory() -> Result<Self> {
        Self::build(true)
    }

    fn build(outside_transaction_only: bool) -> Result<Self> {
        let config = Config::test_config();
        let store = MemoryStore::new();
        let users = MemoryDirectory::new();
        let notifier = RecordingNotifier::default();
        let clock = ManualClock::new(fixed_now());

        let directory: Arc<dyn UserDirectory> = if outside_transaction_only {
            Arc::new(OutsideTransactionDirectory {
                store: store.clone(),
                users: users.clone(),
            })
        } else {
            Arc::new(users.clone())
        };
        let engine = AdmissionEngine::new(
            config.clone(),
            Arc::new(store.clone()),
            directory,
            Arc::new(notifier.clone()),
        )
        .with_clock(Arc::new(clock.clone()));

        Ok(TestContext {
            config,
            store,
            users,
            notifier,
            clock,
            engine,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        roster::services::Clock::now(&self.clock)
    }

    /// Registers a user with a generated display name.
    pub fn create_user(&self) -> Caller {
        let user_id = Uuid::new_v4();
        let name: String = Name().fake();
        self.users.add_user(user_id, name);
        Caller::user(user_id)
    }

    pub fn create_system_admin(&self) -> Caller {
        let admin = self.create_user();
        Caller::system_admin(admin.user_id)
    }

    pub async fn create_team(&self) -> Result<TestTeam> {
        let owner = self.create_user();
        let name: String = Name().fake();
        let outcome = self
            .engine
            .create_team(
                &owner,
                CreateTeamInput {
                    name: format!("{} Team", name),
                },
            )
            .await?;
        let team = expect_data(outcome)?;
        Ok(TestTeam { team, owner })
    }

    /// Admits a fresh user through a pre-approved invite from the owner.
    pub async fn add_member(&self, team: &TestTeam) -> Result<Caller> {
        let user = self.create_user();
        let mut input = CreateInviteInput::new(team.id(), InviteChannel::Email);
        input.target_user_id = Some(user.user_id);
        let invite = expect_data(self.engine.create_invite(&team.owner, input).await?)?;
        expect_data(self.engine.accept_invite(&user, invite.id).await?)?;
        Ok(user)
    }

    pub async fn add_moderator(&self, team: &TestTeam) -> Result<Caller> {
        let user = self.add_member(team).await?;
        expect_data(
            self.engine
                .assign_moderator(&team.owner, team.id(), user.user_id)
                .await?,
        )?;
        Ok(user)
    }

    pub async fn set_setting(&self, team: &TestTeam, key: &str, value: impl ToString) -> Result<()> {
        expect_data(
            self.engine
                .upsert_setting(&team.owner, team.id(), UpsertSettingInput::enabled(key, value))
                .await?,
        )?;
        Ok(())
    }

    pub async fn set_max_players(&self, team: &TestTeam, max_players: i64) -> Result<()> {
        self.set_setting(team, keys::MAX_PLAYERS, max_players).await
    }

    /// Writes a setting straight into the store, the way another engine
    /// instance would, without touching this engine's cache.
    pub async fn write_setting_directly(
        &self,
        team: &TestTeam,
        key: &str,
        value: impl ToString,
    ) -> Result<()> {
        let settings = self
            .store
            .snapshot()
            .await
            .settings
            .values()
            .find(|settings| settings.team_id == team.id())
            .cloned()
            .ok_or_else(|| anyhow!("team {} has no settings", team.id()))?;
        let mut tx = self.store.begin().await?;
        tx.save_setting_entry(&TeamSettingEntry {
            id: Uuid::new_v4(),
            settings_id: settings.id,
            key: key.to_string(),
            value: value.to_string(),
            value_type: None,
            is_enabled: true,
            description: None,
            updated_at: self.now(),
        })
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn share_link(&self, team: &TestTeam, creator: &Caller) -> Result<TeamInvite> {
        let input = CreateInviteInput::new(team.id(), InviteChannel::ShareLink);
        expect_data(self.engine.create_invite(creator, input).await?)
    }

    pub async fn active_members(&self, team: &TestTeam) -> usize {
        self.store.snapshot().await.active_member_count(team.id())
    }

    pub async fn invite(&self, invite_id: Uuid) -> Option<TeamInvite> {
        self.store.snapshot().await.invites.get(&invite_id).cloned()
    }

    pub async fn join_request(&self, request_id: Uuid) -> Option<TeamJoinRequest> {
        self.store.snapshot().await.join_requests.get(&request_id).cloned()
    }
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn fake_email() -> String {
    SafeEmail().fake()
}

/// Payload of a successful outcome, or an error naming the status.
pub fn expect_data<T>(outcome: Outcome<T>) -> Result<T> {
    let status = outcome.status;
    match outcome.data {
        Some(data) if status.is_success() => Ok(data),
        _ => Err(anyhow!("expected success, got {}", status)),
    }
}

pub fn setup_test_env() {
    unsafe {
        env::set_var("RUST_LOG", "debug");
    }
    let _ = env_logger::builder().is_test(true).try_init();
}
