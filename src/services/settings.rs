//! Typed, cached view over a team's enabled setting entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::future::Cache;
use uuid::Uuid;

use crate::config::Config;
use crate::database::models::TeamSettingEntry;
use crate::database::store::StoreTx;
use crate::error::AppError;

/// Well-known setting keys.
pub mod keys {
    pub const MODERATORS_MAY_INVITE: &str = "moderators_may_invite";
    pub const MODERATORS_MAY_APPROVE_REQUESTS: &str = "moderators_may_approve_requests";
    pub const MODERATORS_MAY_REJECT_REQUESTS: &str = "moderators_may_reject_requests";
    pub const MODERATORS_MAY_REMOVE_PLAYERS: &str = "moderators_may_remove_players";
    pub const PLAYERS_MAY_INVITE: &str = "players_may_invite";
    pub const MAX_PLAYERS: &str = "max_players";
    pub const MIN_HIATUS_DAYS: &str = "min_hiatus_days";
    pub const MAX_HIATUS_DAYS: &str = "max_hiatus_days";
    pub const MAX_HIATUS_USES_PER_SEMESTER: &str = "max_hiatus_uses_per_semester";
}

/// Enabled entries of one team, keyed by setting key.
#[derive(Debug, Clone, Default)]
pub struct TeamSettingsSnapshot {
    values: HashMap<String, String>,
}

impl TeamSettingsSnapshot {
    pub fn from_entries(entries: impl IntoIterator<Item = TeamSettingEntry>) -> Self {
        let values = entries
            .into_iter()
            .filter(|entry| entry.is_enabled)
            .map(|entry| (entry.key, entry.value))
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// `false` when the key is absent, disabled or not a boolean.
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// `0` when the key is absent, disabled or not an integer.
    pub fn get_int(&self, key: &str) -> i64 {
        self.get(key)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// Loads settings snapshots through the caller's transaction.
///
/// [`SettingsStore::snapshot`] serves read-only callers from a TTL cache keyed
/// by team and generation. Every settings write bumps the generation, so an
/// entry loaded before the write can never be served after it. Decisions made
/// inside a mutating transaction use [`SettingsStore::load`] instead, which
/// always reads the committed rows.
#[derive(Clone)]
pub struct SettingsStore {
    cache: Cache<(Uuid, u64), Arc<TeamSettingsSnapshot>>,
    generation: Arc<AtomicU64>,
}

impl SettingsStore {
    pub fn new(config: &Config) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.settings_cache_capacity)
            .time_to_live(config.settings_cache_ttl())
            .build();

        Self {
            cache,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Reads the enabled entries of a team, bypassing the cache.
    pub async fn load(
        tx: &mut dyn StoreTx,
        team_id: Uuid,
    ) -> Result<TeamSettingsSnapshot, AppError> {
        Ok(match tx.find_settings(team_id).await? {
            Some(settings) => {
                TeamSettingsSnapshot::from_entries(tx.list_setting_entries(settings.id).await?)
            }
            None => TeamSettingsSnapshot::default(),
        })
    }

    pub async fn snapshot(
        &self,
        tx: &mut dyn StoreTx,
        team_id: Uuid,
    ) -> Result<Arc<TeamSettingsSnapshot>, AppError> {
        let generation = self.generation.load(Ordering::SeqCst);
        if let Some(cached) = self.cache.get(&(team_id, generation)).await {
            return Ok(cached);
        }

        let snapshot = Arc::new(Self::load(tx, team_id).await?);
        self.remember(team_id, generation, snapshot.clone()).await;
        Ok(snapshot)
    }

    async fn remember(&self, team_id: Uuid, generation: u64, snapshot: Arc<TeamSettingsSnapshot>) {
        self.cache.insert((team_id, generation), snapshot).await;
    }

    /// Retires every cached snapshot; call after a settings write has committed.
    pub async fn invalidate(&self, team_id: Uuid) {
        let retired = self.generation.fetch_add(1, Ordering::SeqCst);
        log::debug!(
            "Settings of team {} changed, retiring cache generation {}",
            team_id,
            retired
        );
        self.cache.invalidate(&(team_id, retired)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::database::models::TeamSettings;
    use crate::database::store::Store;
    use chrono::Utc;

    fn entry(key: &str, value: &str, is_enabled: bool) -> TeamSettingEntry {
        TeamSettingEntry {
            id: Uuid::new_v4(),
            settings_id: Uuid::new_v4(),
            key: key.to_string(),
            value: value.to_string(),
            value_type: None,
            is_enabled,
            description: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_typed_accessors_fall_back_on_bad_values() {
        let snapshot = TeamSettingsSnapshot::from_entries(vec![
            entry(keys::MODERATORS_MAY_INVITE, " TRUE ", true),
            entry(keys::PLAYERS_MAY_INVITE, "yes", true),
            entry(keys::MAX_PLAYERS, "12", true),
            entry(keys::MIN_HIATUS_DAYS, "five", true),
        ]);

        assert!(snapshot.get_bool(keys::MODERATORS_MAY_INVITE));
        assert!(!snapshot.get_bool(keys::PLAYERS_MAY_INVITE));
        assert!(!snapshot.get_bool(keys::MODERATORS_MAY_REJECT_REQUESTS));
        assert_eq!(snapshot.get_int(keys::MAX_PLAYERS), 12);
        assert_eq!(snapshot.get_int(keys::MIN_HIATUS_DAYS), 0);
        assert_eq!(snapshot.get_int(keys::MAX_HIATUS_DAYS), 0);
    }

    #[test]
    fn test_disabled_entries_are_invisible() {
        let snapshot = TeamSettingsSnapshot::from_entries(vec![
            entry(keys::MODERATORS_MAY_INVITE, "true", false),
            entry(keys::MAX_PLAYERS, "3", false),
        ]);

        assert!(!snapshot.get_bool(keys::MODERATORS_MAY_INVITE));
        assert_eq!(snapshot.get_int(keys::MAX_PLAYERS), 0);
        assert_eq!(snapshot.get(keys::MAX_PLAYERS), None);
    }

    async fn seeded_store() -> (MemoryStore, TeamSettings) {
        let store = MemoryStore::new();
        let settings = TeamSettings::new(Uuid::new_v4(), Utc::now());
        let mut tx = store.begin().await.unwrap();
        tx.insert_settings(&settings).await.unwrap();
        tx.commit().await.unwrap();
        (store, settings)
    }

    async fn write_max_players(store: &MemoryStore, settings: &TeamSettings, value: &str) {
        let mut written = entry(keys::MAX_PLAYERS, value, true);
        written.settings_id = settings.id;
        let mut tx = store.begin().await.unwrap();
        tx.save_setting_entry(&written).await.unwrap();
        tx.commit().await.unwrap();
    }

    async fn cached_max_players(cache: &SettingsStore, store: &MemoryStore, team_id: Uuid) -> i64 {
        let mut tx = store.begin().await.unwrap();
        let snapshot = cache.snapshot(tx.as_mut(), team_id).await.unwrap();
        tx.rollback().await.unwrap();
        snapshot.get_int(keys::MAX_PLAYERS)
    }

    #[tokio::test]
    async fn test_snapshot_is_cached_until_invalidated() {
        let (store, settings) = seeded_store().await;
        let cache = SettingsStore::new(&Config::test_config());
        write_max_players(&store, &settings, "10").await;
        assert_eq!(cached_max_players(&cache, &store, settings.team_id).await, 10);

        write_max_players(&store, &settings, "12").await;
        assert_eq!(cached_max_players(&cache, &store, settings.team_id).await, 10);

        let mut tx = store.begin().await.unwrap();
        let fresh = SettingsStore::load(tx.as_mut(), settings.team_id).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(fresh.get_int(keys::MAX_PLAYERS), 12);

        cache.invalidate(settings.team_id).await;
        assert_eq!(cached_max_players(&cache, &store, settings.team_id).await, 12);
    }

    #[tokio::test]
    async fn test_snapshot_loaded_before_a_write_is_not_served_after_it() {
        let (store, settings) = seeded_store().await;
        let cache = SettingsStore::new(&Config::test_config());
        write_max_players(&store, &settings, "10").await;

        // A reader loads, then a write commits and invalidates before the
        // reader gets to fill the cache.
        let generation = cache.generation.load(Ordering::SeqCst);
        let mut tx = store.begin().await.unwrap();
        let stale = SettingsStore::load(tx.as_mut(), settings.team_id).await.unwrap();
        tx.rollback().await.unwrap();
        write_max_players(&store, &settings, "12").await;
        cache.invalidate(settings.team_id).await;
        cache
            .remember(settings.team_id, generation, Arc::new(stale))
            .await;

        assert_eq!(cached_max_players(&cache, &store, settings.team_id).await, 12);
    }
}
