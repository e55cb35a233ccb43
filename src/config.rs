use anyhow::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub environment: String,
    pub invite_token_bytes: usize,
    pub default_invite_expiry_days: i64,
    pub hiatus_window_months: u32,
    pub settings_cache_ttl_secs: u64,
    pub settings_cache_capacity: u64,
}

fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_env_only()
    }

    /// Load configuration from environment variables only (without loading .env files)
    /// This is useful for testing where you want to control the environment directly
    pub fn from_env_only() -> Result<Self> {
        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://@localhost:5432/roster".to_string()),
            database_max_connections: var_or("DATABASE_MAX_CONNECTIONS", 5),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            invite_token_bytes: var_or("INVITE_TOKEN_BYTES", 32),
            default_invite_expiry_days: var_or("DEFAULT_INVITE_EXPIRY_DAYS", 14),
            hiatus_window_months: var_or("HIATUS_WINDOW_MONTHS", 6),
            settings_cache_ttl_secs: var_or("SETTINGS_CACHE_TTL_SECS", 60),
            settings_cache_capacity: var_or("SETTINGS_CACHE_CAPACITY", 10_000),
        })
    }

    /// Fixed configuration for tests, independent of the process environment.
    pub fn test_config() -> Self {
        Config {
            database_url: "postgres://@localhost:5432/roster_test".to_string(),
            database_max_connections: 1,
            environment: "test".to_string(),
            invite_token_bytes: 32,
            default_invite_expiry_days: 14,
            hiatus_window_months: 6,
            settings_cache_ttl_secs: 60,
            settings_cache_capacity: 1_000,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// `None` when invites created without an explicit expiry never expire.
    pub fn default_invite_expiry(&self) -> Option<chrono::Duration> {
        (self.default_invite_expiry_days > 0)
            .then(|| chrono::Duration::days(self.default_invite_expiry_days))
    }

    pub fn settings_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.settings_cache_ttl_secs)
    }
}
