use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::macros::string_enum;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TeamSettings {
    pub id: Uuid,
    pub team_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TeamSettings {
    pub fn new(team_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            team_id,
            created_at: now,
            updated_at: now,
        }
    }
}

string_enum! {
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "snake_case")]
    pub enum SettingValueType {
        Boolean => "boolean",
        Integer => "integer",
        Text => "text",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TeamSettingEntry {
    pub id: Uuid,
    pub settings_id: Uuid,
    pub key: String,
    pub value: String,
    pub value_type: Option<SettingValueType>,
    pub is_enabled: bool,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSettingInput {
    pub key: String,
    pub value: String,
    pub value_type: Option<SettingValueType>,
    pub is_enabled: bool,
    pub description: Option<String>,
}

impl UpsertSettingInput {
    /// Enabled entry with no type hint or description.
    pub fn enabled(key: impl Into<String>, value: impl ToString) -> Self {
        Self {
            key: key.into(),
            value: value.to_string(),
            value_type: None,
            is_enabled: true,
            description: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TeamRule {
    pub id: Uuid,
    pub settings_id: Uuid,
    pub name: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub parameters: Vec<TeamRuleParameter>,
}

impl TeamRule {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.starts_at.is_none_or(|starts_at| starts_at <= now)
            && self.ends_at.is_none_or(|ends_at| now < ends_at)
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|parameter| parameter.key == key)
            .map(|parameter| parameter.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TeamRuleParameter {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleInput {
    pub name: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub parameters: Vec<RuleParameterInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleParameterInput {
    pub key: String,
    pub value: String,
}

/// Settings record of a team with its entries and rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSettingsView {
    pub settings: TeamSettings,
    pub entries: Vec<TeamSettingEntry>,
    pub rules: Vec<TeamRule>,
}
