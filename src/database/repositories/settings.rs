use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::database::{
    models::{TeamRule, TeamRuleParameter, TeamSettingEntry},
    utils::sql,
};

pub async fn get_setting_entries(
    tx: &mut Transaction<'_, Postgres>,
    settings_id: Uuid,
) -> Result<Vec<TeamSettingEntry>, sqlx::Error> {
    let entries = sqlx::query_as::<_, TeamSettingEntry>(&sql(r#"
            SELECT
                id,
                settings_id,
                key,
                value,
                value_type,
                is_enabled,
                description,
                updated_at
            FROM
                team_setting_entries
            WHERE
                settings_id = ?
            ORDER BY
                key
        "#))
    .bind(settings_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(entries)
}

pub async fn upsert_setting_entry(
    tx: &mut Transaction<'_, Postgres>,
    entry: &TeamSettingEntry,
) -> Result<(), sqlx::Error> {
    sqlx::query(&sql(r#"
            INSERT INTO
                team_setting_entries (
                    id,
                    settings_id,
                    key,
                    value,
                    value_type,
                    is_enabled,
                    description,
                    updated_at
                )
            VALUES
                (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (settings_id, key) DO UPDATE SET
                value = EXCLUDED.value,
                value_type = EXCLUDED.value_type,
                is_enabled = EXCLUDED.is_enabled,
                description = EXCLUDED.description,
                updated_at = EXCLUDED.updated_at
        "#))
    .bind(entry.id)
    .bind(entry.settings_id)
    .bind(&entry.key)
    .bind(&entry.value)
    .bind(entry.value_type)
    .bind(entry.is_enabled)
    .bind(&entry.description)
    .bind(entry.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn get_rules(
    tx: &mut Transaction<'_, Postgres>,
    settings_id: Uuid,
) -> Result<Vec<TeamRule>, sqlx::Error> {
    let mut rules = sqlx::query_as::<_, TeamRule>(&sql(r#"
            SELECT
                id,
                settings_id,
                name,
                starts_at,
                ends_at,
                created_at
            FROM
                team_rules
            WHERE
                settings_id = ?
            ORDER BY
                created_at
        "#))
    .bind(settings_id)
    .fetch_all(&mut **tx)
    .await?;

    let rule_ids: Vec<Uuid> = rules.iter().map(|rule| rule.id).collect();
    let parameters = sqlx::query_as::<_, TeamRuleParameter>(&sql(r#"
            SELECT
                id,
                rule_id,
                key,
                value
            FROM
                team_rule_parameters
            WHERE
                rule_id = ANY(?)
            ORDER BY
                key
        "#))
    .bind(&rule_ids)
    .fetch_all(&mut **tx)
    .await?;

    for parameter in parameters {
        if let Some(rule) = rules.iter_mut().find(|rule| rule.id == parameter.rule_id) {
            rule.parameters.push(parameter);
        }
    }

    Ok(rules)
}

pub async fn create_rule(
    tx: &mut Transaction<'_, Postgres>,
    rule: &TeamRule,
) -> Result<(), sqlx::Error> {
    sqlx::query(&sql(r#"
            INSERT INTO
                team_rules (
                    id,
                    settings_id,
                    name,
                    starts_at,
                    ends_at,
                    created_at
                )
            VALUES
                (?, ?, ?, ?, ?, ?)
        "#))
    .bind(rule.id)
    .bind(rule.settings_id)
    .bind(&rule.name)
    .bind(rule.starts_at)
    .bind(rule.ends_at)
    .bind(rule.created_at)
    .execute(&mut **tx)
    .await?;

    for parameter in &rule.parameters {
        sqlx::query(&sql(r#"
                INSERT INTO
                    team_rule_parameters (
                        id,
                        rule_id,
                        key,
                        value
                    )
                VALUES
                    (?, ?, ?, ?)
            "#))
        .bind(parameter.id)
        .bind(parameter.rule_id)
        .bind(&parameter.key)
        .bind(&parameter.value)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}
