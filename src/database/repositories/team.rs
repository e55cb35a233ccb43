use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::database::{
    models::{Team, TeamSettings},
    utils::sql,
};

pub async fn create_team(tx: &mut Transaction<'_, Postgres>, team: &Team) -> Result<(), sqlx::Error> {
    sqlx::query(&sql(r#"
            INSERT INTO
                teams (
                    id,
                    owner_id,
                    name,
                    is_active,
                    created_at,
                    updated_at
                )
            VALUES
                (?, ?, ?, ?, ?, ?)
        "#))
    .bind(team.id)
    .bind(team.owner_id)
    .bind(&team.name)
    .bind(team.is_active)
    .bind(team.created_at)
    .bind(team.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn get_team_by_id(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<Team>, sqlx::Error> {
    let team = sqlx::query_as::<_, Team>(&sql(r#"
            SELECT
                id,
                owner_id,
                name,
                is_active,
                created_at,
                updated_at
            FROM
                teams
            WHERE
                id = ?
        "#))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(team)
}

/// Row-locks the team until the surrounding transaction ends.
pub async fn lock_team_by_id(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<Team>, sqlx::Error> {
    let team = sqlx::query_as::<_, Team>(&sql(r#"
            SELECT
                id,
                owner_id,
                name,
                is_active,
                created_at,
                updated_at
            FROM
                teams
            WHERE
                id = ?
            FOR UPDATE
        "#))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(team)
}

pub async fn get_team_by_owner_and_name(
    tx: &mut Transaction<'_, Postgres>,
    owner_id: Uuid,
    name: &str,
) -> Result<Option<Team>, sqlx::Error> {
    let team = sqlx::query_as::<_, Team>(&sql(r#"
            SELECT
                id,
                owner_id,
                name,
                is_active,
                created_at,
                updated_at
            FROM
                teams
            WHERE
                owner_id = ?
                AND name = ?
        "#))
    .bind(owner_id)
    .bind(name)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(team)
}

pub async fn create_team_settings(
    tx: &mut Transaction<'_, Postgres>,
    settings: &TeamSettings,
) -> Result<(), sqlx::Error> {
    sqlx::query(&sql(r#"
            INSERT INTO
                team_settings (
                    id,
                    team_id,
                    created_at,
                    updated_at
                )
            VALUES
                (?, ?, ?, ?)
        "#))
    .bind(settings.id)
    .bind(settings.team_id)
    .bind(settings.created_at)
    .bind(settings.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn get_team_settings(
    tx: &mut Transaction<'_, Postgres>,
    team_id: Uuid,
) -> Result<Option<TeamSettings>, sqlx::Error> {
    let settings = sqlx::query_as::<_, TeamSettings>(&sql(r#"
            SELECT
                id,
                team_id,
                created_at,
                updated_at
            FROM
                team_settings
            WHERE
                team_id = ?
        "#))
    .bind(team_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(settings)
}
