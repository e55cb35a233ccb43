use chrono::{DateTime, Utc};
use futures_util::TryFutureExt;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::database::{
    models::{InviteStatus, TeamInvite},
    utils::sql,
};

const INVITE_COLUMNS: &str = r#"
    id,
    team_id,
    created_by,
    target_user_id,
    target_email,
    channel,
    status,
    is_pre_approved,
    max_uses,
    use_count,
    expires_at,
    message,
    created_at,
    accepted_at,
    token
"#;

pub async fn create_invite(
    tx: &mut Transaction<'_, Postgres>,
    invite: &TeamInvite,
) -> Result<(), sqlx::Error> {
    sqlx::query(&sql(r#"
            INSERT INTO
                team_invites (
                    id,
                    team_id,
                    created_by,
                    target_user_id,
                    target_email,
                    channel,
                    status,
                    is_pre_approved,
                    max_uses,
                    use_count,
                    expires_at,
                    message,
                    created_at,
                    accepted_at,
                    token
                )
            VALUES
                (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#))
    .bind(invite.id)
    .bind(invite.team_id)
    .bind(invite.created_by)
    .bind(invite.target_user_id)
    .bind(&invite.target_email)
    .bind(invite.channel)
    .bind(invite.status)
    .bind(invite.is_pre_approved)
    .bind(invite.max_uses)
    .bind(invite.use_count)
    .bind(invite.expires_at)
    .bind(&invite.message)
    .bind(invite.created_at)
    .bind(invite.accepted_at)
    .bind(&invite.token)
    .execute(&mut **tx)
    .map_err(|e| {
        log::error!("Failed to create team invite: {}", e);
        e
    })
    .await?;

    Ok(())
}

/// Writes back the mutable part of an invite: status, use count and acceptance time.
pub async fn update_invite(
    tx: &mut Transaction<'_, Postgres>,
    invite: &TeamInvite,
) -> Result<(), sqlx::Error> {
    sqlx::query(&sql(r#"
            UPDATE
                team_invites
            SET
                status = ?,
                use_count = ?,
                accepted_at = ?
            WHERE
                id = ?
        "#))
    .bind(invite.status)
    .bind(invite.use_count)
    .bind(invite.accepted_at)
    .bind(invite.id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn get_invite_by_id(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<TeamInvite>, sqlx::Error> {
    let query = format!("SELECT {} FROM team_invites WHERE id = ?", INVITE_COLUMNS);
    let invite = sqlx::query_as::<_, TeamInvite>(&sql(&query))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(invite)
}

pub async fn get_invite_by_token(
    tx: &mut Transaction<'_, Postgres>,
    token: &str,
) -> Result<Option<TeamInvite>, sqlx::Error> {
    let query = format!("SELECT {} FROM team_invites WHERE token = ?", INVITE_COLUMNS);
    let invite = sqlx::query_as::<_, TeamInvite>(&sql(&query))
        .bind(token)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(invite)
}

pub async fn get_invites_by_team(
    tx: &mut Transaction<'_, Postgres>,
    team_id: Uuid,
) -> Result<Vec<TeamInvite>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM team_invites WHERE team_id = ? ORDER BY created_at",
        INVITE_COLUMNS
    );
    let invites = sqlx::query_as::<_, TeamInvite>(&sql(&query))
        .bind(team_id)
        .fetch_all(&mut **tx)
        .await?;

    Ok(invites)
}

/// Pending invites past their expiry, locked for the sweep that expires them.
pub async fn get_expired_pending_invites(
    tx: &mut Transaction<'_, Postgres>,
    now: DateTime<Utc>,
) -> Result<Vec<TeamInvite>, sqlx::Error> {
    let query = format!(
        r#"
        SELECT {}
        FROM team_invites
        WHERE
            status = ?
            AND expires_at IS NOT NULL
            AND expires_at <= ?
        ORDER BY created_at
        FOR UPDATE
        "#,
        INVITE_COLUMNS
    );
    let invites = sqlx::query_as::<_, TeamInvite>(&sql(&query))
        .bind(InviteStatus::Pending)
        .bind(now)
        .fetch_all(&mut **tx)
        .await?;

    Ok(invites)
}
