use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::database::{
    models::{JoinRequestStatus, TeamJoinRequest},
    utils::sql,
};

const JOIN_REQUEST_COLUMNS: &str = r#"
    id,
    team_id,
    user_id,
    invite_id,
    reviewed_by,
    status,
    source,
    is_auto_approved,
    message,
    requested_at,
    reviewed_at
"#;

pub async fn create_join_request(
    tx: &mut Transaction<'_, Postgres>,
    request: &TeamJoinRequest,
) -> Result<(), sqlx::Error> {
    sqlx::query(&sql(r#"
            INSERT INTO
                team_join_requests (
                    id,
                    team_id,
                    user_id,
                    invite_id,
                    reviewed_by,
                    status,
                    source,
                    is_auto_approved,
                    message,
                    requested_at,
                    reviewed_at
                )
            VALUES
                (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#))
    .bind(request.id)
    .bind(request.team_id)
    .bind(request.user_id)
    .bind(request.invite_id)
    .bind(request.reviewed_by)
    .bind(request.status)
    .bind(request.source)
    .bind(request.is_auto_approved)
    .bind(&request.message)
    .bind(request.requested_at)
    .bind(request.reviewed_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn update_join_request(
    tx: &mut Transaction<'_, Postgres>,
    request: &TeamJoinRequest,
) -> Result<(), sqlx::Error> {
    sqlx::query(&sql(r#"
            UPDATE
                team_join_requests
            SET
                status = ?,
                reviewed_by = ?,
                reviewed_at = ?
            WHERE
                id = ?
        "#))
    .bind(request.status)
    .bind(request.reviewed_by)
    .bind(request.reviewed_at)
    .bind(request.id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn get_join_request_by_id(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<TeamJoinRequest>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM team_join_requests WHERE id = ?",
        JOIN_REQUEST_COLUMNS
    );
    let request = sqlx::query_as::<_, TeamJoinRequest>(&sql(&query))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(request)
}

pub async fn get_pending_join_request(
    tx: &mut Transaction<'_, Postgres>,
    team_id: Uuid,
    user_id: Uuid,
) -> Result<Option<TeamJoinRequest>, sqlx::Error> {
    let query = format!(
        r#"
        SELECT {}
        FROM team_join_requests
        WHERE
            team_id = ?
            AND user_id = ?
            AND status = ?
        "#,
        JOIN_REQUEST_COLUMNS
    );
    let request = sqlx::query_as::<_, TeamJoinRequest>(&sql(&query))
        .bind(team_id)
        .bind(user_id)
        .bind(JoinRequestStatus::Pending)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(request)
}

pub async fn get_join_requests_by_team(
    tx: &mut Transaction<'_, Postgres>,
    team_id: Uuid,
    status: Option<JoinRequestStatus>,
) -> Result<Vec<TeamJoinRequest>, sqlx::Error> {
    let mut query = format!(
        "SELECT {} FROM team_join_requests WHERE team_id = ?",
        JOIN_REQUEST_COLUMNS
    );
    if status.is_some() {
        query.push_str(" AND status = ?");
    }
    query.push_str(" ORDER BY requested_at");

    let sql_query = sql(&query);
    let mut prepared = sqlx::query_as::<_, TeamJoinRequest>(&sql_query).bind(team_id);
    if let Some(status) = status {
        prepared = prepared.bind(status);
    }

    let requests = prepared.fetch_all(&mut **tx).await?;

    Ok(requests)
}
